mod alert;
mod cli;
mod config;
mod discord;
mod embed;
mod error;
mod logging;
mod model;
mod reddit;
mod relay;
mod store;

use std::process;

use clap::Parser;

fn main() {
    logging::init();

    if let Err(e) = cli::run(cli::Cli::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
