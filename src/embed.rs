//! Formatting queue items as Discord embeds.
//!
//! Formatting never fails: oversized fields are truncated to Discord's
//! limits and missing optional data is left out.

use serde::Serialize;

use crate::model::{Comment, PendingItem, Post, Report};

const TITLE_LIMIT: usize = 250;
const DESCRIPTION_LIMIT: usize = 4000;

const COMMENT_COLOR: u32 = 0x00EE_EEEE;
const POST_COLOR: u32 = 0x0000_BCD4;

/// A Discord embed, serialized as the webhook API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub author: EmbedAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

/// Builds the announcement embed for a pending item.
pub fn format_item(item: &PendingItem) -> Embed {
    match item {
        PendingItem::Comment(comment) => format_comment(comment),
        PendingItem::Post(post) => format_post(post),
    }
}

fn format_comment(comment: &Comment) -> Embed {
    let reports = format_reports(&comment.reports);
    Embed {
        title: truncate(&format!("Comment by {}", comment.author), TITLE_LIMIT),
        description: truncate(&format!("{}\n\n{reports}", comment.body), DESCRIPTION_LIMIT),
        url: format!("https://reddit.com{}", comment.permalink),
        color: COMMENT_COLOR,
        author: EmbedAuthor {
            name: format!("u/{}", comment.author),
        },
        thumbnail: None,
    }
}

fn format_post(post: &Post) -> Embed {
    let title = if post.is_self {
        post.title.clone()
    } else {
        format!("{} ({})", post.title, post.domain)
    };
    let thumbnail = if post.is_self {
        None
    } else {
        post.thumbnail.clone().map(|url| EmbedThumbnail { url })
    };
    Embed {
        title: truncate(&title, TITLE_LIMIT),
        description: truncate(&format_reports(&post.reports), DESCRIPTION_LIMIT),
        url: format!("https://redd.it/{}", post.short_id),
        color: POST_COLOR,
        author: EmbedAuthor {
            name: format!("u/{}", post.author),
        },
        thumbnail,
    }
}

/// One `by: reason` line per report.
fn format_reports(reports: &[Report]) -> String {
    reports
        .iter()
        .map(|r| format!("{}: {}", r.by, r.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps at most `limit` characters.
fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}
