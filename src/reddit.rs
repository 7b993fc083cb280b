//! Reddit moderation-queue client.
//!
//! Authenticates with a stored refresh token, caches the short-lived access
//! token until shortly before it expires, and reads the subreddit modqueue
//! page by page. Comments (`t1`) and posts (`t3`) become [`PendingItem`]s;
//! anything else in the listing is ignored.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::RedditConfig;
use crate::error::{RelayError, Result};
use crate::model::{Comment, PendingItem, Post, Report};
use crate::relay::QueueSource;

const PAGE_LIMIT: &str = "100";
const MAX_PAGES: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Access tokens are renewed this long before Reddit says they expire.
const EXPIRY_MARGIN_SECS: u64 = 60;

pub struct RedditClient {
    http: Client,
    auth_base: String,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    subreddit: String,
    refresh_token: Option<String>,
    access: Option<AccessToken>,
}

struct AccessToken {
    token: String,
    expires_at: Timestamp,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<Thing>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Deserialize)]
struct RawComment {
    name: String,
    author: String,
    body: String,
    permalink: String,
    #[serde(default)]
    mod_reports: Vec<Vec<Value>>,
    #[serde(default)]
    user_reports: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawLink {
    name: String,
    id: String,
    author: String,
    title: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    is_self: bool,
    preview: Option<Preview>,
    #[serde(default)]
    mod_reports: Vec<Vec<Value>>,
    #[serde(default)]
    user_reports: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct Preview {
    #[serde(default)]
    images: Vec<PreviewImage>,
}

#[derive(Deserialize)]
struct PreviewImage {
    #[serde(default)]
    resolutions: Vec<ImageSource>,
}

#[derive(Deserialize)]
struct ImageSource {
    url: String,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::RedditRequest(format!("failed to build client: {e}")))?;

        Ok(Self {
            http,
            auth_base: config.auth_base.trim_end_matches('/').to_string(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            subreddit: config.subreddit.clone(),
            refresh_token: None,
            access: None,
        })
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// The URL a moderator opens to grant the relay read access.
    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}/api/v1/authorize", self.auth_base),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("state", state),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("duration", "permanent"),
                ("scope", "read"),
            ],
        )
        .map_err(|e| RelayError::Auth(format!("invalid authorization url: {e}")))
    }

    /// Trades an authorization code for a refresh token.
    ///
    /// The returned token is also kept on the client.
    pub fn exchange_code(&mut self, code: &str) -> Result<String> {
        let response = self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])?;
        let refresh_token = response
            .refresh_token
            .clone()
            .ok_or_else(|| RelayError::Auth("no refresh token in response".into()))?;
        self.store_access(response)?;
        self.refresh_token = Some(refresh_token.clone());
        Ok(refresh_token)
    }

    /// Returns a valid access token, refreshing it when needed.
    fn access_token(&mut self) -> Result<String> {
        if let Some(access) = &self.access
            && Timestamp::now() < access.expires_at
        {
            return Ok(access.token.clone());
        }

        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or_else(|| RelayError::Auth("no refresh token available".into()))?;
        let response = self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ])?;
        self.store_access(response)
    }

    fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = self
            .http
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form);
        let response: TokenResponse = decode(send(request)?)?;
        // Reddit reports some grant failures as 200 with an error body.
        if let Some(error) = response.error {
            return Err(RelayError::Auth(error));
        }
        Ok(response)
    }

    fn store_access(&mut self, response: TokenResponse) -> Result<String> {
        let token = response
            .access_token
            .ok_or_else(|| RelayError::Auth("no access token in response".into()))?;
        let lifetime = response
            .expires_in
            .unwrap_or(3600)
            .saturating_sub(EXPIRY_MARGIN_SECS)
            .min(86_400);
        let lifetime = SignedDuration::from_secs(i64::try_from(lifetime).unwrap_or(0));
        self.access = Some(AccessToken {
            token: token.clone(),
            expires_at: Timestamp::now() + lifetime,
        });
        Ok(token)
    }

    /// Reads every item in the subreddit's moderation queue.
    pub fn fetch_modqueue(&mut self) -> Result<Vec<PendingItem>> {
        let url = format!("{}/r/{}/about/modqueue", self.api_base, self.subreddit);
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let token = self.access_token()?;
            let mut query = vec![("limit", PAGE_LIMIT), ("raw_json", "1")];
            if let Some(cursor) = after.as_deref() {
                query.push(("after", cursor));
            }
            let request = self.http.get(&url).bearer_auth(token).query(&query);
            let listing: Listing = match send(request) {
                Ok(response) => decode(response)?,
                Err(e) => {
                    if matches!(e, RelayError::RedditStatus { status: 401 }) {
                        self.access = None;
                    }
                    return Err(e);
                }
            };

            for thing in listing.data.children {
                if let Some(item) = parse_thing(thing)? {
                    items.push(item);
                }
            }

            match listing.data.after {
                Some(next) if !next.is_empty() => after = Some(next),
                _ => return Ok(items),
            }
        }

        // A truncated listing would retract announcements for items still queued.
        Err(RelayError::RedditDecode(format!("modqueue exceeds {MAX_PAGES} pages")))
    }
}

impl QueueSource for RedditClient {
    fn fetch_pending(&mut self) -> Result<Vec<PendingItem>> {
        self.fetch_modqueue()
    }
}

fn send(request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .map_err(|e| RelayError::RedditRequest(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::RedditStatus {
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .map_err(|e| RelayError::RedditDecode(e.to_string()))
}

fn parse_thing(thing: Thing) -> Result<Option<PendingItem>> {
    let item = match thing.kind.as_str() {
        "t1" => {
            let raw: RawComment = from_value(thing.data)?;
            PendingItem::Comment(Comment {
                id: raw.name,
                author: raw.author,
                body: raw.body,
                permalink: raw.permalink,
                reports: parse_reports(&raw.mod_reports, &raw.user_reports),
            })
        }
        "t3" => {
            let raw: RawLink = from_value(thing.data)?;
            let thumbnail = raw
                .preview
                .and_then(|p| p.images.into_iter().next())
                .and_then(|i| i.resolutions.into_iter().next())
                .map(|r| r.url);
            PendingItem::Post(Post {
                id: raw.name,
                short_id: raw.id,
                author: raw.author,
                title: raw.title,
                domain: raw.domain,
                is_self: raw.is_self,
                thumbnail,
                reports: parse_reports(&raw.mod_reports, &raw.user_reports),
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(item))
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| RelayError::RedditDecode(e.to_string()))
}

/// Reddit encodes reports as `[reason, moderator]` and `[reason, count, ...]`.
fn parse_reports(mod_reports: &[Vec<Value>], user_reports: &[Vec<Value>]) -> Vec<Report> {
    mod_reports
        .iter()
        .chain(user_reports)
        .map(|entry| Report {
            reason: value_text(entry.first()),
            by: value_text(entry.get(1)),
        })
        .collect()
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
