//! Queue items as the relay sees them.
//!
//! Only what the formatter needs is kept; everything else Reddit returns
//! is dropped at the client boundary.

/// An item currently waiting in the moderation queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingItem {
    Comment(Comment),
    Post(Post),
}

impl PendingItem {
    /// Platform-unique id (the Reddit fullname, e.g. `t1_abc`).
    pub fn id(&self) -> &str {
        match self {
            Self::Comment(c) => &c.id,
            Self::Post(p) => &p.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    /// Path relative to `https://reddit.com`, starting with `/r/...`.
    pub permalink: String,
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    /// Base36 id without the `t3_` prefix, used for `redd.it` links.
    pub short_id: String,
    pub author: String,
    pub title: String,
    pub domain: String,
    pub is_self: bool,
    pub thumbnail: Option<String>,
    pub reports: Vec<Report>,
}

/// A single report against an item.
///
/// `by` is the moderator name for mod reports and the report count for
/// user reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub reason: String,
    pub by: String,
}
