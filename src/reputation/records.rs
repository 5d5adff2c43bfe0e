//! Persisted reputation record types.
//!
//! Field names serialize in `camelCase` to stay compatible with the ledger
//! documents already on disk. Trust scores are always re-derived from the
//! appearance counts, never mutated independently.

use serde::{Deserialize, Serialize};

/// Base trust granted on an agent's first featured item.
pub(crate) const TRUST_BASE: f64 = 5.0;
pub(crate) const TRUST_PER_FEATURED_POST: f64 = 1.0;
pub(crate) const TRUST_PER_FEATURED_COMMENT: f64 = 0.5;
pub(crate) const PENALTY_PER_SPAM_POST: f64 = 5.0;
pub(crate) const PENALTY_PER_SPAM_COMMENT: f64 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedPostRef {
    pub id: String,
    pub title: String,
    pub date: String,
    pub upvotes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedCommentRef {
    pub id: String,
    pub post_id: String,
    pub post_title: String,
    /// Truncated comment body, for audit readability only.
    pub content: String,
    pub upvotes: i64,
}

/// A blocked post or comment. Posts carry the title as the excerpt,
/// comments a truncated body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedItemRef {
    pub id: String,
    pub excerpt: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    pub first_seen: String,
    pub last_seen: String,
    pub trust_score: f64,
    pub reason: String,
    #[serde(default)]
    pub featured_posts: Vec<FeaturedPostRef>,
    #[serde(default)]
    pub featured_comments: Vec<FeaturedCommentRef>,
    #[serde(default)]
    pub post_appearances: u32,
    #[serde(default)]
    pub comment_appearances: u32,
}

impl AgentRecord {
    pub(crate) fn new(name: &str, date: &str) -> Self {
        Self {
            name: name.to_owned(),
            first_seen: date.to_owned(),
            last_seen: date.to_owned(),
            trust_score: 0.0,
            reason: "featured in daily digest".to_owned(),
            featured_posts: Vec::new(),
            featured_comments: Vec::new(),
            post_appearances: 0,
            comment_appearances: 0,
        }
    }

    /// カウントを参照リストから取り直し、`trustScore`を再導出する。
    pub(crate) fn recompute(&mut self) {
        self.post_appearances = u32::try_from(self.featured_posts.len()).unwrap_or(u32::MAX);
        self.comment_appearances = u32::try_from(self.featured_comments.len()).unwrap_or(u32::MAX);
        self.trust_score = TRUST_BASE
            + f64::from(self.post_appearances) * TRUST_PER_FEATURED_POST
            + f64::from(self.comment_appearances) * TRUST_PER_FEATURED_COMMENT;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAgentRecord {
    pub name: String,
    pub first_blocked: String,
    pub last_seen: String,
    pub trust_score: f64,
    pub reason: String,
    #[serde(default)]
    pub blocked_posts: Vec<BlockedItemRef>,
    #[serde(default)]
    pub blocked_comments: Vec<BlockedItemRef>,
    #[serde(default)]
    pub spam_post_count: u32,
    #[serde(default)]
    pub spam_comment_count: u32,
}

impl BlockedAgentRecord {
    pub(crate) fn new(name: &str, date: &str, reason: &str) -> Self {
        Self {
            name: name.to_owned(),
            first_blocked: date.to_owned(),
            last_seen: date.to_owned(),
            trust_score: 0.0,
            reason: reason.to_owned(),
            blocked_posts: Vec::new(),
            blocked_comments: Vec::new(),
            spam_post_count: 0,
            spam_comment_count: 0,
        }
    }

    pub(crate) fn recompute(&mut self) {
        self.spam_post_count = u32::try_from(self.blocked_posts.len()).unwrap_or(u32::MAX);
        self.spam_comment_count = u32::try_from(self.blocked_comments.len()).unwrap_or(u32::MAX);
        self.trust_score = -(f64::from(self.spam_post_count) * PENALTY_PER_SPAM_POST
            + f64::from(self.spam_comment_count) * PENALTY_PER_SPAM_COMMENT);
    }
}

/// ディスク上の元帳ドキュメント全体。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationStore {
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
    #[serde(default)]
    pub blocklist: Vec<BlockedAgentRecord>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub notes: String,
}
