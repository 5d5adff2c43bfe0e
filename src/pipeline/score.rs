//! Pure post scoring.
//!
//! Scoring is deterministic over `(post, priority topics, trust lookup, now)`
//! and does no I/O; the trust lookup is injected so the scorer never touches
//! the ledger store directly.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::feed::{ClassifiedPost, Topic};
use crate::reputation::ReputationLedger;

/// Engagement saturates here so a single viral post cannot drown the rest.
const ENGAGEMENT_CAP: f64 = 60.0;
/// Recency decays linearly to zero at this age.
const RECENCY_HORIZON_HOURS: f64 = 72.0;
const RECENCY_MAX: f64 = 15.0;
const TOPIC_RELEVANCE_WEIGHT: f64 = 15.0;
const SIGNIFICANCE_WEIGHT: f64 = 20.0;
const TRUST_MULTIPLIER: f64 = 2.0;

/// Trust score source for the scorer. The ledger implements it; tests use
/// fakes.
pub(crate) trait TrustLookup: Send + Sync {
    fn trust_score(&self, author: &str) -> f64;

    /// Blocklist membership. The default derives it from the score, but the
    /// ledger answers from the blocklist itself so an entry whose score
    /// happens to be zero is still excluded.
    fn is_blocked(&self, author: &str) -> bool {
        self.trust_score(author) < 0.0
    }
}

impl TrustLookup for ReputationLedger {
    fn trust_score(&self, author: &str) -> f64 {
        ReputationLedger::trust_score(self, author)
    }

    fn is_blocked(&self, author: &str) -> bool {
        ReputationLedger::is_blocked(self, author)
    }
}

/// 1投稿分のスコア内訳。毎回新しく構築され、使い回されない。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScoreBreakdown {
    pub significance: f64,
    pub engagement: f64,
    pub recency: f64,
    pub topic_relevance: f64,
    pub trust_bonus: f64,
    pub total: f64,
}

pub(crate) fn score_post(
    post: &ClassifiedPost,
    priority_topics: &[Topic],
    trust: &dyn TrustLookup,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let significance =
        (3.0 - f64::from(post.classification.significance.index())) * SIGNIFICANCE_WEIGHT;

    let upvotes = post.post.upvotes.max(1);
    #[allow(clippy::cast_precision_loss)]
    let mass = (upvotes + post.post.comment_count + 1) as f64;
    let engagement = (mass.log10() * 25.0).min(ENGAGEMENT_CAP);

    let age_hours = post.age_hours(now);
    let recency = (RECENCY_MAX - (age_hours / RECENCY_HORIZON_HOURS) * RECENCY_MAX).max(0.0);

    let matching = post
        .classification
        .all_topics()
        .filter(|topic| priority_topics.contains(topic))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let topic_relevance = matching as f64 * TOPIC_RELEVANCE_WEIGHT;

    let trust = trust.trust_score(&post.post.author.name);
    // Negative trust never lowers the score here; blocked authors are
    // excluded upstream by the filter stage.
    let trust_bonus = if trust > 0.0 {
        trust * TRUST_MULTIPLIER
    } else {
        0.0
    };

    let total = significance + engagement + recency + topic_relevance + trust_bonus;
    ScoreBreakdown {
        significance,
        engagement,
        recency,
        topic_relevance,
        trust_bonus,
        total,
    }
}
