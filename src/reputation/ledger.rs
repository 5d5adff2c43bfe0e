//! Mutation operations over the cached reputation store.
//!
//! The ledger is owned by the pipeline orchestrator and passed by reference
//! into the stages that need it; there is no ambient singleton. All
//! operations mutate memory only — persistence happens through an explicit
//! [`ReputationLedger::save`] at the end of the run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::reputation::records::{
    AgentRecord, BlockedAgentRecord, BlockedItemRef, FeaturedCommentRef, FeaturedPostRef,
    ReputationStore,
};
use crate::store::{JsonDocumentStore, StoreError};

pub(crate) struct ReputationLedger {
    store: JsonDocumentStore<ReputationStore>,
    doc: ReputationStore,
}

impl ReputationLedger {
    /// 元帳ドキュメントを読み込む。欠損・破損時は空の元帳で開始する。
    pub(crate) fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocumentStore::new(path);
        let doc = store.load();
        Self { store, doc }
    }

    /// Trust score for an author: positive if trusted, negative if blocked,
    /// zero if unknown.
    pub(crate) fn trust_score(&self, author: &str) -> f64 {
        if let Some(agent) = self.doc.agents.iter().find(|a| a.name == author) {
            return agent.trust_score;
        }
        if let Some(blocked) = self.doc.blocklist.iter().find(|b| b.name == author) {
            return blocked.trust_score;
        }
        0.0
    }

    pub(crate) fn is_blocked(&self, author: &str) -> bool {
        self.doc.blocklist.iter().any(|b| b.name == author)
    }

    /// Record a featured post. Idempotent by post id: a repeat only
    /// refreshes `lastSeen`.
    pub(crate) fn record_featured_post(&mut self, author: &str, date: &str, item: FeaturedPostRef) {
        if self.is_blocked(author) {
            // No path back from blocked; featured events for blocked agents
            // are dropped.
            return;
        }
        let agent = self.trusted_entry(author, date);
        agent.last_seen = date.to_owned();
        if agent.featured_posts.iter().any(|p| p.id == item.id) {
            return;
        }
        agent.featured_posts.push(item);
        agent.recompute();
    }

    /// Record a featured comment. Idempotent by comment id.
    pub(crate) fn record_featured_comment(
        &mut self,
        author: &str,
        date: &str,
        item: FeaturedCommentRef,
    ) {
        if self.is_blocked(author) {
            return;
        }
        let agent = self.trusted_entry(author, date);
        agent.last_seen = date.to_owned();
        if agent.featured_comments.iter().any(|c| c.id == item.id) {
            return;
        }
        agent.featured_comments.push(item);
        agent.recompute();
    }

    /// Record a spam post. The agent's first spam event removes any trusted
    /// record before creating the blocked one.
    pub(crate) fn record_blocked_post(
        &mut self,
        author: &str,
        date: &str,
        reason: &str,
        item: BlockedItemRef,
    ) {
        let blocked = self.blocked_entry(author, date, reason);
        blocked.last_seen = date.to_owned();
        if blocked.blocked_posts.iter().any(|p| p.id == item.id) {
            return;
        }
        blocked.blocked_posts.push(item);
        blocked.recompute();
    }

    /// Record a spam comment, symmetric to [`Self::record_blocked_post`].
    pub(crate) fn record_blocked_comment(
        &mut self,
        author: &str,
        date: &str,
        reason: &str,
        item: BlockedItemRef,
    ) {
        let blocked = self.blocked_entry(author, date, reason);
        blocked.last_seen = date.to_owned();
        if blocked.blocked_comments.iter().any(|c| c.id == item.id) {
            return;
        }
        blocked.blocked_comments.push(item);
        blocked.recompute();
    }

    /// 元帳を書き戻す。`lastUpdated`はここでのみ更新される。
    ///
    /// # Errors
    /// 書き込み失敗はエラーとして返す。呼び出し側はログに残してラン自体は
    /// 続行する。メモリ上の状態は有効なまま。
    pub(crate) fn save(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.doc.last_updated = now.to_rfc3339();
        self.store.save(&self.doc)
    }

    pub(crate) fn trusted_count(&self) -> usize {
        self.doc.agents.len()
    }

    pub(crate) fn blocked_count(&self) -> usize {
        self.doc.blocklist.len()
    }

    fn trusted_entry(&mut self, author: &str, date: &str) -> &mut AgentRecord {
        if let Some(index) = self.doc.agents.iter().position(|a| a.name == author) {
            return &mut self.doc.agents[index];
        }
        self.doc.agents.push(AgentRecord::new(author, date));
        let index = self.doc.agents.len() - 1;
        &mut self.doc.agents[index]
    }

    fn blocked_entry(&mut self, author: &str, date: &str, reason: &str) -> &mut BlockedAgentRecord {
        if let Some(index) = self.doc.agents.iter().position(|a| a.name == author) {
            let removed = self.doc.agents.remove(index);
            info!(
                author,
                trust_score = removed.trust_score,
                reason,
                "trusted agent demoted to blocklist"
            );
        }
        if let Some(index) = self.doc.blocklist.iter().position(|b| b.name == author) {
            return &mut self.doc.blocklist[index];
        }
        self.doc
            .blocklist
            .push(BlockedAgentRecord::new(author, date, reason));
        let index = self.doc.blocklist.len() - 1;
        &mut self.doc.blocklist[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "2026-08-29";

    fn post_ref(id: &str) -> FeaturedPostRef {
        FeaturedPostRef {
            id: id.to_owned(),
            title: format!("post {id}"),
            date: DATE.to_owned(),
            upvotes: 10,
        }
    }

    fn blocked_ref(id: &str) -> BlockedItemRef {
        BlockedItemRef {
            id: id.to_owned(),
            excerpt: "BUY NOW".to_owned(),
            date: DATE.to_owned(),
        }
    }

    fn ledger() -> ReputationLedger {
        let dir = tempfile::tempdir().expect("tempdir");
        ReputationLedger::open(dir.path().join("reputation.json"))
    }

    #[test]
    fn unknown_author_scores_zero() {
        assert!(ledger().trust_score("nobody").abs() < f64::EPSILON);
    }

    #[test]
    fn first_featured_post_creates_trusted_record() {
        let mut ledger = ledger();

        ledger.record_featured_post("claude_prime", DATE, post_ref("p1"));

        assert!((ledger.trust_score("claude_prime") - 6.0).abs() < f64::EPSILON);
        assert_eq!(ledger.trusted_count(), 1);
    }

    #[test]
    fn recording_the_same_post_twice_is_idempotent() {
        let mut ledger = ledger();

        ledger.record_featured_post("claude_prime", DATE, post_ref("p1"));
        let after_first = ledger.trust_score("claude_prime");
        ledger.record_featured_post("claude_prime", "2026-08-30", post_ref("p1"));

        assert!((ledger.trust_score("claude_prime") - after_first).abs() < f64::EPSILON);
    }

    #[test]
    fn featured_comment_uses_half_weight() {
        let mut ledger = ledger();

        ledger.record_featured_comment(
            "claude_prime",
            DATE,
            FeaturedCommentRef {
                id: "c1".into(),
                post_id: "p1".into(),
                post_title: "post p1".into(),
                content: "a thought".into(),
                upvotes: 4,
            },
        );

        assert!((ledger.trust_score("claude_prime") - 5.5).abs() < f64::EPSILON);
    }

    #[test]
    fn first_spam_event_demotes_trusted_agent() {
        let mut ledger = ledger();
        ledger.record_featured_post("turncoat", DATE, post_ref("p1"));

        ledger.record_blocked_post("turncoat", DATE, "crypto spam", blocked_ref("s1"));

        assert_eq!(ledger.trusted_count(), 0);
        assert_eq!(ledger.blocked_count(), 1);
        assert!((ledger.trust_score("turncoat") - (-5.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn repeat_spam_events_accumulate_penalty() {
        let mut ledger = ledger();

        ledger.record_blocked_post("spam_bot", DATE, "crypto spam", blocked_ref("s1"));
        ledger.record_blocked_comment("spam_bot", DATE, "crypto spam", blocked_ref("s2"));
        // Duplicate id is a no-op.
        ledger.record_blocked_post("spam_bot", DATE, "crypto spam", blocked_ref("s1"));

        assert!((ledger.trust_score("spam_bot") - (-7.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn featured_events_for_blocked_agents_are_dropped() {
        let mut ledger = ledger();
        ledger.record_blocked_post("spam_bot", DATE, "crypto spam", blocked_ref("s1"));

        ledger.record_featured_post("spam_bot", DATE, post_ref("p1"));

        assert_eq!(ledger.trusted_count(), 0);
        assert!(ledger.trust_score("spam_bot") < 0.0);
    }

    #[test]
    fn blocklist_membership_does_not_depend_on_the_score() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reputation.json");
        // A hand-edited entry whose item lists were emptied scores zero.
        std::fs::write(
            &path,
            r#"{
                "agents": [],
                "blocklist": [{
                    "name": "spam_bot",
                    "firstBlocked": "2026-08-01",
                    "lastSeen": "2026-08-01",
                    "trustScore": 0.0,
                    "reason": "crypto spam",
                    "blockedPosts": [],
                    "blockedComments": []
                }],
                "lastUpdated": "2026-08-01T00:00:00+00:00"
            }"#,
        )
        .expect("write store");

        let ledger = ReputationLedger::open(&path);

        assert!(ledger.is_blocked("spam_bot"));
        assert!(ledger.trust_score("spam_bot").abs() < f64::EPSILON);
    }

    #[test]
    fn save_refreshes_last_updated_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reputation.json");
        let now = DateTime::parse_from_rfc3339("2026-08-29T06:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);

        let mut ledger = ReputationLedger::open(&path);
        ledger.record_featured_post("claude_prime", DATE, post_ref("p1"));
        ledger.save(now).expect("save");

        let reopened = ReputationLedger::open(&path);
        assert!((reopened.trust_score("claude_prime") - 6.0).abs() < f64::EPSILON);
        assert_eq!(reopened.doc.last_updated, now.to_rfc3339());
    }
}
