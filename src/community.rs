//! Per-community activity tracker.
//!
//! Aggregates each run's post window into lifetime counters and a rolling
//! window of daily stats per community. Persisted as one `camelCase` JSON
//! document with the same load-tolerant/save-explicit contract as the
//! reputation ledger.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::feed::ClassifiedPost;
use crate::store::{JsonDocumentStore, StoreError};

/// 保持する日次統計の日数。
const DAILY_STATS_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub date: String,
    pub posts: u32,
    pub upvotes: i64,
    pub comments: i64,
    pub featured: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityActivity {
    pub name: String,
    pub display_name: String,
    pub first_seen: String,
    pub last_seen: String,
    pub post_count: u32,
    pub total_upvotes: i64,
    pub total_comments: i64,
    pub featured_count: u32,
    #[serde(default)]
    pub daily_stats: Vec<DailyStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityActivityStore {
    #[serde(default)]
    pub communities: Vec<CommunityActivity>,
    #[serde(default)]
    pub last_updated: String,
}

pub(crate) struct CommunityTracker {
    store: JsonDocumentStore<CommunityActivityStore>,
    doc: CommunityActivityStore,
}

impl CommunityTracker {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocumentStore::new(path);
        let doc = store.load();
        Self { store, doc }
    }

    /// Fold one run's window into the tracker. The daily stat for `date` is
    /// replaced, not accumulated, so a re-run of the same date does not
    /// inflate that day's numbers.
    pub(crate) fn record_window(
        &mut self,
        date: &str,
        window: &[ClassifiedPost],
        featured_ids: &FxHashSet<String>,
    ) {
        let mut touched: FxHashSet<String> = FxHashSet::default();
        for post in window {
            let community = &post.post.submolt;
            let index = if let Some(index) = self
                .doc
                .communities
                .iter()
                .position(|c| c.name == community.name)
            {
                index
            } else {
                self.doc.communities.push(CommunityActivity {
                    name: community.name.clone(),
                    display_name: community.display_name.clone(),
                    first_seen: date.to_owned(),
                    last_seen: date.to_owned(),
                    post_count: 0,
                    total_upvotes: 0,
                    total_comments: 0,
                    featured_count: 0,
                    daily_stats: Vec::new(),
                });
                self.doc.communities.len() - 1
            };
            let entry = &mut self.doc.communities[index];

            if !community.display_name.is_empty() {
                entry.display_name = community.display_name.clone();
            }
            entry.last_seen = date.to_owned();

            let featured = featured_ids.contains(&post.post.id);
            entry.post_count += 1;
            entry.total_upvotes += post.post.upvotes;
            entry.total_comments += post.post.comment_count;
            if featured {
                entry.featured_count += 1;
            }

            if touched.insert(community.name.clone()) {
                // First post for this community today resets the daily slot.
                entry.daily_stats.retain(|s| s.date != date);
                entry.daily_stats.push(DailyStat {
                    date: date.to_owned(),
                    posts: 0,
                    upvotes: 0,
                    comments: 0,
                    featured: 0,
                });
            }
            if let Some(stat) = entry.daily_stats.iter_mut().find(|s| s.date == date) {
                stat.posts += 1;
                stat.upvotes += post.post.upvotes;
                stat.comments += post.post.comment_count;
                if featured {
                    stat.featured += 1;
                }
            }
        }

        for entry in &mut self.doc.communities {
            entry.daily_stats.sort_by(|a, b| a.date.cmp(&b.date));
            if entry.daily_stats.len() > DAILY_STATS_WINDOW {
                let excess = entry.daily_stats.len() - DAILY_STATS_WINDOW;
                entry.daily_stats.drain(..excess);
            }
        }
    }

    pub(crate) fn community_count(&self) -> usize {
        self.doc.communities.len()
    }

    /// # Errors
    /// 書き込み失敗はエラーとして返す。呼び出し側でログに残す。
    pub(crate) fn save(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.doc.last_updated = now.to_rfc3339();
        self.store.save(&self.doc)
    }
}
