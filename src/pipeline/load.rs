//! Collection-document loading.
//!
//! The collector drops one JSON document per fetch into the data directory;
//! each document may carry posts under `posts`, `hot`, or `new`. The load
//! stage folds all of them into one normalized, deduplicated window.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::feed::{ClassifiedPost, Post};
use crate::pipeline::RunContext;

#[async_trait]
pub(crate) trait LoadStage: Send + Sync {
    async fn execute(&self, ctx: &RunContext) -> Result<Vec<ClassifiedPost>>;
}

/// 収集ディレクトリ内の全`*.json`ドキュメントを読み込むステージ。
pub(crate) struct DataDirLoadStage {
    data_dir: PathBuf,
    window_days: u32,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionDocument {
    #[serde(default)]
    posts: Vec<Post>,
    #[serde(default)]
    hot: Vec<Post>,
    #[serde(default)]
    new: Vec<Post>,
}

impl CollectionDocument {
    fn into_posts(self) -> impl Iterator<Item = Post> {
        self.posts
            .into_iter()
            .chain(self.hot)
            .chain(self.new)
    }
}

impl DataDirLoadStage {
    pub(crate) fn new(data_dir: PathBuf, window_days: u32) -> Self {
        Self {
            data_dir,
            window_days,
        }
    }
}

fn normalize(post: &mut Post) {
    post.title = post.title.nfc().collect();
    if let Some(content) = post.content.take() {
        post.content = Some(content.nfc().collect());
    }
}

#[async_trait]
impl LoadStage for DataDirLoadStage {
    async fn execute(&self, ctx: &RunContext) -> Result<Vec<ClassifiedPost>> {
        let mut entries = tokio::fs::read_dir(&self.data_dir).await.with_context(|| {
            format!("failed to read data dir {}", self.data_dir.display())
        })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to iterate data dir")?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        // Deterministic fold order regardless of directory iteration order.
        paths.sort();

        let cutoff = ctx.now - Duration::days(i64::from(self.window_days));
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut window = Vec::new();
        let mut documents = 0_usize;
        let mut duplicates = 0_usize;
        let mut out_of_window = 0_usize;
        let mut unclassified = 0_usize;

        for path in paths {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable collection document");
                    continue;
                }
            };
            let document: CollectionDocument = match serde_json::from_str(&raw) {
                Ok(document) => document,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping malformed collection document");
                    continue;
                }
            };
            documents += 1;

            for mut post in document.into_posts() {
                if !seen.insert(post.id.clone()) {
                    duplicates += 1;
                    continue;
                }
                if post.created_at < cutoff || post.created_at > ctx.now {
                    out_of_window += 1;
                    continue;
                }
                normalize(&mut post);
                let id = post.id.clone();
                if let Some(classified) = ClassifiedPost::from_post(post) {
                    window.push(classified);
                } else {
                    warn!(post_id = %id, "dropping unclassified post");
                    unclassified += 1;
                }
            }
        }

        info!(
            run_id = %ctx.run_id,
            documents,
            loaded = window.len(),
            duplicates,
            out_of_window,
            unclassified,
            "load stage completed"
        );
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            now: "2026-08-29T12:00:00Z".parse::<DateTime<Utc>>().expect("timestamp"),
        }
    }

    fn post_json(id: &str, created_at: &str, classified: bool) -> serde_json::Value {
        let mut value = json!({
            "id": id,
            "title": format!("post {id} title"),
            "submolt": "consciousness",
            "author": { "name": "claude_prime" },
            "upvotes": 10,
            "comment_count": 2,
            "created_at": created_at,
        });
        if classified {
            value["classification"] = json!({
                "topic": "EXIST",
                "significance": "notable",
            });
        }
        value
    }

    async fn run(dir: &tempfile::TempDir, window_days: u32) -> Vec<ClassifiedPost> {
        let stage = DataDirLoadStage::new(dir.path().to_path_buf(), window_days);
        stage.execute(&ctx()).await.expect("load")
    }

    #[tokio::test]
    async fn folds_posts_hot_and_new_arrays() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = json!({
            "posts": [post_json("p1", "2026-08-29T10:00:00Z", true)],
            "hot": [post_json("p2", "2026-08-29T09:00:00Z", true)],
            "new": [post_json("p3", "2026-08-29T08:00:00Z", true)],
        });
        std::fs::write(dir.path().join("run-1.json"), doc.to_string()).expect("write");

        let window = run(&dir, 1).await;

        assert_eq!(window.len(), 3);
    }

    #[tokio::test]
    async fn dedupes_posts_across_documents_first_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = json!({ "posts": [post_json("p1", "2026-08-29T10:00:00Z", true)] });
        let second = json!({ "hot": [post_json("p1", "2026-08-29T10:00:00Z", true)] });
        std::fs::write(dir.path().join("a.json"), first.to_string()).expect("write");
        std::fs::write(dir.path().join("b.json"), second.to_string()).expect("write");

        let window = run(&dir, 1).await;

        assert_eq!(window.len(), 1);
    }

    #[tokio::test]
    async fn drops_posts_outside_the_window_and_unclassified_posts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = json!({
            "posts": [
                post_json("recent", "2026-08-29T06:00:00Z", true),
                post_json("stale", "2026-08-26T06:00:00Z", true),
                post_json("raw", "2026-08-29T07:00:00Z", false),
            ],
        });
        std::fs::write(dir.path().join("run.json"), doc.to_string()).expect("write");

        let window = run(&dir, 1).await;

        assert_eq!(window.len(), 1);
        assert_eq!(window[0].post.id, "recent");
    }

    #[tokio::test]
    async fn skips_malformed_documents_without_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bad.json"), "{not json").expect("write");
        let doc = json!({ "posts": [post_json("p1", "2026-08-29T10:00:00Z", true)] });
        std::fs::write(dir.path().join("good.json"), doc.to_string()).expect("write");

        let window = run(&dir, 1).await;

        assert_eq!(window.len(), 1);
    }

    #[tokio::test]
    async fn missing_data_dir_is_an_error() {
        let stage = DataDirLoadStage::new(PathBuf::from("/nonexistent/digest-data"), 1);

        assert!(stage.execute(&ctx()).await.is_err());
    }

    #[tokio::test]
    async fn titles_are_nfc_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        // "é" as 'e' + combining acute accent.
        let mut value = post_json("p1", "2026-08-29T10:00:00Z", true);
        value["title"] = json!("cafe\u{301} thoughts");
        let doc = json!({ "posts": [value] });
        std::fs::write(dir.path().join("run.json"), doc.to_string()).expect("write");

        let window = run(&dir, 1).await;

        assert_eq!(window[0].post.title, "café thoughts");
    }
}
