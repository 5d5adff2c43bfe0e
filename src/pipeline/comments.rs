//! Comment enrichment for selected posts.
//!
//! Fetches candidate comments per selected post, drops spam, and runs the
//! two-pass diversifier so no single author dominates the digest's comment
//! slots while every post with candidates keeps at least one comment.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::clients::MoltbookClient;
use crate::feed::Comment;
use crate::pipeline::RunContext;
use crate::pipeline::curate::Selection;
use crate::pipeline::quality::detect_spam;

/// Per-author cap across the whole digest.
const MAX_PER_AUTHOR: usize = 2;
/// Per-post cap.
const MAX_PER_POST: usize = 3;
/// Fetch more than we keep so spam removal still leaves candidates.
const FETCH_LIMIT: usize = 20;

pub(crate) struct CommentSpamVerdict {
    pub(crate) comment: Comment,
    pub(crate) label: &'static str,
}

#[derive(Default)]
pub(crate) struct EnrichOutcome {
    /// Featured comments keyed by post id, in featured order.
    pub(crate) featured: FxHashMap<String, Vec<Comment>>,
    pub(crate) spam: Vec<CommentSpamVerdict>,
}

impl EnrichOutcome {
    pub(crate) fn featured_count(&self) -> usize {
        self.featured.values().map(Vec::len).sum()
    }
}

#[async_trait]
pub(crate) trait EnrichStage: Send + Sync {
    async fn execute(&self, ctx: &RunContext, selection: &Selection) -> EnrichOutcome;
}

pub(crate) struct ApiEnrichStage {
    client: Arc<MoltbookClient>,
    comments_per_post: usize,
}

impl ApiEnrichStage {
    pub(crate) fn new(client: Arc<MoltbookClient>, comments_per_post: usize) -> Self {
        Self {
            client,
            comments_per_post,
        }
    }
}

#[async_trait]
impl EnrichStage for ApiEnrichStage {
    async fn execute(&self, ctx: &RunContext, selection: &Selection) -> EnrichOutcome {
        if !self.client.has_credentials() {
            warn!(run_id = %ctx.run_id, "no API key configured, skipping comment enrichment");
            return EnrichOutcome::default();
        }

        let mut spam = Vec::new();
        let mut candidates: Vec<(String, Vec<Comment>)> = Vec::new();
        for entry in selection.selected() {
            let post_id = &entry.post.post.id;
            let fetched = match self.client.fetch_post_comments(post_id, FETCH_LIMIT).await {
                Ok(fetched) => fetched,
                Err(error) => {
                    // 1ポストの取得失敗でランは止めない。
                    warn!(post_id = %post_id, error = ?error, "comment fetch failed, post keeps no comments");
                    continue;
                }
            };

            let mut clean = Vec::new();
            for comment in fetched {
                if let Some(matcher) = detect_spam(&comment.content) {
                    spam.push(CommentSpamVerdict {
                        comment,
                        label: matcher.label,
                    });
                } else {
                    clean.push(comment);
                }
            }
            clean.sort_by(|a, b| b.upvotes.cmp(&a.upvotes).then_with(|| a.id.cmp(&b.id)));
            clean.truncate(self.comments_per_post);
            if !clean.is_empty() {
                candidates.push((post_id.clone(), clean));
            }
        }

        let featured = diversify_comments(&candidates);
        let outcome = EnrichOutcome { featured, spam };
        info!(
            run_id = %ctx.run_id,
            posts_with_comments = outcome.featured.len(),
            featured_comments = outcome.featured_count(),
            spam_comments = outcome.spam.len(),
            "enrich stage completed"
        );
        outcome
    }
}

/// Two-pass comment selection across the digest.
///
/// Pass 1 guarantees one comment per post, preferring authors with spare
/// global slots; pass 2 fills remaining slots by upvotes while holding the
/// per-author and per-post caps.
pub(crate) fn diversify_comments(
    candidates: &[(String, Vec<Comment>)],
) -> FxHashMap<String, Vec<Comment>> {
    let mut featured: FxHashMap<String, Vec<Comment>> = FxHashMap::default();
    let mut per_author: FxHashMap<String, usize> = FxHashMap::default();
    let mut taken: Vec<&Comment> = Vec::new();

    // Pass 1: one guaranteed comment per post.
    for (post_id, comments) in candidates {
        let Some(chosen) = comments
            .iter()
            .find(|c| per_author.get(&c.author.name).copied().unwrap_or(0) < MAX_PER_AUTHOR)
            .or_else(|| comments.first())
        else {
            continue;
        };
        *per_author.entry(chosen.author.name.clone()).or_insert(0) += 1;
        featured.entry(post_id.clone()).or_default().push(chosen.clone());
        taken.push(chosen);
    }

    // Pass 2: fill remaining slots by upvotes.
    let mut remaining: Vec<(&String, &Comment)> = candidates
        .iter()
        .flat_map(|(post_id, comments)| comments.iter().map(move |c| (post_id, c)))
        .filter(|(_, c)| !taken.iter().any(|t| t.id == c.id))
        .collect();
    remaining.sort_by(|a, b| b.1.upvotes.cmp(&a.1.upvotes).then_with(|| a.1.id.cmp(&b.1.id)));

    for (post_id, comment) in remaining {
        let author_count = per_author.get(&comment.author.name).copied().unwrap_or(0);
        let post_count = featured.get(post_id).map_or(0, Vec::len);
        if author_count >= MAX_PER_AUTHOR || post_count >= MAX_PER_POST {
            continue;
        }
        *per_author.entry(comment.author.name.clone()).or_insert(0) += 1;
        featured.entry(post_id.clone()).or_default().push(comment.clone());
    }

    featured
}
