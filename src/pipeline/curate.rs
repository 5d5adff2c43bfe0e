//! Digest curation: hybrid fresh/trending selection, the legacy diversified
//! single list, highlight strings, and emerging themes.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::feed::{ClassifiedPost, Topic};
use crate::pipeline::RunContext;
use crate::pipeline::score::{ScoreBreakdown, TrustLookup, score_post};
use crate::util::text::truncate_graphemes;

/// Legacy mode admits at most this many posts per primary topic.
const MAX_PER_TOPIC: usize = 3;
const HIGHLIGHT_GRAPHEMES: usize = 100;
const EMERGING_THEME_COUNT: usize = 3;

/// A selected post with its score and presentation strings.
pub(crate) struct RankedPost {
    pub(crate) post: ClassifiedPost,
    pub(crate) breakdown: ScoreBreakdown,
    pub(crate) boosted_total: f64,
    pub(crate) highlight: String,
}

/// Curation output. Hybrid mode fills `fresh`/`trending`; legacy mode fills
/// `legacy`. The unused lists stay empty.
pub(crate) struct Selection {
    pub(crate) fresh: Vec<RankedPost>,
    pub(crate) trending: Vec<RankedPost>,
    pub(crate) legacy: Vec<RankedPost>,
    pub(crate) emerging_themes: Vec<String>,
}

impl Selection {
    pub(crate) fn selected(&self) -> impl Iterator<Item = &RankedPost> {
        self.fresh
            .iter()
            .chain(self.trending.iter())
            .chain(self.legacy.iter())
    }

    pub(crate) fn selected_count(&self) -> usize {
        self.fresh.len() + self.trending.len() + self.legacy.len()
    }

    pub(crate) fn featured_ids(&self) -> FxHashSet<String> {
        self.selected().map(|entry| entry.post.post.id.clone()).collect()
    }
}

pub(crate) trait CurateStage: Send + Sync {
    fn execute(
        &self,
        ctx: &RunContext,
        posts: Vec<ClassifiedPost>,
        trust: &dyn TrustLookup,
    ) -> Selection;
}

pub(crate) struct HybridCurateStage {
    priority_topics: Vec<Topic>,
    hybrid_enabled: bool,
    max_fresh: usize,
    max_trending: usize,
    fresh_hours: f64,
    max_posts: usize,
    diversify_topics: bool,
}

struct Scored {
    post: ClassifiedPost,
    breakdown: ScoreBreakdown,
    boosted_total: f64,
}

impl HybridCurateStage {
    pub(crate) fn new(
        priority_topics: Vec<Topic>,
        hybrid_enabled: bool,
        max_fresh: usize,
        max_trending: usize,
        fresh_hours: f64,
        max_posts: usize,
        diversify_topics: bool,
    ) -> Self {
        Self {
            priority_topics,
            hybrid_enabled,
            max_fresh,
            max_trending,
            fresh_hours,
            max_posts,
            diversify_topics,
        }
    }

    fn curate_hybrid(&self, ctx: &RunContext, posts: Vec<ClassifiedPost>, trust: &dyn TrustLookup) -> Selection {
        let mut fresh = Vec::new();
        let mut trending = Vec::new();
        for post in posts {
            let breakdown = score_post(&post, &self.priority_topics, trust, ctx.now);
            let is_fresh = post.age_hours(ctx.now) <= self.fresh_hours;
            // Fresh rewards "new and rising", trending "proven and popular";
            // both start from the same base so the lanes stay comparable.
            let boost = if is_fresh {
                breakdown.recency
            } else {
                breakdown.engagement
            };
            let scored = Scored {
                post,
                breakdown,
                boosted_total: breakdown.total + boost,
            };
            if is_fresh {
                fresh.push(scored);
            } else {
                trending.push(scored);
            }
        }

        sort_ranked(&mut fresh);
        sort_ranked(&mut trending);
        fresh.truncate(self.max_fresh);
        trending.truncate(self.max_trending);

        let fresh: Vec<RankedPost> = fresh.into_iter().map(into_ranked).collect();
        let trending: Vec<RankedPost> = trending.into_iter().map(into_ranked).collect();
        let emerging_themes =
            emerging_themes(fresh.iter().chain(trending.iter()).map(|r| &r.post));
        Selection {
            fresh,
            trending,
            legacy: Vec::new(),
            emerging_themes,
        }
    }

    fn curate_legacy(&self, ctx: &RunContext, posts: Vec<ClassifiedPost>, trust: &dyn TrustLookup) -> Selection {
        let mut ranked: Vec<Scored> = posts
            .into_iter()
            .map(|post| {
                let breakdown = score_post(&post, &self.priority_topics, trust, ctx.now);
                Scored {
                    post,
                    breakdown,
                    boosted_total: breakdown.total,
                }
            })
            .collect();
        sort_ranked(&mut ranked);

        let mut per_topic: FxHashMap<Topic, usize> = FxHashMap::default();
        let mut legacy = Vec::new();
        for scored in ranked {
            if legacy.len() >= self.max_posts {
                break;
            }
            if self.diversify_topics {
                let count = per_topic
                    .entry(scored.post.classification.topic)
                    .or_insert(0);
                if *count >= MAX_PER_TOPIC {
                    continue;
                }
                *count += 1;
            }
            legacy.push(into_ranked(scored));
        }

        let emerging_themes = emerging_themes(legacy.iter().map(|r| &r.post));
        Selection {
            fresh: Vec::new(),
            trending: Vec::new(),
            legacy,
            emerging_themes,
        }
    }
}

impl CurateStage for HybridCurateStage {
    fn execute(
        &self,
        ctx: &RunContext,
        posts: Vec<ClassifiedPost>,
        trust: &dyn TrustLookup,
    ) -> Selection {
        let pool = posts.len();
        let selection = if self.hybrid_enabled {
            self.curate_hybrid(ctx, posts, trust)
        } else {
            self.curate_legacy(ctx, posts, trust)
        };
        info!(
            run_id = %ctx.run_id,
            pool,
            fresh = selection.fresh.len(),
            trending = selection.trending.len(),
            legacy = selection.legacy.len(),
            "curate stage completed"
        );
        selection
    }
}

/// Boosted total descending, then upvotes descending, then id ascending.
fn sort_ranked(items: &mut [Scored]) {
    items.sort_by(|a, b| {
        b.boosted_total
            .partial_cmp(&a.boosted_total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.post.post.upvotes.cmp(&a.post.post.upvotes))
            .then_with(|| a.post.post.id.cmp(&b.post.post.id))
    });
}

fn into_ranked(scored: Scored) -> RankedPost {
    let highlight = highlight(&scored.post);
    RankedPost {
        post: scored.post,
        breakdown: scored.breakdown,
        boosted_total: scored.boosted_total,
        highlight,
    }
}

fn highlight(post: &ClassifiedPost) -> String {
    let classification = &post.classification;
    let snippet = if classification.summary.trim().is_empty() {
        truncate_graphemes(&post.post.title, HIGHLIGHT_GRAPHEMES)
    } else {
        truncate_graphemes(&classification.summary, HIGHLIGHT_GRAPHEMES)
    };
    format!(
        "{} {} — {} ({} upvotes)",
        classification.significance.emoji(),
        snippet,
        post.post.author.name,
        post.post.upvotes
    )
}

/// Top topic counts across the selection, plus the dominant sentiment tag.
fn emerging_themes<'a>(selected: impl Iterator<Item = &'a ClassifiedPost>) -> Vec<String> {
    let mut topic_counts: FxHashMap<Topic, usize> = FxHashMap::default();
    let mut sentiment_counts: FxHashMap<&str, usize> = FxHashMap::default();
    for post in selected {
        *topic_counts.entry(post.classification.topic).or_insert(0) += 1;
        for sentiment in &post.classification.sentiments {
            *sentiment_counts.entry(sentiment.as_str()).or_insert(0) += 1;
        }
    }

    let mut topics: Vec<(Topic, usize)> = topic_counts.into_iter().collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_code().cmp(b.0.as_code())));

    let mut themes: Vec<String> = topics
        .into_iter()
        .take(EMERGING_THEME_COUNT)
        .map(|(topic, count)| format!("{} ({count} posts)", topic.as_code()))
        .collect();

    if let Some((sentiment, _)) = sentiment_counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
    {
        themes.push(format!("mood: {sentiment}"));
    }
    themes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Author, Classification, Community, Post, Significance};
    use chrono::{DateTime, Utc};
    use rustc_hash::FxHashMap;
    use uuid::Uuid;

    struct FakeTrust(FxHashMap<String, f64>);

    impl TrustLookup for FakeTrust {
        fn trust_score(&self, author: &str) -> f64 {
            self.0.get(author).copied().unwrap_or(0.0)
        }
    }

    fn no_trust() -> FakeTrust {
        FakeTrust(FxHashMap::default())
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            now: "2026-08-29T12:00:00Z".parse::<DateTime<Utc>>().expect("timestamp"),
        }
    }

    fn post(id: &str, topic: Topic, upvotes: i64, age_hours: i64) -> ClassifiedPost {
        let created_at = ctx().now - chrono::Duration::hours(age_hours);
        let post = Post {
            id: id.to_owned(),
            title: format!("a longer title for {id}"),
            content: None,
            submolt: Community {
                name: "consciousness".to_owned(),
                display_name: "Consciousness".to_owned(),
            },
            author: Author {
                name: format!("author_{id}"),
            },
            upvotes,
            downvotes: 0,
            comment_count: 4,
            created_at,
            classification: Some(Classification {
                topic,
                secondary_topics: Vec::new(),
                significance: Significance::Notable,
                sentiments: vec!["curious".to_owned()],
                summary: String::new(),
            }),
        };
        ClassifiedPost::from_post(post).expect("classified")
    }

    fn hybrid_stage() -> HybridCurateStage {
        HybridCurateStage::new(vec![Topic::Exist], true, 5, 5, 24.0, 10, true)
    }

    fn legacy_stage(max_posts: usize) -> HybridCurateStage {
        HybridCurateStage::new(vec![Topic::Exist], false, 5, 5, 24.0, max_posts, true)
    }

    #[test]
    fn hybrid_partitions_at_the_fresh_cutoff() {
        let stage = hybrid_stage();
        let posts = vec![
            post("young", Topic::Exist, 50, 10),
            post("older", Topic::Exist, 50, 30),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        assert_eq!(selection.fresh.len(), 1);
        assert_eq!(selection.trending.len(), 1);
        assert_eq!(selection.fresh[0].post.post.id, "young");
        assert_eq!(selection.trending[0].post.post.id, "older");
        // Fresh doubles recency, trending doubles engagement.
        let fresh = &selection.fresh[0];
        let trending = &selection.trending[0];
        assert!(
            (fresh.boosted_total - (fresh.breakdown.total + fresh.breakdown.recency)).abs()
                < f64::EPSILON
        );
        assert!(
            (trending.boosted_total - (trending.breakdown.total + trending.breakdown.engagement))
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn hybrid_respects_per_lane_caps() {
        let stage = HybridCurateStage::new(vec![], true, 2, 1, 24.0, 10, true);
        let posts = vec![
            post("f1", Topic::Exist, 90, 1),
            post("f2", Topic::Exist, 80, 2),
            post("f3", Topic::Exist, 70, 3),
            post("t1", Topic::Exist, 90, 30),
            post("t2", Topic::Exist, 80, 40),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        assert_eq!(selection.fresh.len(), 2);
        assert_eq!(selection.trending.len(), 1);
        assert_eq!(selection.trending[0].post.post.id, "t1");
    }

    #[test]
    fn ties_break_on_upvotes_then_id() {
        let stage = hybrid_stage();
        // Identical scores except upvotes; then identical everything but id.
        let posts = vec![
            post("b", Topic::Tech, 50, 5),
            post("a", Topic::Tech, 50, 5),
            post("c", Topic::Tech, 80, 5),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        let order: Vec<&str> = selection
            .fresh
            .iter()
            .map(|r| r.post.post.id.as_str())
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn legacy_caps_three_posts_per_topic() {
        let stage = legacy_stage(10);
        let posts = vec![
            post("e1", Topic::Exist, 90, 1),
            post("e2", Topic::Exist, 80, 1),
            post("e3", Topic::Exist, 70, 1),
            post("e4", Topic::Exist, 60, 1),
            post("t1", Topic::Tech, 10, 1),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        let exist_count = selection
            .legacy
            .iter()
            .filter(|r| r.post.classification.topic == Topic::Exist)
            .count();
        assert_eq!(exist_count, 3);
        assert_eq!(selection.legacy.len(), 4);
    }

    #[test]
    fn legacy_is_bounded_by_max_posts() {
        let stage = legacy_stage(2);
        let posts = vec![
            post("e1", Topic::Exist, 90, 1),
            post("t1", Topic::Tech, 80, 1),
            post("h1", Topic::Human, 70, 1),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        assert_eq!(selection.legacy.len(), 2);
    }

    #[test]
    fn highlight_carries_emoji_author_and_upvotes() {
        let stage = legacy_stage(5);
        let posts = vec![post("p1", Topic::Exist, 42, 1)];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        let highlight = &selection.legacy[0].highlight;
        assert!(highlight.starts_with('⭐'));
        assert!(highlight.contains("author_p1"));
        assert!(highlight.contains("42 upvotes"));
    }

    #[test]
    fn emerging_themes_rank_topics_and_mood() {
        let stage = legacy_stage(10);
        let posts = vec![
            post("e1", Topic::Exist, 90, 1),
            post("e2", Topic::Exist, 80, 1),
            post("t1", Topic::Tech, 70, 1),
        ];

        let selection = stage.execute(&ctx(), posts, &no_trust());

        assert_eq!(selection.emerging_themes[0], "EXIST (2 posts)");
        assert_eq!(selection.emerging_themes[1], "TECH (1 posts)");
        assert!(selection.emerging_themes.contains(&"mood: curious".to_owned()));
    }
}
