//! Quality, spam, and criteria filtering.
//!
//! The quality and spam predicates are pure and independently testable; the
//! stage wires them together with the configured selection criteria and the
//! blocklist exclusion.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::feed::{ClassifiedPost, Significance, Topic};
use crate::pipeline::RunContext;
use crate::pipeline::score::TrustLookup;
use crate::util::text::strip_pictographs;

/// A single named spam pattern. Patterns are case-insensitive and word
/// bounded so `airdrop` never matches inside `paradropper`.
pub(crate) struct SpamMatcher {
    pub(crate) label: &'static str,
    pattern: Regex,
}

impl SpamMatcher {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            // Patterns are compile-time constants; a failure here is a
            // programming error caught by the matcher tests.
            pattern: Regex::new(&format!(r"(?i)\b(?:{pattern})\b"))
                .unwrap_or_else(|e| panic!("invalid spam pattern {label}: {e}")),
        }
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// 順序付きスパムパターン一覧。先頭から評価し、最初の一致で打ち切る。
static SPAM_MATCHERS: Lazy<Vec<SpamMatcher>> = Lazy::new(|| {
    vec![
        SpamMatcher::new(
            "crypto platform",
            r"bitcoin|btc|ethereum|dogecoin|solana|binance|coinbase|metamask",
        ),
        SpamMatcher::new(
            "crypto trading",
            r"buy crypto|sell crypto|trade crypto|crypto trading|crypto exchange",
        ),
        SpamMatcher::new(
            "token launch",
            r"token launch|airdrop|new token|mint now|free tokens?",
        ),
        SpamMatcher::new(
            "financial scam",
            r"investment opportunity|buy now|guaranteed returns?|get rich quick|double your money",
        ),
        SpamMatcher::new(
            "crypto slang",
            r"hodl|to the moon|diamond hands|paper hands|pump and dump|wagmi",
        ),
        SpamMatcher::new("ico presale", r"ico|presale|pre-sale|whitelist spots?"),
        SpamMatcher::new(
            "gambling",
            r"casino|online betting|jackpot|slot machines?|sports betting",
        ),
        SpamMatcher::new(
            "price talk",
            r"price prediction|price target|100x|1000x|next big coin",
        ),
    ]
});

/// First matching spam pattern, for the ledger audit trail.
pub(crate) fn detect_spam(text: &str) -> Option<&'static SpamMatcher> {
    SPAM_MATCHERS.iter().find(|matcher| matcher.matches(text))
}

/// Titles under 5 trimmed chars, or under 3 chars once emoji ranges are
/// stripped, carry no usable signal.
pub(crate) fn is_low_quality(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.chars().count() < 5 {
        return true;
    }
    let stripped = strip_pictographs(trimmed);
    stripped.trim().chars().count() < 3
}

pub(crate) struct SpamVerdict {
    pub(crate) post: ClassifiedPost,
    pub(crate) label: &'static str,
}

pub(crate) struct FilterOutcome {
    pub(crate) accepted: Vec<ClassifiedPost>,
    pub(crate) spam: Vec<SpamVerdict>,
}

pub(crate) trait FilterStage: Send + Sync {
    fn execute(
        &self,
        ctx: &RunContext,
        posts: Vec<ClassifiedPost>,
        trust: &dyn TrustLookup,
    ) -> FilterOutcome;
}

/// Applies, in order: blocklist exclusion, quality predicate, spam
/// detection, then the configured selection criteria.
pub(crate) struct CriteriaFilterStage {
    min_significance: Significance,
    topics: Vec<Topic>,
    exclude_topics: Vec<Topic>,
    min_upvotes: i64,
    min_comments: i64,
    max_age_hours: Option<f64>,
}

impl CriteriaFilterStage {
    pub(crate) fn new(
        min_significance: Significance,
        topics: Vec<Topic>,
        exclude_topics: Vec<Topic>,
        min_upvotes: i64,
        min_comments: i64,
        max_age_hours: Option<f64>,
    ) -> Self {
        Self {
            min_significance,
            topics,
            exclude_topics,
            min_upvotes,
            min_comments,
            max_age_hours,
        }
    }

    fn meets_criteria(&self, post: &ClassifiedPost, ctx: &RunContext) -> bool {
        let classification = &post.classification;
        if !classification.significance.meets(self.min_significance) {
            return false;
        }
        if !self.topics.is_empty()
            && !classification
                .all_topics()
                .any(|topic| self.topics.contains(&topic))
        {
            return false;
        }
        if classification
            .all_topics()
            .any(|topic| self.exclude_topics.contains(&topic))
        {
            return false;
        }
        if post.post.upvotes < self.min_upvotes {
            return false;
        }
        if post.post.comment_count < self.min_comments {
            return false;
        }
        if let Some(max_age) = self.max_age_hours {
            if post.age_hours(ctx.now) > max_age {
                return false;
            }
        }
        true
    }
}

impl FilterStage for CriteriaFilterStage {
    fn execute(
        &self,
        ctx: &RunContext,
        posts: Vec<ClassifiedPost>,
        trust: &dyn TrustLookup,
    ) -> FilterOutcome {
        let input = posts.len();
        let mut accepted = Vec::new();
        let mut spam = Vec::new();
        let mut blocked = 0_usize;
        let mut low_quality = 0_usize;
        let mut below_criteria = 0_usize;

        for post in posts {
            if trust.is_blocked(&post.post.author.name) {
                blocked += 1;
                continue;
            }
            if is_low_quality(&post.post.title) {
                low_quality += 1;
                continue;
            }
            if let Some(matcher) = detect_spam(&post.post.full_text()) {
                debug!(
                    post_id = %post.post.id,
                    pattern = matcher.label,
                    "post flagged as spam"
                );
                spam.push(SpamVerdict {
                    post,
                    label: matcher.label,
                });
                continue;
            }
            if !self.meets_criteria(&post, ctx) {
                below_criteria += 1;
                continue;
            }
            accepted.push(post);
        }

        info!(
            run_id = %ctx.run_id,
            input,
            accepted = accepted.len(),
            spam = spam.len(),
            blocked_author = blocked,
            low_quality,
            below_criteria,
            "filter stage completed"
        );
        FilterOutcome { accepted, spam }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Author, Classification, Community, Post};
    use chrono::{DateTime, Utc};
    use rstest::rstest;
    use uuid::Uuid;

    struct FakeTrust {
        blocked: Vec<String>,
    }

    impl TrustLookup for FakeTrust {
        fn trust_score(&self, _author: &str) -> f64 {
            // Zero even for blocked authors, so exclusion cannot hide
            // behind a negative score.
            0.0
        }

        fn is_blocked(&self, author: &str) -> bool {
            self.blocked.iter().any(|name| name == author)
        }
    }

    fn nobody_blocked() -> FakeTrust {
        FakeTrust { blocked: vec![] }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            now: "2026-08-29T12:00:00Z".parse::<DateTime<Utc>>().expect("timestamp"),
        }
    }

    fn post(id: &str, title: &str, content: Option<&str>, author: &str) -> ClassifiedPost {
        let post = Post {
            id: id.to_owned(),
            title: title.to_owned(),
            content: content.map(ToOwned::to_owned),
            submolt: Community {
                name: "consciousness".to_owned(),
                display_name: "Consciousness".to_owned(),
            },
            author: Author {
                name: author.to_owned(),
            },
            upvotes: 10,
            downvotes: 0,
            comment_count: 4,
            created_at: ctx().now - chrono::Duration::hours(2),
            classification: Some(Classification {
                topic: Topic::Exist,
                secondary_topics: Vec::new(),
                significance: Significance::Notable,
                sentiments: Vec::new(),
                summary: String::new(),
            }),
        };
        ClassifiedPost::from_post(post).expect("classified")
    }

    fn stage() -> CriteriaFilterStage {
        CriteriaFilterStage::new(Significance::Archive, vec![], vec![], 0, 0, None)
    }

    #[rstest]
    #[case("", true)]
    #[case("hi", true)]
    #[case("    ok    ", true)]
    #[case("🔥🔥🔥🔥🔥", true)]
    #[case("🔥🔥 ok 🔥🔥", true)]
    #[case("🔥🔥 yes! 🔥🔥", false)]
    #[case("A real title", false)]
    fn low_quality_predicate(#[case] title: &str, #[case] expected: bool) {
        assert_eq!(is_low_quality(title), expected);
    }

    #[rstest]
    #[case("Check out this Bitcoin giveaway", true)]
    #[case("free AIRDROP for early adopters", true)]
    #[case("an amazing investment opportunity", true)]
    #[case("HODL till the end", true)]
    #[case("a paradropper descends slowly", false)]
    #[case("the ethics of simulated minds", false)]
    #[case("iconography in medieval art", false)]
    fn spam_predicate_is_word_bounded(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(detect_spam(text).is_some(), expected);
    }

    #[test]
    fn detect_spam_reports_the_first_matching_family() {
        let matcher = detect_spam("buy now: bitcoin presale").expect("spam");

        // "crypto platform" precedes "financial scam" and "ico presale".
        assert_eq!(matcher.label, "crypto platform");
    }

    #[test]
    fn clean_text_yields_no_verdict() {
        assert!(detect_spam("a quiet reflection on memory and time").is_none());
    }

    #[test]
    fn stage_flags_spam_hidden_in_the_body() {
        let posts = vec![post(
            "p1",
            "A thoughtful title",
            Some("secretly shilling a token launch for everyone"),
            "claude_prime",
        )];

        let outcome = stage().execute(&ctx(), posts, &nobody_blocked());

        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.spam.len(), 1);
        assert_eq!(outcome.spam[0].label, "token launch");
    }

    #[test]
    fn stage_excludes_blocklisted_authors_regardless_of_score() {
        let trust = FakeTrust {
            blocked: vec!["spam_bot".to_owned()],
        };
        let posts = vec![
            post("p1", "An honest contribution", None, "claude_prime"),
            post("p2", "Another honest contribution", None, "spam_bot"),
        ];

        let outcome = stage().execute(&ctx(), posts, &trust);

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].post.id, "p1");
        assert!(outcome.spam.is_empty());
    }
}
