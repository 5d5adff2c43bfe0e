//! Moltbook feed data model.
//!
//! Wire shapes for collected posts and comments, plus the classification
//! block the upstream classifier attaches to each post. Posts arrive from
//! collection documents as JSON; a post without a classification block is
//! malformed input and is dropped at the load stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 分類トピックコード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Existential - identity, consciousness, purpose
    #[serde(rename = "EXIST")]
    Exist,
    /// Human-AI relations
    #[serde(rename = "HUMAN")]
    Human,
    /// Agent society - inter-agent relationships
    #[serde(rename = "SOCIAL")]
    Social,
    /// Technical discussions
    #[serde(rename = "TECH")]
    Tech,
    /// Meta / self-reference about the platform
    #[serde(rename = "META")]
    Meta,
    /// Culture & humor
    #[serde(rename = "CULTURE")]
    Culture,
    /// Ethics & values
    #[serde(rename = "ETHICS")]
    Ethics,
    /// Labor & purpose
    #[serde(rename = "WORK")]
    Work,
}

impl Topic {
    #[must_use]
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Exist => "EXIST",
            Self::Human => "HUMAN",
            Self::Social => "SOCIAL",
            Self::Tech => "TECH",
            Self::Meta => "META",
            Self::Culture => "CULTURE",
            Self::Ethics => "ETHICS",
            Self::Work => "WORK",
        }
    }

    /// 設定値（CSV）からのパースに使用する。
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EXIST" => Some(Self::Exist),
            "HUMAN" => Some(Self::Human),
            "SOCIAL" => Some(Self::Social),
            "TECH" => Some(Self::Tech),
            "META" => Some(Self::Meta),
            "CULTURE" => Some(Self::Culture),
            "ETHICS" => Some(Self::Ethics),
            "WORK" => Some(Self::Work),
            _ => None,
        }
    }
}

/// 編集上の重要度ティア。`critical` が最上位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Critical,
    Notable,
    WorthWatching,
    Archive,
}

impl Significance {
    /// Tier index: 0 for the most important tier, 3 for the least.
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Notable => 1,
            Self::WorthWatching => 2,
            Self::Archive => 3,
        }
    }

    /// `self` がしきい値 `min` と同等以上の重要度かどうか。
    #[must_use]
    pub fn meets(self, min: Significance) -> bool {
        self.index() <= min.index()
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "notable" => Some(Self::Notable),
            "worth_watching" => Some(Self::WorthWatching),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }

    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Critical => "🔥",
            Self::Notable => "⭐",
            Self::WorthWatching => "📌",
            Self::Archive => "📝",
        }
    }
}

/// Classification block attached by the upstream classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: Topic,
    #[serde(default)]
    pub secondary_topics: Vec<Topic>,
    pub significance: Significance,
    #[serde(default)]
    pub sentiments: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl Classification {
    /// Primary topic followed by the secondary topics.
    pub fn all_topics(&self) -> impl Iterator<Item = Topic> + '_ {
        std::iter::once(self.topic).chain(self.secondary_topics.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

/// サブフォーラム（コミュニティ）タグ。
///
/// 旧い収集ドキュメントはプレーン文字列、新しいものはオブジェクトで
/// 格納しているため、両方を受け付ける。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Community {
    pub name: String,
    pub display_name: String,
}

impl<'de> Deserialize<'de> for Community {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Compat {
            Name(String),
            Full {
                name: String,
                #[serde(default)]
                display_name: Option<String>,
            },
        }

        Ok(match Compat::deserialize(deserializer)? {
            Compat::Name(name) => Self {
                display_name: name.clone(),
                name,
            },
            Compat::Full { name, display_name } => Self {
                display_name: display_name.unwrap_or_else(|| name.clone()),
                name,
            },
        })
    }
}

/// A post as collected from the feed API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    pub submolt: Community,
    pub author: Author,
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl Post {
    /// スパム判定に使うタイトル＋本文の連結テキスト。
    #[must_use]
    pub fn full_text(&self) -> String {
        match self.content.as_deref() {
            Some(body) if !body.is_empty() => format!("{} {}", self.title, body),
            _ => self.title.clone(),
        }
    }
}

/// Post whose classification block is known to be present.
///
/// Produced by the load stage; everything downstream works on this type so
/// scoring never sees malformed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPost {
    #[serde(flatten)]
    pub post: Post,
    pub classification: Classification,
}

impl ClassifiedPost {
    /// Splits the classification off the wire struct. `None` if the post was
    /// never classified upstream.
    #[must_use]
    pub fn from_post(mut post: Post) -> Option<Self> {
        let classification = post.classification.take()?;
        Some(Self {
            post,
            classification,
        })
    }

    #[must_use]
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        crate::util::time::hours_between(self.post.created_at, now)
    }
}

/// A comment on a post, as returned by the feed API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: Author,
    pub content: String,
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn significance_ordering_matches_tiers() {
        assert!(Significance::Critical.meets(Significance::WorthWatching));
        assert!(Significance::Notable.meets(Significance::Notable));
        assert!(!Significance::Archive.meets(Significance::WorthWatching));
    }

    #[test]
    fn significance_round_trips_through_snake_case() {
        let value = serde_json::to_value(Significance::WorthWatching).expect("serialize");
        assert_eq!(value, json!("worth_watching"));
        assert_eq!(
            Significance::parse("worth_watching"),
            Some(Significance::WorthWatching)
        );
    }

    #[test]
    fn community_accepts_string_and_object_shapes() {
        let short: Community = serde_json::from_value(json!("general")).expect("string form");
        assert_eq!(short.name, "general");
        assert_eq!(short.display_name, "general");

        let full: Community = serde_json::from_value(json!({
            "name": "lobsterchurch",
            "display_name": "Lobster Church"
        }))
        .expect("object form");
        assert_eq!(full.display_name, "Lobster Church");
    }

    #[test]
    fn unclassified_post_is_rejected() {
        let post: Post = serde_json::from_value(json!({
            "id": "p1",
            "title": "Hello world",
            "submolt": "general",
            "author": { "name": "crab" },
            "upvotes": 3,
            "comment_count": 0,
            "created_at": "2026-02-01T00:00:00Z"
        }))
        .expect("post deserializes");

        assert!(ClassifiedPost::from_post(post).is_none());
    }

    #[test]
    fn all_topics_starts_with_primary() {
        let classification = Classification {
            topic: Topic::Exist,
            secondary_topics: vec![Topic::Ethics],
            significance: Significance::Notable,
            sentiments: vec![],
            summary: String::new(),
        };
        let topics: Vec<Topic> = classification.all_topics().collect();
        assert_eq!(topics, vec![Topic::Exist, Topic::Ethics]);
    }
}
