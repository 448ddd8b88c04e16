use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of digest sections, in page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    TopHeadlines,
    National,
    International,
    Business,
    Sports,
    Entertainment,
    Gaming,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::TopHeadlines,
        Category::National,
        Category::International,
        Category::Business,
        Category::Sports,
        Category::Entertainment,
        Category::Gaming,
    ];

    /// The section that leads the page.
    pub const LEAD: Category = Category::TopHeadlines;

    /// Key used in the research payload.
    pub fn key(&self) -> &'static str {
        match self {
            Category::TopHeadlines => "top_headlines",
            Category::National => "national",
            Category::International => "international",
            Category::Business => "business",
            Category::Sports => "sports",
            Category::Entertainment => "entertainment",
            Category::Gaming => "gaming",
        }
    }

    /// Template slot that receives this category's rendered stories.
    pub fn slot(&self) -> &'static str {
        match self {
            Category::TopHeadlines => "TOP_HEADLINES",
            Category::National => "NATIONAL",
            Category::International => "INTERNATIONAL",
            Category::Business => "BUSINESS",
            Category::Sports => "SPORTS",
            Category::Entertainment => "ENTERTAINMENT",
            Category::Gaming => "GAMING",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub headline: String,
    pub summary: String,
    #[serde(alias = "source")]
    pub attribution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<Expansion>,
}

impl Story {
    /// Expansion used when the per-story call fails: the original text, nothing more.
    pub fn degraded_expansion(&self) -> Expansion {
        Expansion {
            expanded_summary: self.summary.clone(),
            additional_sources: vec![self.attribution.clone()],
            related_topics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub expanded_summary: String,
    #[serde(default, alias = "sources")]
    pub additional_sources: Vec<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

/// Research payload: stories grouped by category key.
///
/// Keys outside [`Category::ALL`] are kept so the debug dump stays faithful,
/// but only the known categories are rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryCategorySet {
    pub categories: BTreeMap<String, Vec<Story>>,
}

impl StoryCategorySet {
    /// Stories for a category; a missing category is an empty slice.
    pub fn stories(&self, category: Category) -> &[Story] {
        self.categories
            .get(category.key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert(&mut self, category: Category, stories: Vec<Story>) {
        self.categories.insert(category.key().to_string(), stories);
    }

    /// Known-category stories in page order, mutable for the expansion phase.
    pub fn stories_mut(&mut self) -> impl Iterator<Item = (Category, &mut Story)> + '_ {
        let mut out = Vec::new();
        for (key, stories) in self.categories.iter_mut() {
            if let Some(category) = Category::ALL.iter().find(|c| c.key() == key.as_str()) {
                for story in stories.iter_mut() {
                    out.push((*category, story));
                }
            }
        }
        out.sort_by_key(|(category, _)| *category);
        out.into_iter()
    }

    pub fn story_count(&self) -> usize {
        Category::ALL.iter().map(|c| self.stories(*c).len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Quick,
    Full,
}

impl RunMode {
    /// Estimated spend per run in USD.
    pub fn estimated_cost(&self) -> f64 {
        match self {
            RunMode::Quick => 0.30,
            RunMode::Full => 0.80,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Quick => f.write_str("QUICK"),
            RunMode::Full => f.write_str("FULL"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(RunMode::Quick),
            "full" => Ok(RunMode::Full),
            other => Err(format!("Unknown run mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Trigger {
    /// Manual runs are cheap previews; scheduled runs are the full daily edition.
    pub fn mode(&self) -> RunMode {
        match self {
            Trigger::Manual => RunMode::Quick,
            Trigger::Scheduled => RunMode::Full,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => f.write_str("manual"),
            Trigger::Scheduled => f.write_str("scheduled"),
        }
    }
}

/// One terminal transition of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub trigger: Trigger,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Processing,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub answer: QueryAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub query: String,
    pub result: Option<QueryAnswer>,
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub status: ConversationStatus,
    pub caller: String,
    pub error: Option<String>,
}

/// Convert a configured interval for arithmetic on timestamps.
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}
