use std::path::Path;

use chrono::NaiveDate;
use nd_core::{Category, PromptMessage, Result, RunMode, Story, Turn};
use tracing::debug;

pub const RESEARCH_PROMPT_FILE: &str = "research-prompt.md";
pub const TEMPLATE_FILE: &str = "template.html";

/// Top-level key that identifies the research payload in a reply.
pub const RESEARCH_MARKER: &str = "\"categories\"";
pub const EXPANSION_MARKER: &str = "\"expanded_summary\"";
pub const ANSWER_MARKER: &str = "\"answer\"";

/// Prompt and page template, re-read at the start of every run so they can be
/// edited without a restart.
#[derive(Debug, Clone)]
pub struct Resources {
    pub research_prompt: String,
    pub template: String,
}

impl Resources {
    pub async fn load(dir: &Path) -> Result<Self> {
        let research_prompt = tokio::fs::read_to_string(dir.join(RESEARCH_PROMPT_FILE)).await?;
        let template = tokio::fs::read_to_string(dir.join(TEMPLATE_FILE)).await?;
        debug!(dir = %dir.display(), "Loaded prompt and template");
        Ok(Self {
            research_prompt,
            template,
        })
    }
}

fn stories_per_category(mode: RunMode) -> usize {
    match mode {
        RunMode::Quick => 3,
        RunMode::Full => 5,
    }
}

pub fn research_prompt(base: &str, mode: RunMode, today: NaiveDate) -> String {
    let keys = Category::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.key()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{base}\n\n\
         Today is {today}. Gather up to {count} stories for each of these categories: {keys}.\n\
         Respond with a single JSON object of the form \
         {{\"categories\": {{\"<category>\": [{{\"headline\": \"...\", \"summary\": \"...\", \"source\": \"...\"}}]}}}} \
         and nothing after it.",
        base = base.trim_end(),
        today = today.format("%Y-%m-%d"),
        count = stories_per_category(mode),
        keys = keys,
    )
}

pub fn expansion_prompt(category: Category, story: &Story) -> String {
    format!(
        "Research this {category} story in more depth.\n\n\
         Headline: {headline}\nSummary: {summary}\nSource: {source}\n\n\
         Respond with a single JSON object: \
         {{\"expanded_summary\": \"three to four neutral paragraphs\", \
         \"additional_sources\": [\"...\"], \"related_topics\": [\"...\"]}}",
        category = category,
        headline = story.headline,
        summary = story.summary,
        source = story.attribution,
    )
}

/// Conversation so far, one user/assistant pair per completed turn, then the
/// new question.
pub fn query_messages(history: &[Turn], query: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    for turn in history {
        messages.push(PromptMessage::user(turn.query.clone()));
        messages.push(PromptMessage::assistant(turn.answer.answer.clone()));
    }
    messages.push(PromptMessage::user(format!(
        "{}\n\nSearch the web as needed and answer neutrally. Respond with a single JSON object: \
         {{\"answer\": \"...\", \"sources\": [\"...\"], \"related_topics\": [\"...\"]}}",
        query.trim()
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::{PromptRole, QueryAnswer};

    #[test]
    fn test_research_prompt_profiles() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let quick = research_prompt("Be impartial.\n", RunMode::Quick, today);
        let full = research_prompt("Be impartial.\n", RunMode::Full, today);
        assert!(quick.starts_with("Be impartial.\n\nToday is 2025-03-07."));
        assert!(quick.contains("up to 3 stories"));
        assert!(full.contains("up to 5 stories"));
        assert!(full.contains("\"top_headlines\", \"national\""));
        assert!(full.contains(RESEARCH_MARKER));
    }

    #[test]
    fn test_query_messages_replays_history() {
        let history = vec![Turn {
            query: "What happened?".to_string(),
            answer: QueryAnswer {
                answer: "A thing.".to_string(),
                sources: vec![],
                related_topics: vec![],
            },
        }];
        let messages = query_messages(&history, "  And then?  ");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], PromptMessage::user("What happened?"));
        assert_eq!(messages[1], PromptMessage::assistant("A thing."));
        assert_eq!(messages[2].role, PromptRole::User);
        assert!(messages[2].content.starts_with("And then?\n"));
    }

    #[tokio::test]
    async fn test_load_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RESEARCH_PROMPT_FILE), "prompt").unwrap();
        std::fs::write(dir.path().join(TEMPLATE_FILE), "<html></html>").unwrap();
        let resources = Resources::load(dir.path()).await.unwrap();
        assert_eq!(resources.research_prompt, "prompt");

        std::fs::remove_file(dir.path().join(TEMPLATE_FILE)).unwrap();
        assert!(Resources::load(dir.path()).await.is_err());
    }
}
