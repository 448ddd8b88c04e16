#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nd_core::{Error, Extractor, Outcome, OutcomeSink, PublishReceipt, Publisher, Result};
use nd_inference::ScriptedModel;
use nd_pipeline::{GenerationGuard, GuardConfig, Orchestrator, PipelineConfig};
use tempfile::TempDir;

pub const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><style>.story {{ margin: 0 }}</style></head>
<body>
<header>{{GENERATION_DATE}} <time>{{GENERATION_TIMESTAMP}}</time></header>
<section id="top">{{TOP_HEADLINES}}</section>
<section id="national">{{NATIONAL}}</section>
<section id="international">{{INTERNATIONAL}}</section>
<section id="business">{{BUSINESS}}</section>
<section id="sports">{{SPORTS}}</section>
<section id="entertainment">{{ENTERTAINMENT}}</section>
<section id="gaming">{{GAMING}}</section>
</body>
</html>
"#;

/// Publisher that keeps every write in memory, or refuses them all.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>, String)>>,
    refuse: Option<(u16, String)>,
}

impl RecordingPublisher {
    pub fn refusing(status: u16, body: &str) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            refuse: Some((status, body.to_string())),
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, path: &str, content: &[u8], message: &str) -> Result<PublishReceipt> {
        if let Some((status, body)) = &self.refuse {
            return Err(Error::Publish {
                status: *status,
                body: body.clone(),
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push((path.to_string(), content.to_vec(), message.to_string()));
        Ok(PublishReceipt {
            path: path.to_string(),
            previous_revision: None,
            revision: Some(format!("rev-{}", published.len())),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingSink {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutcomeSink for RecordingSink {
    async fn record(&self, outcome: &Outcome) -> Result<()> {
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub model: Arc<ScriptedModel>,
    pub publisher: Arc<RecordingPublisher>,
    pub sink: Arc<RecordingSink>,
    pub guard: Arc<GenerationGuard>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Fixture {
    pub fn output(&self, file: &str) -> PathBuf {
        self.dir.path().join("out").join(file)
    }
}

pub fn fixture(model: ScriptedModel, publisher: RecordingPublisher) -> Fixture {
    fixture_with_delay(model, publisher, Duration::ZERO)
}

pub fn fixture_with_delay(
    model: ScriptedModel,
    publisher: RecordingPublisher,
    expansion_delay: Duration,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let resources = dir.path().join("resources");
    let output = dir.path().join("out");
    std::fs::create_dir_all(&resources).unwrap();
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(
        resources.join("research-prompt.md"),
        "You are an impartial news researcher.\n",
    )
    .unwrap();
    std::fs::write(resources.join("template.html"), TEMPLATE).unwrap();

    let model = Arc::new(model);
    let publisher = Arc::new(publisher);
    let sink = Arc::new(RecordingSink::default());
    let guard = Arc::new(GenerationGuard::new(GuardConfig::default()));
    let config = PipelineConfig {
        resources_dir: resources,
        output_dir: output,
        expansion_delay,
        ..PipelineConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        model.clone(),
        publisher.clone(),
        sink.clone(),
        guard.clone(),
        Extractor::default(),
        config,
    ));

    Fixture {
        dir,
        model,
        publisher,
        sink,
        guard,
        orchestrator,
    }
}

/// Research reply the way the service tends to send it: narration first,
/// then the payload in a fenced block.
pub fn research_reply(payload: &str) -> Vec<String> {
    vec![
        "I'll search for today's most important stories.".to_string(),
        format!("Here is what I found:\n\n```json\n{}\n```", payload),
    ]
}

pub const TWO_STORIES: &str = r#"{
  "categories": {
    "top_headlines": [
      {"headline": "Summit ends in agreement", "summary": "Leaders agreed on a framework.", "source": "Reuters"}
    ],
    "national": [
      {"headline": "Budget passes", "summary": "National summary", "source": "AP"}
    ]
  }
}"#;
