use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, SecondsFormat, Utc};
use nd_core::{
    Category, Error, Expansion, Extractor, GenerationRequest, Outcome, OutcomeSink,
    PublishReceipt, Publisher, Result, RunMode, Story, StoryCategorySet, TextGenerator, Trigger,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::guard::{GenerationGuard, Phase, RunPermit};
use crate::prompts::{self, Resources, EXPANSION_MARKER, RESEARCH_MARKER};
use crate::render::render_page;

pub const PAGE_FILE: &str = "index.html";
pub const DEBUG_DUMP_FILE: &str = "news-data.json";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the research prompt and page template.
    pub resources_dir: PathBuf,
    /// Directory receiving the rendered page and the research dump.
    pub output_dir: PathBuf,
    /// Path of the page in the remote store.
    pub publish_path: String,
    /// Pause between two per-story expansion calls.
    pub expansion_delay: Duration,
    pub research_max_tokens: u32,
    pub expansion_max_tokens: u32,
    pub query_max_tokens: u32,
    pub quick_searches: u32,
    pub full_searches: u32,
    pub expansion_searches: u32,
    pub query_searches: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("./resources"),
            output_dir: PathBuf::from("."),
            publish_path: PAGE_FILE.to_string(),
            expansion_delay: Duration::from_secs(2),
            research_max_tokens: 16000,
            expansion_max_tokens: 2048,
            query_max_tokens: 4096,
            quick_searches: 5,
            full_searches: 15,
            expansion_searches: 3,
            query_searches: 5,
        }
    }
}

impl PipelineConfig {
    fn research_searches(&self, mode: RunMode) -> u32 {
        match mode {
            RunMode::Quick => self.quick_searches,
            RunMode::Full => self.full_searches,
        }
    }
}

/// Summary of a run that made it all the way through publishing.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trigger: Trigger,
    pub mode: RunMode,
    pub story_count: usize,
    pub degraded_expansions: usize,
    pub page_path: PathBuf,
    pub receipt: PublishReceipt,
}

/// Drives one generation run from research to publish.
///
/// Admission goes through the shared [`GenerationGuard`]; the permit it hands
/// out is held for the whole run, so the guard is released however the run
/// ends, panics included.
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    publisher: Arc<dyn Publisher>,
    outcomes: Arc<dyn OutcomeSink>,
    guard: Arc<GenerationGuard>,
    extractor: Extractor,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        publisher: Arc<dyn Publisher>,
        outcomes: Arc<dyn OutcomeSink>,
        guard: Arc<GenerationGuard>,
        extractor: Extractor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            publisher,
            outcomes,
            guard,
            extractor,
            config,
        }
    }

    pub fn guard(&self) -> &Arc<GenerationGuard> {
        &self.guard
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn admit(&self, trigger: Trigger) -> Result<RunPermit> {
        self.guard.try_begin(trigger)
    }

    /// Admit a run and start it in the background.
    ///
    /// Refusals come back synchronously and are not recorded as runs.
    pub fn trigger(self: &Arc<Self>, trigger: Trigger) -> Result<JoinHandle<Result<RunReport>>> {
        let permit = self.admit(trigger)?;
        let orchestrator = Arc::clone(self);
        Ok(tokio::spawn(async move { orchestrator.run(permit).await }))
    }

    /// Run in the mode that belongs to the permit's trigger.
    pub async fn run(&self, permit: RunPermit) -> Result<RunReport> {
        let mode = permit.trigger().mode();
        self.run_as(permit, mode).await
    }

    pub async fn run_as(&self, permit: RunPermit, mode: RunMode) -> Result<RunReport> {
        let trigger = permit.trigger();
        let started = Instant::now();
        info!("🚀 Starting {} generation ({} mode)", trigger, mode);

        let result = self.execute(&permit, trigger, mode).await;

        match &result {
            Ok(report) => info!(
                "✅ Generation complete: {} stories, {} degraded expansions",
                report.story_count, report.degraded_expansions
            ),
            Err(e) => {
                permit.set_phase(Phase::Failed);
                error!(%trigger, %mode, error = %e, "❌ Generation failed");
            }
        }

        let outcome = Outcome {
            timestamp: Utc::now(),
            mode,
            trigger,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            duration_ms: started.elapsed().as_millis() as u64,
            estimated_cost: mode.estimated_cost(),
        };
        if let Err(e) = self.outcomes.record(&outcome).await {
            warn!(error = %e, "Failed to record run outcome");
        }

        drop(permit);
        result
    }

    async fn execute(&self, permit: &RunPermit, trigger: Trigger, mode: RunMode) -> Result<RunReport> {
        let resources = Resources::load(&self.config.resources_dir).await?;

        let mut stories = self
            .research(&resources, mode, permit.started_at().date_naive())
            .await?;
        self.write_debug_dump(&stories).await;

        let mut degraded_expansions = 0;
        if mode == RunMode::Full {
            permit.set_phase(Phase::Expanding);
            degraded_expansions = self.expand(&mut stories).await;
        }

        permit.set_phase(Phase::Rendering);
        let generated_at = Utc::now();
        let page = render_page(
            &resources.template,
            &stories,
            generated_at.date_naive(),
            generated_at,
        )?;
        let page = self.extractor.repair().repair(&page);

        let page_path = self.config.output_dir.join(PAGE_FILE);
        tokio::fs::write(&page_path, &page).await?;
        info!("📝 Wrote {} ({} bytes)", page_path.display(), page.len());

        permit.set_phase(Phase::Publishing);
        let message = format!(
            "Update news - {}",
            generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let receipt = self
            .publisher
            .publish(&self.config.publish_path, page.as_bytes(), &message)
            .await?;

        Ok(RunReport {
            trigger,
            mode,
            story_count: stories.story_count(),
            degraded_expansions,
            page_path,
            receipt,
        })
    }

    async fn research(
        &self,
        resources: &Resources,
        mode: RunMode,
        today: NaiveDate,
    ) -> Result<StoryCategorySet> {
        info!("🔎 Researching news ({} mode)", mode);
        let request = GenerationRequest::new(prompts::research_prompt(
            &resources.research_prompt,
            mode,
            today,
        ))
        .max_tokens(self.config.research_max_tokens)
        .web_search(self.config.research_searches(mode));

        let segments = self.generator.generate(&request).await?;
        debug!(segments = segments.len(), "Research reply received");
        let stories: StoryCategorySet = self.extractor.json(&segments, RESEARCH_MARKER)?;
        info!("📰 Research complete: {} stories", stories.story_count());
        Ok(stories)
    }

    /// Expand every story in page order. Failures degrade that story only.
    async fn expand(&self, stories: &mut StoryCategorySet) -> usize {
        let total = stories.story_count();
        let mut degraded = 0;
        for (i, (category, story)) in stories.stories_mut().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.expansion_delay).await;
            }
            info!("🔬 Expanding story {}/{}: {}", i + 1, total, story.headline);
            match self.expand_story(category, story).await {
                Ok(expansion) => story.expansion = Some(expansion),
                Err(e) => {
                    warn!(headline = %story.headline, error = %e, "Expansion failed, keeping original summary");
                    story.expansion = Some(story.degraded_expansion());
                    degraded += 1;
                }
            }
        }
        degraded
    }

    async fn expand_story(&self, category: Category, story: &Story) -> Result<Expansion> {
        let request = GenerationRequest::new(prompts::expansion_prompt(category, story))
            .max_tokens(self.config.expansion_max_tokens)
            .web_search(self.config.expansion_searches);
        let segments = self.generator.generate(&request).await?;
        self.extractor.json(&segments, EXPANSION_MARKER)
    }

    async fn write_debug_dump(&self, stories: &StoryCategorySet) {
        let path = self.config.output_dir.join(DEBUG_DUMP_FILE);
        let result = match serde_json::to_string_pretty(stories) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(Error::from),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => debug!(path = %path.display(), "Research data saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save research data"),
        }
    }
}
