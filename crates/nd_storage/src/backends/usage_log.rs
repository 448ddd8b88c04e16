use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nd_core::{Outcome, OutcomeSink, Result, RunMode};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

pub const TEXT_LOG_FILE: &str = "usage-log.txt";
pub const JSON_LOG_FILE: &str = "usage-log.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub total_cost: f64,
    pub success_count: usize,
    pub fail_count: usize,
    pub quick_count: usize,
    pub full_count: usize,
}

/// Append-only record of generation outcomes: one readable line per run in
/// `usage-log.txt` and one JSON object per line in `usage-log.json`.
#[derive(Debug, Clone)]
pub struct UsageLog {
    text_path: PathBuf,
    json_path: PathBuf,
}

impl UsageLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            text_path: dir.join(TEXT_LOG_FILE),
            json_path: dir.join(JSON_LOG_FILE),
        }
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn format_line(outcome: &Outcome) -> String {
        let mut line = format!(
            "[{}] {} mode - {} - Est. cost: ${:.2}",
            outcome.timestamp.to_rfc3339(),
            outcome.mode,
            if outcome.success { "SUCCESS" } else { "FAILED" },
            outcome.estimated_cost
        );
        if let Some(error) = &outcome.error {
            line.push_str(&format!(" - Error: {}", error));
        }
        line.push_str(&format!(
            " (trigger: {}, {} ms)\n",
            outcome.trigger, outcome.duration_ms
        ));
        line
    }

    async fn append(path: &Path, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn summary(&self, days: i64) -> Result<CostSummary> {
        self.summary_at(days, Utc::now()).await
    }

    /// Totals over outcomes recorded in the last `days` days. Unreadable
    /// lines are skipped; a missing log yields an empty summary. A window
    /// reaching past the representable range covers every entry.
    pub async fn summary_at(&self, days: i64, now: DateTime<Utc>) -> Result<CostSummary> {
        let raw = match tokio::fs::read_to_string(&self.json_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CostSummary::default())
            }
            Err(e) => return Err(e.into()),
        };

        let cutoff = Duration::try_days(days).and_then(|window| now.checked_sub_signed(window));
        let mut summary = CostSummary::default();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let outcome: Outcome = match serde_json::from_str(line) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable usage log line");
                    continue;
                }
            };
            if cutoff.is_some_and(|cutoff| outcome.timestamp < cutoff) {
                continue;
            }
            summary.total_cost += outcome.estimated_cost;
            if outcome.success {
                summary.success_count += 1;
            } else {
                summary.fail_count += 1;
            }
            match outcome.mode {
                RunMode::Quick => summary.quick_count += 1,
                RunMode::Full => summary.full_count += 1,
            }
        }
        Ok(summary)
    }
}

#[async_trait]
impl OutcomeSink for UsageLog {
    /// Both files are attempted; the first failure is returned after logging.
    async fn record(&self, outcome: &Outcome) -> Result<()> {
        let line = Self::format_line(outcome);
        let text_result = Self::append(&self.text_path, &line).await;
        match &text_result {
            Ok(()) => info!("📊 Usage logged: {}", line.trim_end()),
            Err(e) => error!(error = %e, "Failed to write to usage log"),
        }

        let json_line = format!("{}\n", serde_json::to_string(outcome)?);
        let json_result = Self::append(&self.json_path, &json_line).await;
        if let Err(e) = &json_result {
            error!(error = %e, "Failed to write to JSON usage log");
        }

        text_result.and(json_result)
    }
}
