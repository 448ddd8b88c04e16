use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nd_core::{Error, Result, Trigger};
use nd_pipeline::Orchestrator;
use tracing::{error, info, warn};

/// Wake-up times for scheduled runs, from a cron expression
/// (`sec min hour day-of-month month day-of-week [year]`, UTC).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .map_err(|e| Error::Config(format!("Invalid schedule '{}': {}", expression, e)))?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Sleep until each scheduled time and start a scheduled run. Refusals are
/// logged and the loop waits for the next slot.
pub async fn run_schedule(schedule: CronSchedule, orchestrator: Arc<Orchestrator>) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(schedule = schedule.expression(), "Schedule has no upcoming runs, stopping");
            return;
        };
        info!("⏰ Next scheduled run at {}", next.to_rfc3339());
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        info!("⏰ Running scheduled news generation");
        match orchestrator.trigger(Trigger::Scheduled) {
            Ok(run) => match run.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Scheduled run failed"),
                Err(e) => error!(error = %e, "Scheduled run aborted"),
            },
            Err(e) => warn!(error = %e, "Scheduled run refused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_daily_six_am() {
        let schedule = CronSchedule::parse("0 0 6 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at("2025-03-07T05:59:00Z")),
            Some(at("2025-03-07T06:00:00Z"))
        );
        assert_eq!(
            schedule.next_after(at("2025-03-07T06:00:00Z")),
            Some(at("2025-03-08T06:00:00Z"))
        );
    }

    #[test]
    fn test_invalid_expression() {
        assert!(matches!(
            CronSchedule::parse("every morning"),
            Err(Error::Config(_))
        ));
    }
}
