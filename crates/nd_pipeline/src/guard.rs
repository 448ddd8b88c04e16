use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nd_core::{to_chrono, Error, Result, Trigger};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Minimum time between two admitted manual runs.
    pub manual_interval: Duration,
    /// Minimum time between two admitted scheduled runs.
    pub scheduled_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            manual_interval: Duration::from_secs(5 * 60),
            scheduled_interval: Duration::from_secs(20 * 60 * 60),
        }
    }
}

/// Where the single generation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Researching,
    Expanding,
    Rendering,
    Publishing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardStatus {
    pub in_progress: bool,
    pub phase: Phase,
    pub current_trigger: Option<Trigger>,
    pub last_manual: Option<DateTime<Utc>>,
    pub last_scheduled: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct GuardState {
    phase: Phase,
    current_trigger: Option<Trigger>,
    last_manual: Option<DateTime<Utc>>,
    last_scheduled: Option<DateTime<Utc>>,
}

/// Single-flight and cooldown gate for the generation pipeline.
///
/// Admission hands out a [`RunPermit`]; the run stays "in progress" until the
/// permit is dropped, whichever way the run ends.
#[derive(Debug)]
pub struct GenerationGuard {
    state: Mutex<GuardState>,
    config: GuardConfig,
}

impl GenerationGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            state: Mutex::new(GuardState {
                phase: Phase::Idle,
                current_trigger: None,
                last_manual: None,
                last_scheduled: None,
            }),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn interval(&self, trigger: Trigger) -> Duration {
        match trigger {
            Trigger::Manual => self.config.manual_interval,
            Trigger::Scheduled => self.config.scheduled_interval,
        }
    }

    pub fn try_begin(self: &Arc<Self>, trigger: Trigger) -> Result<RunPermit> {
        self.try_begin_at(trigger, Utc::now())
    }

    /// Admit a run, or refuse it with [`Error::Busy`] while another run is in
    /// progress, or [`Error::RateLimited`] inside the trigger's cooldown.
    /// Refusals leave the state untouched.
    pub fn try_begin_at(self: &Arc<Self>, trigger: Trigger, now: DateTime<Utc>) -> Result<RunPermit> {
        let mut state = self.lock();
        if state.phase != Phase::Idle {
            debug!(%trigger, phase = ?state.phase, "Refusing run: already in progress");
            return Err(Error::Busy);
        }

        let last = match trigger {
            Trigger::Manual => state.last_manual,
            Trigger::Scheduled => state.last_scheduled,
        };
        if let Some(last) = last {
            let interval = to_chrono(self.interval(trigger));
            let elapsed = now - last;
            if elapsed < interval {
                let remaining = (interval - elapsed).num_milliseconds().max(0) as u64;
                let retry_after_secs = remaining.div_ceil(1000).max(1);
                debug!(%trigger, retry_after_secs, "Refusing run: cooldown");
                return Err(Error::RateLimited { retry_after_secs });
            }
        }

        match trigger {
            Trigger::Manual => state.last_manual = Some(now),
            Trigger::Scheduled => state.last_scheduled = Some(now),
        }
        state.phase = Phase::Researching;
        state.current_trigger = Some(trigger);
        info!("🚦 {} run admitted", trigger);

        Ok(RunPermit {
            guard: Arc::clone(self),
            trigger,
            started_at: now,
        })
    }

    pub fn status(&self) -> GuardStatus {
        let state = self.lock();
        GuardStatus {
            in_progress: state.phase != Phase::Idle,
            phase: state.phase,
            current_trigger: state.current_trigger,
            last_manual: state.last_manual,
            last_scheduled: state.last_scheduled,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.lock().phase != Phase::Idle
    }
}

/// Proof of admission. Dropping it returns the guard to idle.
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<GenerationGuard>,
    trigger: Trigger,
    started_at: DateTime<Utc>,
}

impl RunPermit {
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn set_phase(&self, phase: Phase) {
        debug!(trigger = %self.trigger, ?phase, "Run phase");
        self.guard.lock().phase = phase;
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        let mut state = self.guard.lock();
        state.phase = Phase::Idle;
        state.current_trigger = None;
    }
}
