use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a periodic background sweep. Dropping it leaves the task running;
/// call [`SweepHandle::shutdown`] to stop it.
#[derive(Debug)]
pub struct SweepHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    pub fn shutdown(self) {
        debug!(sweep = self.name, "Stopping sweep");
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run `sweep` every `period`, starting one period from now.
///
/// `sweep` returns how many entries it removed.
pub fn spawn_periodic<F>(name: &'static str, period: Duration, sweep: F) -> SweepHandle
where
    F: Fn() -> usize + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = sweep();
            if removed > 0 {
                debug!(sweep = name, removed, "🧹 Swept expired entries");
            }
        }
    });
    SweepHandle { name, handle }
}
