pub mod guard;
pub mod manager;
pub mod prompts;
pub mod query;
pub mod rate_limit;
pub mod render;

pub use guard::{GenerationGuard, GuardConfig, GuardStatus, Phase, RunPermit};
pub use manager::{Orchestrator, PipelineConfig, RunReport, DEBUG_DUMP_FILE, PAGE_FILE};
pub use prompts::Resources;
pub use query::{QueryService, Submission, MAX_QUERY_LEN};
pub use rate_limit::{check_rate_limit, QueryRateLimiter, QuotaConfig};
pub use render::render_page;

pub mod prelude {
    pub use super::guard::{GenerationGuard, GuardConfig, Phase};
    pub use super::manager::{Orchestrator, PipelineConfig};
    pub use super::query::QueryService;
    pub use super::rate_limit::{QueryRateLimiter, QuotaConfig};
    pub use nd_core::{Error, Result, RunMode, Trigger};
}
