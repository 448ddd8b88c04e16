pub mod backends;
pub mod sweep;

pub use backends::*;
pub use sweep::{spawn_periodic, SweepHandle};

pub mod prelude {
    pub use super::backends::*;
    pub use nd_core::{OutcomeSink, PublishReceipt, Publisher};
}
