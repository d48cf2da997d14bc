//! Query orchestration

mod cancel;
mod options;
#[allow(clippy::module_inception)]
mod runner;
mod state;

pub use cancel::RunCanceller;
pub use options::{RunOptions, DEFAULT_TIMEOUT};
pub use runner::{
    progress_channel, run_query, ProgressEvent, ProgressReceiver, ProgressSender, QueryRunner,
    RunError,
};
pub use state::{RunLifecycle, RunState};
