//! Static analysis for multicore real-time task applications.
//!
//! Given a resolved [`App`](app::App), [`analyze`] derives resource
//! ownership and priority ceilings, resource placement, the cross-core
//! channel topology with free queue sizes, per-core timer queues and the
//! startup barriers between cores. The result is one immutable
//! [`Analysis`](analysis::Analysis) or every diagnostic found, together.

pub mod analysis;
pub mod app;
pub mod barrier;
pub mod ceiling;
pub mod channel;
pub mod config;
pub mod dsl;
pub mod error;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod location;
pub mod ownership;
pub mod timer_queue;

pub use analysis::Analysis;
pub use app::{App, Core, Priority};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, ConsistencyError, Diagnostic};

/// Analyze `app` with the default configuration.
pub fn analyze(app: &App) -> Result<Analysis, AnalysisError> {
    Analysis::compile(app)
}

/// Analyze `app` with `config`.
pub fn analyze_with(app: &App, config: &AnalysisConfig) -> Result<Analysis, AnalysisError> {
    Analysis::compile_with(app, config)
}
