pub mod emitter;
pub mod failure_log;

pub use emitter::{ArtifactWriter, JsonArtifactWriter, ReportEmitter, RunVerdict, evaluate_thresholds};
pub use failure_log::FailureLogger;
