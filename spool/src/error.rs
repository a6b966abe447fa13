use std::path::PathBuf;

use snafu::Snafu;
use spool_core::PipelineError;
use spool_observability::ObservabilityError;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("Failed to open {}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Object store error"))]
    ObjectStore { source: object_store::Error },
    #[snafu(display("Failed to initialize observability"))]
    Observability { source: ObservabilityError },
    #[snafu(display("Pipeline failed"))]
    Pipeline { source: PipelineError },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
