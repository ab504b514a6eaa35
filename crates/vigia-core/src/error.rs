use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Faults in the engine's data dependencies.
///
/// A decision cannot be trusted without its inputs, so these surface to the
/// caller as a service error instead of an access outcome. Expected
/// conditions (no face, unknown subject, missing grant) are outcomes, never
/// errors.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("face capability failed: {0}")]
    Capability(#[source] BoxError),
    #[error("store query failed: {0}")]
    Store(#[source] BoxError),
    #[error("audit write failed: {0}")]
    Audit(#[source] BoxError),
}
