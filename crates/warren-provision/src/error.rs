/// Failure classes of the provisioning core. The HTTP layer maps these to
/// statuses; inside the library they keep allocation, layout, config, and
/// process-manager failures distinguishable.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid instance spec: {0}")]
    InvalidSpec(String),

    /// No persisted config exists for the slug. Distinct from a supervisor
    /// failure during a later restart.
    #[error("no instance config for slug: {0}")]
    NotFound(String),

    /// Directory or document creation failed. Fatal to provisioning; the
    /// instance may be left with a partial tree (no rollback).
    #[error("instance layout: {0}")]
    Layout(#[source] std::io::Error),

    /// Reading or persisting our own gateway config failed.
    #[error("gateway config: {0}")]
    Config(#[source] anyhow::Error),

    #[error(transparent)]
    Supervisor(#[from] warren_process::SupervisorError),
}

pub type Result<T> = std::result::Result<T, Error>;
