use ulid::Ulid;

use crate::catalog::CollaboratorError;
use crate::rules::Conflict;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The successor template declares no allowed container.
    NoSuccessorContainer {
        template_id: Ulid,
    },
    CycleDetected(Ulid),
    Collaborator(String),
    ConflictRejected {
        service_id: Ulid,
        conflicts: Vec<Conflict>,
    },
    /// The rule service failed after the write was committed.
    HookFailed {
        service_id: Ulid,
        reason: String,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NoSuccessorContainer { template_id } => {
                write!(f, "successor template {template_id} has no allowed container")
            }
            EngineError::CycleDetected(id) => write!(f, "cycle detected in chain at service: {id}"),
            EngineError::Collaborator(e) => write!(f, "collaborator error: {e}"),
            EngineError::ConflictRejected { service_id, conflicts } => {
                write!(
                    f,
                    "write to service {service_id} rejected: {} double assignment(s)",
                    conflicts.len()
                )
            }
            EngineError::HookFailed { service_id, reason } => {
                write!(f, "conflict check failed for service {service_id}: {reason}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CollaboratorError> for EngineError {
    fn from(e: CollaboratorError) -> Self {
        EngineError::Collaborator(e.0)
    }
}
