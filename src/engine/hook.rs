use ulid::Ulid;

use crate::model::*;
use crate::rules::ConflictPolicy;

use super::{Engine, EngineError};

impl Engine {
    /// Post-commit double-booking check for one written service.
    ///
    /// `undo` is the compensating transaction that restores the state before
    /// the write; it is only committed under [`ConflictPolicy::Reject`].
    pub(super) async fn after_write(&self, service_id: Ulid, undo: Vec<Event>) -> Result<(), EngineError> {
        let outcome = self.rules.double_assign(ResourceScope::All, service_id).await;
        match outcome {
            Ok(report) if report.is_clear() => {
                metrics::counter!(crate::observability::CONFLICT_CHECKS_TOTAL, "outcome" => "clear")
                    .increment(1);
                Ok(())
            }
            Ok(report) => {
                metrics::counter!(crate::observability::CONFLICT_CHECKS_TOTAL, "outcome" => "conflict")
                    .increment(1);
                for c in &report.conflicts {
                    tracing::warn!(
                        "service {service_id}: resource {} double assigned with {}: {}",
                        c.resource_id,
                        c.other_service_id,
                        c.message
                    );
                }
                match self.conflict_policy {
                    ConflictPolicy::Observe => Ok(()),
                    ConflictPolicy::Reject => {
                        self.roll_back(service_id, undo).await?;
                        Err(EngineError::ConflictRejected {
                            service_id,
                            conflicts: report.conflicts,
                        })
                    }
                }
            }
            Err(e) => {
                metrics::counter!(crate::observability::CONFLICT_CHECKS_TOTAL, "outcome" => "error")
                    .increment(1);
                tracing::error!("double assignment check failed for {service_id}: {e}");
                if self.conflict_policy == ConflictPolicy::Reject {
                    self.roll_back(service_id, undo).await?;
                }
                Err(EngineError::HookFailed {
                    service_id,
                    reason: e.0,
                })
            }
        }
    }

    async fn roll_back(&self, service_id: Ulid, undo: Vec<Event>) -> Result<(), EngineError> {
        self.commit(undo).await?;
        metrics::counter!(crate::observability::ROLLBACKS_TOTAL).increment(1);
        tracing::info!("rolled back write to {service_id}");
        Ok(())
    }
}
