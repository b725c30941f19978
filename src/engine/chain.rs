use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// What deleting a batch actually removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlinkPlan {
    /// Requested ids first, then cascaded successors in walk order.
    pub deleted: Vec<Ulid>,
    /// Successors pulled in because they were not part of the batch.
    pub cascaded: Vec<Ulid>,
    /// Surviving parents whose `next_id` points into the deleted set.
    pub detached: Vec<Ulid>,
}

impl Engine {
    /// Build the successor a new service's template asks for, if any.
    ///
    /// The successor starts when `original` stops, takes the first allowed
    /// container of the successor template and inherits the generation id.
    /// Only one hop is generated: the successor's own template is not
    /// consulted here.
    pub(super) async fn generate_successor(
        &self,
        original: &Service,
        template: &Template,
    ) -> Result<Option<Service>, EngineError> {
        let Some(next_template_id) = template.next_template_id else {
            return Ok(None);
        };
        let next_template = self
            .catalog
            .template(next_template_id)
            .await?
            .ok_or(EngineError::NotFound(next_template_id))?;
        let containers = self.catalog.allowed_containers(next_template_id).await?;
        let container_id = *containers
            .first()
            .ok_or(EngineError::NoSuccessorContainer { template_id: next_template_id })?;

        let draft = ServiceDraft::new(next_template_id, container_id, original.scheduled_stop);
        let mut successor = self
            .build_service(&next_template, draft, original.generation_id.clone())
            .await?;
        successor.parent_id = Some(original.id);
        Ok(Some(successor))
    }

    /// Walk forward from every service of `batch`, collecting successors
    /// that are not themselves being deleted.
    ///
    /// A successor that no longer exists ends its walk quietly. Revisiting a
    /// service within one walk means the chain loops back on itself.
    pub fn unlink_plan(&self, batch: &[Ulid]) -> Result<UnlinkPlan, EngineError> {
        let mut plan = UnlinkPlan::default();
        let mut doomed: HashSet<Ulid> = HashSet::with_capacity(batch.len());
        for id in batch {
            if !self.services.contains_key(id) {
                return Err(EngineError::NotFound(*id));
            }
            if doomed.insert(*id) {
                plan.deleted.push(*id);
            }
        }

        for id in batch {
            let mut walked = HashSet::new();
            walked.insert(*id);
            let mut prev = *id;
            let mut cur = self.services.get(id).and_then(|s| s.next_id);
            while let Some(next) = cur {
                if !walked.insert(next) {
                    return Err(EngineError::CycleDetected(next));
                }
                if walked.len() > MAX_CHAIN_LENGTH {
                    return Err(EngineError::LimitExceeded("chain too long"));
                }
                if doomed.contains(&next) {
                    break;
                }
                let Some(successor) = self.services.get(&next) else {
                    tracing::debug!("successor {next} of {prev} already removed");
                    break;
                };
                cur = successor.next_id;
                drop(successor);
                doomed.insert(next);
                plan.deleted.push(next);
                plan.cascaded.push(next);
                prev = next;
            }
        }

        for id in &plan.deleted {
            let Some(parent_id) = self.services.get(id).and_then(|s| s.parent_id) else {
                continue;
            };
            if doomed.contains(&parent_id) || plan.detached.contains(&parent_id) {
                continue;
            }
            if self
                .services
                .get(&parent_id)
                .is_some_and(|p| p.next_id == Some(*id))
            {
                plan.detached.push(parent_id);
            }
        }

        Ok(plan)
    }

    /// Services reachable from `id` through `next_id`, starting with `id`.
    pub fn chain(&self, id: Ulid) -> Result<Vec<Service>, EngineError> {
        let first = self.get_service(&id).ok_or(EngineError::NotFound(id))?;
        let mut seen = HashSet::from([id]);
        let mut cur = first.next_id;
        let mut out = vec![first];
        while let Some(next) = cur {
            if !seen.insert(next) {
                return Err(EngineError::CycleDetected(next));
            }
            if out.len() >= MAX_CHAIN_LENGTH {
                return Err(EngineError::LimitExceeded("chain too long"));
            }
            let Some(svc) = self.get_service(&next) else { break };
            cur = svc.next_id;
            out.push(svc);
        }
        Ok(out)
    }
}
