use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, record_operation};

use super::derive::{generation_id_at, resolve_stop, validate_duration, validate_start};
use super::{Engine, EngineError, WalCommand};

fn check_assignment_count(set: &BTreeSet<Ulid>) -> Result<(), EngineError> {
    if set.len() > MAX_ASSIGNMENTS_PER_KIND {
        return Err(EngineError::LimitExceeded("too many assignments"));
    }
    Ok(())
}

fn check_locality(locality: &Option<String>) -> Result<(), EngineError> {
    if let Some(l) = locality
        && l.len() > MAX_LOCALITY_LEN {
            return Err(EngineError::LimitExceeded("locality too long"));
        }
    Ok(())
}

impl Engine {
    /// Materialize a draft: derive the stop time, the three diagnostics and
    /// the employee names. Nothing is persisted.
    pub(super) async fn build_service(
        &self,
        template: &Template,
        draft: ServiceDraft,
        generation_id: String,
    ) -> Result<Service, EngineError> {
        validate_duration(template)?;
        let mut svc = Service {
            id: Ulid::new(),
            template_id: template.id,
            container_id: draft.container_id,
            generation_id,
            employees: draft.employees,
            vehicles: draft.vehicles,
            equipment: draft.equipment,
            employee_check: String::new(),
            equipment_check: String::new(),
            vehicle_check: String::new(),
            employee_names: String::new(),
            locality: draft.locality,
            scheduled_start: draft.scheduled_start,
            scheduled_stop: resolve_stop(draft.scheduled_start, template.duration_hours),
            start_real: None,
            stop_real: None,
            state: draft.state,
            parent_id: None,
            next_id: None,
        };
        for (kind, check) in self.diagnose_all(&svc).await? {
            *svc.check_mut(kind) = check;
        }
        svc.employee_names = self.employee_names(&svc.employees).await?;
        Ok(svc)
    }

    /// Commit a single-service write, then run the conflict hook with a
    /// restore of `before` as the undo.
    async fn commit_write(&self, before: Service, txn: Vec<Event>) -> Result<(), EngineError> {
        let id = before.id;
        self.commit(txn).await?;
        self.after_write(id, vec![Event::ServiceRestored { service: before }]).await
    }

    fn require(&self, id: &Ulid) -> Result<Service, EngineError> {
        self.get_service(id).ok_or(EngineError::NotFound(*id))
    }

    /// Create a service and, when its template names a successor template,
    /// the linked successor. Both are committed in one transaction.
    pub async fn create_service(&self, draft: ServiceDraft) -> Result<Service, EngineError> {
        let started = Instant::now();
        let result = self.create_service_inner(draft).await;
        record_operation("create_service", started, &result);
        result
    }

    async fn create_service_inner(&self, draft: ServiceDraft) -> Result<Service, EngineError> {
        let _txn = self.txn_lock.lock().await;

        // before_create
        if self.services.len() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        validate_start(draft.scheduled_start)?;
        check_assignment_count(&draft.employees)?;
        check_assignment_count(&draft.vehicles)?;
        check_assignment_count(&draft.equipment)?;
        check_locality(&draft.locality)?;
        if let Some(ref g) = draft.generation_id
            && g.len() > MAX_GENERATION_ID_LEN {
                return Err(EngineError::LimitExceeded("generation id too long"));
            }
        let template = self
            .catalog
            .template(draft.template_id)
            .await?
            .ok_or(EngineError::NotFound(draft.template_id))?;
        let allowed = self.catalog.allowed_containers(template.id).await?;
        if !allowed.contains(&draft.container_id) {
            tracing::warn!(
                "container {} is not offered by template {}",
                draft.container_id,
                template.id
            );
        }
        let generation_id = draft
            .generation_id
            .clone()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| generation_id_at(chrono::Utc::now()));

        let mut service = self.build_service(&template, draft, generation_id).await?;
        let mut txn = vec![Event::ServiceCreated { service: service.clone() }];

        // after_create: one hop of chain generation
        let successor = self.generate_successor(&service, &template).await?;
        if let Some(ref next) = successor {
            txn.push(Event::ServiceCreated { service: next.clone() });
            txn.push(Event::NextLinked { id: service.id, next_id: Some(next.id) });
            service.next_id = Some(next.id);
        }

        self.commit(txn).await?;
        metrics::counter!(observability::SERVICES_CREATED_TOTAL, "origin" => "direct").increment(1);
        let mut undo = Vec::with_capacity(2);
        if let Some(ref next) = successor {
            metrics::counter!(observability::SERVICES_CREATED_TOTAL, "origin" => "chain").increment(1);
            tracing::debug!("service {} generated successor {}", service.id, next.id);
            undo.push(Event::ServiceDeleted { id: next.id });
        }
        undo.push(Event::ServiceDeleted { id: service.id });

        self.after_write(service.id, undo).await?;
        Ok(service)
    }

    /// Replace one assignment set and recompute that kind's diagnostic.
    pub async fn update_assignments(
        &self,
        id: Ulid,
        kind: ResourceKind,
        assigned: BTreeSet<Ulid>,
    ) -> Result<String, EngineError> {
        let started = Instant::now();
        let result = self.update_assignments_inner(id, kind, assigned).await;
        record_operation("update_assignments", started, &result);
        result
    }

    async fn update_assignments_inner(
        &self,
        id: Ulid,
        kind: ResourceKind,
        assigned: BTreeSet<Ulid>,
    ) -> Result<String, EngineError> {
        let _txn = self.txn_lock.lock().await;
        check_assignment_count(&assigned)?;
        let before = self.require(&id)?;

        let check = self.diagnose(before.template_id, kind, &assigned).await?;
        let employee_names = match kind {
            ResourceKind::Skill => Some(self.employee_names(&assigned).await?),
            _ => None,
        };
        let event = Event::AssignmentsChanged {
            id,
            kind,
            assigned,
            check: check.clone(),
            employee_names,
        };
        self.commit_write(before, vec![event]).await?;
        Ok(check)
    }

    /// Move a service and re-derive its stop time from the template duration.
    pub async fn reschedule(&self, id: Ulid, scheduled_start: Ms) -> Result<Service, EngineError> {
        let started = Instant::now();
        let result = self.reschedule_inner(id, scheduled_start).await;
        record_operation("reschedule", started, &result);
        result
    }

    async fn reschedule_inner(&self, id: Ulid, scheduled_start: Ms) -> Result<Service, EngineError> {
        let _txn = self.txn_lock.lock().await;
        validate_start(scheduled_start)?;
        let before = self.require(&id)?;
        let template = self
            .catalog
            .template(before.template_id)
            .await?
            .ok_or(EngineError::NotFound(before.template_id))?;
        validate_duration(&template)?;

        let event = Event::Rescheduled {
            id,
            scheduled_start,
            scheduled_stop: resolve_stop(scheduled_start, template.duration_hours),
        };
        self.commit_write(before, vec![event]).await?;
        self.require(&id)
    }

    /// No transition guard: any state may follow any other.
    pub async fn set_state(&self, id: Ulid, state: ServiceState) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.set_state_inner(id, state).await;
        record_operation("set_state", started, &result);
        result
    }

    async fn set_state_inner(&self, id: Ulid, state: ServiceState) -> Result<(), EngineError> {
        let _txn = self.txn_lock.lock().await;
        let before = self.require(&id)?;
        self.commit_write(before, vec![Event::StateChanged { id, state }]).await
    }

    /// Actual start/stop as reported from the field. Never derived.
    pub async fn record_actuals(
        &self,
        id: Ulid,
        start_real: Option<Ms>,
        stop_real: Option<Ms>,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.record_actuals_inner(id, start_real, stop_real).await;
        record_operation("record_actuals", started, &result);
        result
    }

    async fn record_actuals_inner(
        &self,
        id: Ulid,
        start_real: Option<Ms>,
        stop_real: Option<Ms>,
    ) -> Result<(), EngineError> {
        let _txn = self.txn_lock.lock().await;
        for t in start_real.iter().chain(stop_real.iter()) {
            validate_start(*t)?;
        }
        let before = self.require(&id)?;
        let event = Event::ActualsRecorded { id, start_real, stop_real };
        self.commit_write(before, vec![event]).await
    }

    pub async fn set_locality(&self, id: Ulid, locality: Option<String>) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.set_locality_inner(id, locality).await;
        record_operation("set_locality", started, &result);
        result
    }

    async fn set_locality_inner(&self, id: Ulid, locality: Option<String>) -> Result<(), EngineError> {
        let _txn = self.txn_lock.lock().await;
        check_locality(&locality)?;
        let before = self.require(&id)?;
        self.commit_write(before, vec![Event::LocalityChanged { id, locality }]).await
    }

    /// Recompute all three diagnostics of each service, e.g. after the
    /// catalog changed. Every service is diagnosed and committed on its own;
    /// nothing carries over from one service to the next.
    pub async fn revalidate(&self, ids: &[Ulid]) -> Result<Vec<CoverageReport>, EngineError> {
        let started = Instant::now();
        let result = self.revalidate_inner(ids).await;
        record_operation("revalidate", started, &result);
        result
    }

    async fn revalidate_inner(&self, ids: &[Ulid]) -> Result<Vec<CoverageReport>, EngineError> {
        let _txn = self.txn_lock.lock().await;
        if ids.len() > MAX_REVALIDATE_BATCH {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        if let Some(missing) = ids.iter().find(|id| !self.services.contains_key(id)) {
            return Err(EngineError::NotFound(*missing));
        }

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let before = self.require(id)?;
            let mut report = CoverageReport {
                service_id: *id,
                employee_check: String::new(),
                equipment_check: String::new(),
                vehicle_check: String::new(),
            };
            let mut txn = Vec::with_capacity(ResourceKind::ALL.len());
            for (kind, check) in self.diagnose_all(&before).await? {
                match kind {
                    ResourceKind::Skill => report.employee_check = check.clone(),
                    ResourceKind::EquipmentCategory => report.equipment_check = check.clone(),
                    ResourceKind::VehicleCategory => report.vehicle_check = check.clone(),
                }
                txn.push(Event::CheckRecomputed { id: *id, kind, check });
            }
            self.commit_write(before, txn).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Delete a batch of services together with every generated successor
    /// outside the batch. Returns all removed ids.
    pub async fn delete_services(&self, ids: &[Ulid]) -> Result<Vec<Ulid>, EngineError> {
        let started = Instant::now();
        let result = self.delete_services_inner(ids).await;
        record_operation("delete_services", started, &result);
        result
    }

    async fn delete_services_inner(&self, ids: &[Ulid]) -> Result<Vec<Ulid>, EngineError> {
        let _txn = self.txn_lock.lock().await;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_DELETE_BATCH {
            return Err(EngineError::LimitExceeded("batch too large"));
        }

        // before_delete: chain unlink
        let plan = self.unlink_plan(ids)?;
        let mut txn = Vec::with_capacity(plan.detached.len() + plan.deleted.len());
        for parent_id in &plan.detached {
            txn.push(Event::NextLinked { id: *parent_id, next_id: None });
        }
        // Successors go first, the requested services last.
        for id in plan.deleted.iter().rev() {
            txn.push(Event::ServiceDeleted { id: *id });
        }

        self.commit(txn).await?;
        for id in &plan.deleted {
            self.notify.remove(id);
        }
        let requested = (plan.deleted.len() - plan.cascaded.len()) as u64;
        metrics::counter!(observability::SERVICES_DELETED_TOTAL, "origin" => "direct").increment(requested);
        metrics::counter!(observability::SERVICES_DELETED_TOTAL, "origin" => "chain")
            .increment(plan.cascaded.len() as u64);
        if !plan.cascaded.is_empty() {
            tracing::info!(
                "deleted {} service(s), {} cascaded through chain",
                plan.deleted.len(),
                plan.cascaded.len()
            );
        }
        Ok(plan.deleted)
    }

    /// Rewrite the WAL as a single snapshot transaction of the live services.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _txn = self.txn_lock.lock().await;
        // Replay rebuilds generation order from snapshot order.
        let mut generations: Vec<(String, Vec<Ulid>)> = self
            .generations
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        generations.sort_by(|a, b| a.0.cmp(&b.0));

        let mut snapshot = Vec::with_capacity(self.services.len());
        let mut seen = HashSet::with_capacity(self.services.len());
        for (_, members) in generations {
            for id in members {
                if let Some(service) = self.get_service(&id)
                    && seen.insert(id)
                {
                    snapshot.push(Event::ServiceCreated { service });
                }
            }
        }
        let mut unindexed: Vec<Service> = self
            .services
            .iter()
            .filter(|e| !seen.contains(e.key()))
            .map(|e| e.value().clone())
            .collect();
        unindexed.sort_by_key(|s| s.id);
        snapshot.extend(unindexed.into_iter().map(|service| Event::ServiceCreated { service }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { snapshot, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
