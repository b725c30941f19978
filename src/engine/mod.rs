mod chain;
mod coverage;
mod derive;
mod error;
mod hook;
mod mutations;
mod queries;

pub use chain::UnlinkPlan;
pub use coverage::render_diagnostic;
pub use derive::{employee_name_list, generation_id_at, resolve_stop};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use ulid::Ulid;

use crate::catalog::RequirementCatalog;
use crate::directory::ResourceDirectory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::rules::{ConflictPolicy, RuleService};
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        txn: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Single flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { txn, response } => {
                let mut batch = vec![(txn, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { txn, response }) => batch.push((txn, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (txn, _) in batch {
        if let Err(e) = wal.append_buffered(txn) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// External systems the engine consults. None of them is owned by the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn RequirementCatalog>,
    pub directory: Arc<dyn ResourceDirectory>,
    pub rules: Arc<dyn RuleService>,
}

pub struct Engine {
    pub(super) services: DashMap<Ulid, Service>,
    /// generation id → member services, in creation order.
    pub(super) generations: DashMap<String, Vec<Ulid>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) catalog: Arc<dyn RequirementCatalog>,
    pub(super) directory: Arc<dyn ResourceDirectory>,
    pub(super) rules: Arc<dyn RuleService>,
    pub(super) conflict_policy: ConflictPolicy,
    /// Held by every mutating operation for its whole transaction.
    pub(super) txn_lock: Mutex<()>,
}

/// Apply a field-level event to one service.
fn apply_to_service(svc: &mut Service, event: &Event) {
    match event {
        Event::AssignmentsChanged {
            kind,
            assigned,
            check,
            employee_names,
            ..
        } => {
            *svc.assigned_mut(*kind) = assigned.clone();
            *svc.check_mut(*kind) = check.clone();
            if let Some(names) = employee_names {
                svc.employee_names = names.clone();
            }
        }
        Event::CheckRecomputed { kind, check, .. } => {
            *svc.check_mut(*kind) = check.clone();
        }
        Event::Rescheduled {
            scheduled_start,
            scheduled_stop,
            ..
        } => {
            svc.scheduled_start = *scheduled_start;
            svc.scheduled_stop = *scheduled_stop;
        }
        Event::StateChanged { state, .. } => svc.state = *state,
        Event::ActualsRecorded {
            start_real,
            stop_real,
            ..
        } => {
            svc.start_real = *start_real;
            svc.stop_real = *stop_real;
        }
        Event::LocalityChanged { locality, .. } => svc.locality = locality.clone(),
        Event::NextLinked { next_id, .. } => svc.next_id = *next_id,
        // Whole-record events are handled at the DashMap level.
        Event::ServiceCreated { .. } | Event::ServiceRestored { .. } | Event::ServiceDeleted { .. } => {}
    }
}

fn apply_event(
    services: &DashMap<Ulid, Service>,
    generations: &DashMap<String, Vec<Ulid>>,
    event: &Event,
) {
    match event {
        Event::ServiceCreated { service } | Event::ServiceRestored { service } => {
            let mut members = generations.entry(service.generation_id.clone()).or_default();
            if !members.contains(&service.id) {
                members.push(service.id);
            }
            drop(members);
            services.insert(service.id, service.clone());
        }
        Event::ServiceDeleted { id } => {
            if let Some((_, svc)) = services.remove(id) {
                let emptied = match generations.get_mut(&svc.generation_id) {
                    Some(mut members) => {
                        members.retain(|m| m != id);
                        members.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    generations.remove(&svc.generation_id);
                }
            }
        }
        other => {
            if let Some(mut svc) = services.get_mut(&other.service_id()) {
                apply_to_service(&mut svc, other);
            }
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        collaborators: Collaborators,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let txns = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            services: DashMap::new(),
            generations: DashMap::new(),
            wal_tx,
            notify,
            catalog: collaborators.catalog,
            directory: collaborators.directory,
            rules: collaborators.rules,
            conflict_policy: ConflictPolicy::default(),
            txn_lock: Mutex::new(()),
        };

        for txn in &txns {
            for event in txn {
                apply_event(&engine.services, &engine.generations, event);
            }
        }
        if !txns.is_empty() {
            tracing::info!(
                "replayed {} transaction(s), {} live service(s)",
                txns.len(),
                engine.services.len()
            );
        }
        metrics::gauge!(crate::observability::SERVICES_ACTIVE).set(engine.services.len() as f64);

        Ok(engine)
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Write one transaction to the WAL via the background group-commit writer.
    async fn wal_append(&self, txn: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { txn, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify for a whole transaction. Nothing is
    /// applied unless the WAL accepted every event.
    pub(super) async fn commit(&self, txn: Vec<Event>) -> Result<(), EngineError> {
        if txn.is_empty() {
            return Ok(());
        }
        self.wal_append(txn.clone()).await?;
        for event in &txn {
            apply_event(&self.services, &self.generations, event);
            self.notify.send(event.service_id(), event);
        }
        metrics::gauge!(crate::observability::SERVICES_ACTIVE).set(self.services.len() as f64);
        Ok(())
    }
}
