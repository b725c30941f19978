use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;

/// Diagnostic written when every requirement of a kind is satisfied.
pub const ALL_COVERED: &str = "All covered";

/// The three requirement dimensions a template can declare.
///
/// Each kind is checked against its own assignment set: skills against the
/// assigned employees, equipment categories against the assigned equipment,
/// vehicle categories against the assigned vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[serde(alias = "employee")]
    Skill,
    #[serde(alias = "equipment")]
    EquipmentCategory,
    #[serde(alias = "vehicle")]
    VehicleCategory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Skill,
        ResourceKind::EquipmentCategory,
        ResourceKind::VehicleCategory,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Skill => "skill",
            ResourceKind::EquipmentCategory => "equipment_category",
            ResourceKind::VehicleCategory => "vehicle_category",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Planned,
    Confirmed,
    Closed,
}

/// Which resources a double-booking check should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    All,
    Kind(ResourceKind),
}

/// One `(category, min, max)` line of a template. `max_qty <= 0` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub category_id: Ulid,
    pub category_name: String,
    pub min_qty: u32,
    #[serde(default)]
    pub max_qty: i64,
}

/// Catalog blueprint a service is allocated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: Ulid,
    pub name: String,
    /// Whole hours. Values `<= 0` fall back to one hour.
    #[serde(default)]
    pub duration_hours: i64,
    /// Ordered: the first entry is used for generated successors.
    #[serde(default)]
    pub allowed_containers: Vec<Ulid>,
    #[serde(default)]
    pub next_template_id: Option<Ulid>,
    #[serde(default)]
    pub off_duty: bool,
    #[serde(default)]
    pub base_color: Option<String>,
}

/// An allocated duty shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub template_id: Ulid,
    pub container_id: Ulid,
    pub generation_id: String,
    pub employees: BTreeSet<Ulid>,
    pub vehicles: BTreeSet<Ulid>,
    pub equipment: BTreeSet<Ulid>,
    pub employee_check: String,
    pub equipment_check: String,
    pub vehicle_check: String,
    pub employee_names: String,
    pub locality: Option<String>,
    pub scheduled_start: Ms,
    pub scheduled_stop: Ms,
    pub start_real: Option<Ms>,
    pub stop_real: Option<Ms>,
    pub state: ServiceState,
    pub parent_id: Option<Ulid>,
    pub next_id: Option<Ulid>,
}

impl Service {
    /// The assignment set a requirement kind is counted against.
    pub fn assigned(&self, kind: ResourceKind) -> &BTreeSet<Ulid> {
        match kind {
            ResourceKind::Skill => &self.employees,
            ResourceKind::EquipmentCategory => &self.equipment,
            ResourceKind::VehicleCategory => &self.vehicles,
        }
    }

    pub fn assigned_mut(&mut self, kind: ResourceKind) -> &mut BTreeSet<Ulid> {
        match kind {
            ResourceKind::Skill => &mut self.employees,
            ResourceKind::EquipmentCategory => &mut self.equipment,
            ResourceKind::VehicleCategory => &mut self.vehicles,
        }
    }

    pub fn check(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Skill => &self.employee_check,
            ResourceKind::EquipmentCategory => &self.equipment_check,
            ResourceKind::VehicleCategory => &self.vehicle_check,
        }
    }

    pub fn check_mut(&mut self, kind: ResourceKind) -> &mut String {
        match kind {
            ResourceKind::Skill => &mut self.employee_check,
            ResourceKind::EquipmentCategory => &mut self.equipment_check,
            ResourceKind::VehicleCategory => &mut self.vehicle_check,
        }
    }
}

/// Caller-supplied fields of a new service. Everything else is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDraft {
    pub template_id: Ulid,
    pub container_id: Ulid,
    pub scheduled_start: Ms,
    pub generation_id: Option<String>,
    pub employees: BTreeSet<Ulid>,
    pub vehicles: BTreeSet<Ulid>,
    pub equipment: BTreeSet<Ulid>,
    pub locality: Option<String>,
    pub state: ServiceState,
}

impl ServiceDraft {
    pub fn new(template_id: Ulid, container_id: Ulid, scheduled_start: Ms) -> Self {
        Self {
            template_id,
            container_id,
            scheduled_start,
            generation_id: None,
            employees: BTreeSet::new(),
            vehicles: BTreeSet::new(),
            equipment: BTreeSet::new(),
            locality: None,
            state: ServiceState::Planned,
        }
    }

    pub fn with_generation_id(mut self, generation_id: impl Into<String>) -> Self {
        self.generation_id = Some(generation_id.into());
        self
    }

    pub fn with_assigned(mut self, kind: ResourceKind, ids: impl IntoIterator<Item = Ulid>) -> Self {
        let set = match kind {
            ResourceKind::Skill => &mut self.employees,
            ResourceKind::EquipmentCategory => &mut self.equipment,
            ResourceKind::VehicleCategory => &mut self.vehicles,
        };
        set.extend(ids);
        self
    }

    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = Some(locality.into());
        self
    }
}

/// The event types: flat, one level of nesting at most. A WAL record is a
/// `Vec<Event>` holding every event of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceCreated {
        service: Service,
    },
    AssignmentsChanged {
        id: Ulid,
        kind: ResourceKind,
        assigned: BTreeSet<Ulid>,
        check: String,
        /// Only present for employee changes.
        employee_names: Option<String>,
    },
    CheckRecomputed {
        id: Ulid,
        kind: ResourceKind,
        check: String,
    },
    Rescheduled {
        id: Ulid,
        scheduled_start: Ms,
        scheduled_stop: Ms,
    },
    StateChanged {
        id: Ulid,
        state: ServiceState,
    },
    ActualsRecorded {
        id: Ulid,
        start_real: Option<Ms>,
        stop_real: Option<Ms>,
    },
    LocalityChanged {
        id: Ulid,
        locality: Option<String>,
    },
    NextLinked {
        id: Ulid,
        next_id: Option<Ulid>,
    },
    /// Compensating snapshot written when a write is rolled back.
    ServiceRestored {
        service: Service,
    },
    ServiceDeleted {
        id: Ulid,
    },
}

impl Event {
    pub fn service_id(&self) -> Ulid {
        match self {
            Event::ServiceCreated { service } | Event::ServiceRestored { service } => service.id,
            Event::AssignmentsChanged { id, .. }
            | Event::CheckRecomputed { id, .. }
            | Event::Rescheduled { id, .. }
            | Event::StateChanged { id, .. }
            | Event::ActualsRecorded { id, .. }
            | Event::LocalityChanged { id, .. }
            | Event::NextLinked { id, .. }
            | Event::ServiceDeleted { id } => *id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service: Service,
    pub template_name: String,
    pub off_duty: bool,
    pub service_color: Option<String>,
}

/// All three diagnostics of one service, as written by `revalidate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    pub service_id: Ulid,
    pub employee_check: String,
    pub equipment_check: String,
    pub vehicle_check: String,
}
