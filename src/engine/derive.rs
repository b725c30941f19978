use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Scheduled stop for a start and a template duration. Durations of zero or
/// less count as one hour, so a service always spans at least an hour.
pub fn resolve_stop(start: Ms, duration_hours: i64) -> Ms {
    start + duration_hours.max(1) * HOUR_MS
}

/// Generation tag for services created at `now`, e.g. `M 2024-01-01-08-00-00`.
pub fn generation_id_at(now: DateTime<Utc>) -> String {
    now.format("M %Y-%m-%d-%H-%M-%S").to_string()
}

/// Each name followed by a newline.
pub fn employee_name_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

pub(crate) fn validate_start(start: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_duration(template: &Template) -> Result<(), EngineError> {
    if template.duration_hours > MAX_DURATION_HOURS {
        return Err(EngineError::LimitExceeded("template duration too long"));
    }
    Ok(())
}

impl Engine {
    /// Display names of the assigned employees. Employees unknown to the
    /// directory are listed by id.
    pub(super) async fn employee_names(&self, employees: &BTreeSet<Ulid>) -> Result<String, EngineError> {
        let mut names = Vec::with_capacity(employees.len());
        for id in employees {
            let name = self
                .directory
                .display_name(ResourceKind::Skill, *id)
                .await?
                .unwrap_or_else(|| id.to_string());
            names.push(name);
        }
        Ok(employee_name_list(names.iter().map(String::as_str)))
    }
}
