use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::CollaboratorError;
use crate::directory::ProfileParameter;
use crate::model::ResourceScope;

/// A resource assigned to this service and, at an overlapping time, to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub resource_id: Ulid,
    pub other_service_id: Ulid,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_clear(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// What the engine does with a conflict report after a committed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Log and count; the write stands.
    #[default]
    Observe,
    /// Roll the write back and fail the operation.
    Reject,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "observe" => Ok(ConflictPolicy::Observe),
            "reject" => Ok(ConflictPolicy::Reject),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// The external rule subsystem. Only the call contract lives here.
#[async_trait]
pub trait RuleService: Send + Sync {
    async fn double_assign(
        &self,
        scope: ResourceScope,
        service_id: Ulid,
    ) -> Result<ConflictReport, CollaboratorError>;

    async fn rule_call(
        &self,
        rule_name: &str,
        service_id: Ulid,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// Stand-in for hosts without a rule engine: never reports conflicts.
pub struct NoRules;

#[async_trait]
impl RuleService for NoRules {
    async fn double_assign(
        &self,
        _scope: ResourceScope,
        _service_id: Ulid,
    ) -> Result<ConflictReport, CollaboratorError> {
        Ok(ConflictReport::default())
    }

    async fn rule_call(
        &self,
        rule_name: &str,
        service_id: Ulid,
    ) -> Result<serde_json::Value, CollaboratorError> {
        tracing::debug!("rule_call {rule_name} for {service_id}: no rule engine configured");
        Ok(serde_json::Value::Null)
    }
}

/// `rule method → field → value` for one employee's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleMethods(BTreeMap<String, BTreeMap<String, String>>);

impl RuleMethods {
    /// Later parameters for the same method/field overwrite earlier ones.
    pub fn from_parameters(params: &[ProfileParameter]) -> Self {
        let mut methods: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for p in params {
            methods
                .entry(p.method.clone())
                .or_default()
                .insert(p.field.clone(), p.value.clone());
        }
        Self(methods)
    }

    pub fn get(&self, method: &str, field: &str) -> Option<&str> {
        self.0.get(method)?.get(field).map(String::as_str)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRules {
    pub employee_id: Ulid,
    pub name: Option<String>,
    pub methods: RuleMethods,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(method: &str, field: &str, value: &str) -> ProfileParameter {
        ProfileParameter {
            method: method.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    #[test]
    fn groups_fields_under_method() {
        let methods = RuleMethods::from_parameters(&[
            param("rest", "min_hours", "11"),
            param("rest", "max_shifts", "5"),
            param("night", "allowed", "true"),
        ]);
        assert_eq!(methods.get("rest", "min_hours"), Some("11"));
        assert_eq!(methods.get("rest", "max_shifts"), Some("5"));
        assert_eq!(methods.get("night", "allowed"), Some("true"));
        assert_eq!(methods.methods().collect::<Vec<_>>(), vec!["night", "rest"]);
    }

    #[test]
    fn last_value_wins() {
        let methods = RuleMethods::from_parameters(&[
            param("rest", "min_hours", "11"),
            param("rest", "min_hours", "12"),
        ]);
        assert_eq!(methods.get("rest", "min_hours"), Some("12"));
    }

    #[test]
    fn json_rendering() {
        let methods = RuleMethods::from_parameters(&[param("rest", "min_hours", "11")]);
        assert_eq!(methods.to_json(), r#"{"rest":{"min_hours":"11"}}"#);
        assert_eq!(RuleMethods::default().to_json(), "{}");
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("observe".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Observe));
        assert_eq!("REJECT".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Reject));
        assert!("maybe".parse::<ConflictPolicy>().is_err());
    }

    #[tokio::test]
    async fn no_rules_reports_clear() {
        let report = NoRules.double_assign(ResourceScope::All, Ulid::new()).await.unwrap();
        assert!(report.is_clear());
        let v = NoRules.rule_call("anything", Ulid::new()).await.unwrap();
        assert!(v.is_null());
    }
}
