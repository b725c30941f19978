use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::CollaboratorError;
use crate::model::ResourceKind;

/// One `(rule method, field, value)` line of an employee's resource profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileParameter {
    pub method: String,
    pub field: String,
    pub value: String,
}

/// Lookups over the personnel, vehicle and equipment pools.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Whether `resource` holds `category` (a skill, equipment category or
    /// vehicle category depending on `kind`). Unknown resources hold nothing.
    async fn has_category(
        &self,
        resource: Ulid,
        category: Ulid,
        kind: ResourceKind,
    ) -> Result<bool, CollaboratorError>;

    async fn display_name(
        &self,
        kind: ResourceKind,
        resource: Ulid,
    ) -> Result<Option<String>, CollaboratorError>;

    async fn profile_parameters(
        &self,
        employee: Ulid,
    ) -> Result<Vec<ProfileParameter>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default)]
    pub categories: BTreeSet<Ulid>,
    #[serde(default)]
    pub profile: Vec<ProfileParameter>,
}

pub struct InMemoryDirectory {
    resources: DashMap<(ResourceKind, Ulid), ResourceRecord>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
        }
    }

    pub fn insert(&self, record: ResourceRecord) {
        self.resources.insert((record.kind, record.id), record);
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

#[async_trait]
impl ResourceDirectory for InMemoryDirectory {
    async fn has_category(
        &self,
        resource: Ulid,
        category: Ulid,
        kind: ResourceKind,
    ) -> Result<bool, CollaboratorError> {
        Ok(self
            .resources
            .get(&(kind, resource))
            .is_some_and(|r| r.categories.contains(&category)))
    }

    async fn display_name(
        &self,
        kind: ResourceKind,
        resource: Ulid,
    ) -> Result<Option<String>, CollaboratorError> {
        Ok(self.resources.get(&(kind, resource)).map(|r| r.name.clone()))
    }

    async fn profile_parameters(
        &self,
        employee: Ulid,
    ) -> Result<Vec<ProfileParameter>, CollaboratorError> {
        Ok(self
            .resources
            .get(&(ResourceKind::Skill, employee))
            .map(|r| r.profile.clone())
            .unwrap_or_default())
    }
}
