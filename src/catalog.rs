use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use ulid::Ulid;

use crate::directory::{InMemoryDirectory, ResourceRecord};
use crate::model::*;

/// Failure reported by an external collaborator (catalog, directory, rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorError(pub String);

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CollaboratorError {}

/// Read-only access to templates and their requirement lists.
#[async_trait]
pub trait RequirementCatalog: Send + Sync {
    async fn template(&self, id: Ulid) -> Result<Option<Template>, CollaboratorError>;

    async fn requirements(
        &self,
        template_id: Ulid,
        kind: ResourceKind,
    ) -> Result<Vec<Requirement>, CollaboratorError>;

    /// Ordered container list; index 0 seeds generated successors.
    async fn allowed_containers(&self, template_id: Ulid) -> Result<Vec<Ulid>, CollaboratorError> {
        Ok(self
            .template(template_id)
            .await?
            .map(|t| t.allowed_containers)
            .unwrap_or_default())
    }
}

pub struct InMemoryCatalog {
    templates: DashMap<Ulid, Template>,
    requirements: DashMap<(Ulid, ResourceKind), Vec<Requirement>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            requirements: DashMap::new(),
        }
    }

    pub fn insert_template(&self, template: Template) {
        self.templates.insert(template.id, template);
    }

    pub fn set_requirements(&self, template_id: Ulid, kind: ResourceKind, reqs: Vec<Requirement>) {
        self.requirements.insert((template_id, kind), reqs);
    }

    /// Append one requirement to a template's list for `kind`.
    pub fn add_requirement(&self, template_id: Ulid, kind: ResourceKind, req: Requirement) {
        self.requirements.entry((template_id, kind)).or_default().push(req);
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

#[async_trait]
impl RequirementCatalog for InMemoryCatalog {
    async fn template(&self, id: Ulid) -> Result<Option<Template>, CollaboratorError> {
        Ok(self.templates.get(&id).map(|e| e.value().clone()))
    }

    async fn requirements(
        &self,
        template_id: Ulid,
        kind: ResourceKind,
    ) -> Result<Vec<Requirement>, CollaboratorError> {
        Ok(self
            .requirements
            .get(&(template_id, kind))
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}

// ── Catalog file ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    #[serde(flatten)]
    template: Template,
    #[serde(default)]
    requirements: HashMap<ResourceKind, Vec<Requirement>>,
}

/// JSON seed for the in-memory collaborators:
/// `{"templates": [...], "resources": [...]}`.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    templates: Vec<TemplateEntry>,
    #[serde(default)]
    resources: Vec<ResourceRecord>,
}

impl CatalogFile {
    pub fn parse(json: &str) -> std::io::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn into_collaborators(self) -> (InMemoryCatalog, InMemoryDirectory) {
        let catalog = InMemoryCatalog::new();
        for entry in self.templates {
            let id = entry.template.id;
            catalog.insert_template(entry.template);
            for (kind, reqs) in entry.requirements {
                catalog.set_requirements(id, kind, reqs);
            }
        }
        let directory = InMemoryDirectory::new();
        for record in self.resources {
            directory.insert(record);
        }
        (catalog, directory)
    }
}
