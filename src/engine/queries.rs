use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::rules::{ConflictReport, EmployeeRules, RuleMethods};

use super::{Engine, EngineError};

impl Engine {
    pub fn get_service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// All live services ordered by scheduled start.
    pub fn list_services(&self) -> Vec<Service> {
        let mut out: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|s| (s.scheduled_start, s.id));
        out
    }

    /// Members of one generation batch in creation order.
    pub fn generation(&self, generation_id: &str) -> Vec<Service> {
        self.generations
            .get(generation_id)
            .map(|ids| ids.iter().filter_map(|id| self.get_service(id)).collect())
            .unwrap_or_default()
    }

    /// The containers a picker should offer for `template_id`, in catalog order.
    pub async fn filter_containers_for_template(&self, template_id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        if self.catalog.template(template_id).await?.is_none() {
            return Err(EngineError::NotFound(template_id));
        }
        Ok(self.catalog.allowed_containers(template_id).await?)
    }

    /// Service joined with the template fields it displays.
    pub async fn describe_service(&self, id: Ulid) -> Result<ServiceInfo, EngineError> {
        let service = self.get_service(&id).ok_or(EngineError::NotFound(id))?;
        let template = self
            .catalog
            .template(service.template_id)
            .await?
            .ok_or(EngineError::NotFound(service.template_id))?;
        Ok(ServiceInfo {
            service,
            template_name: template.name,
            off_duty: template.off_duty,
            service_color: template.base_color,
        })
    }

    /// Run the rule subsystem's double assignment check directly.
    pub async fn double_assign(&self, scope: ResourceScope, service_id: Ulid) -> Result<ConflictReport, EngineError> {
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFound(service_id));
        }
        Ok(self.rules.double_assign(scope, service_id).await?)
    }

    pub async fn rule_call(&self, rule_name: &str, service_id: Ulid) -> Result<serde_json::Value, EngineError> {
        if rule_name.len() > MAX_RULE_NAME_LEN {
            return Err(EngineError::LimitExceeded("rule name too long"));
        }
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFound(service_id));
        }
        Ok(self.rules.rule_call(rule_name, service_id).await?)
    }

    /// Per-employee `rule method → field → value` maps gathered from the
    /// resource profiles of everyone assigned to the service.
    pub async fn resource_rule_parameters(&self, service_id: Ulid) -> Result<Vec<EmployeeRules>, EngineError> {
        let service = self.get_service(&service_id).ok_or(EngineError::NotFound(service_id))?;
        let mut out = Vec::with_capacity(service.employees.len());
        for employee_id in &service.employees {
            let params = self.directory.profile_parameters(*employee_id).await?;
            let name = self.directory.display_name(ResourceKind::Skill, *employee_id).await?;
            let methods = RuleMethods::from_parameters(&params);
            tracing::info!(
                "{} {}",
                name.as_deref().unwrap_or("<unknown>"),
                methods.to_json()
            );
            out.push(EmployeeRules {
                employee_id: *employee_id,
                name,
                methods,
            });
        }
        Ok(out)
    }
}
