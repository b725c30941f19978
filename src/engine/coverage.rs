use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Turn per-requirement counts into a diagnostic.
///
/// A requirement is satisfied when `min_qty <= count` and, for `max_qty > 0`,
/// `count <= max_qty`. Both a "Missing" and a "Too many" line may be emitted
/// for one requirement (when `min_qty > max_qty`). With no violations the
/// result is exactly [`ALL_COVERED`].
pub fn render_diagnostic(tallies: &[(Requirement, usize)]) -> String {
    let mut violations = Vec::new();
    for (req, count) in tallies {
        let count = *count as i64;
        if count < i64::from(req.min_qty) {
            violations.push(format!("Missing {}", req.category_name));
        }
        if req.max_qty > 0 && count > req.max_qty {
            violations.push(format!("Too many {}", req.category_name));
        }
    }
    if violations.is_empty() {
        ALL_COVERED.to_string()
    } else {
        violations.join("\n")
    }
}

impl Engine {
    /// Coverage diagnostic of one assignment set against a template's
    /// requirements of `kind`. Reads collaborators only; writes nothing.
    pub(super) async fn diagnose(
        &self,
        template_id: Ulid,
        kind: ResourceKind,
        assigned: &BTreeSet<Ulid>,
    ) -> Result<String, EngineError> {
        let requirements = self.catalog.requirements(template_id, kind).await?;
        let mut tallies = Vec::with_capacity(requirements.len());
        for req in requirements {
            let mut count = 0usize;
            for resource in assigned {
                if self
                    .directory
                    .has_category(*resource, req.category_id, kind)
                    .await?
                {
                    count += 1;
                }
            }
            tallies.push((req, count));
        }

        let diagnostic = render_diagnostic(&tallies);
        if diagnostic != ALL_COVERED {
            metrics::counter!(crate::observability::COVERAGE_SHORTFALLS_TOTAL, "kind" => kind.label())
                .increment(1);
        }
        Ok(diagnostic)
    }

    /// All three diagnostics, each computed on its own.
    pub(super) async fn diagnose_all(&self, svc: &Service) -> Result<Vec<(ResourceKind, String)>, EngineError> {
        let mut out = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            out.push((kind, self.diagnose(svc.template_id, kind, svc.assigned(kind)).await?));
        }
        Ok(out)
    }
}
