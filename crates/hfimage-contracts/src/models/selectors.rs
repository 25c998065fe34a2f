use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model_id: String,
    pub known: Option<ModelSpec>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Any non-empty identifier is accepted as-is, catalog entry or not;
    /// only a missing one falls back to the catalog default.
    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, String> {
        if let Some(requested) = requested.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(ModelSelection {
                model_id: requested.to_string(),
                known: self.registry.get(requested).cloned(),
                fallback_reason: None,
            });
        }

        let Some(model) = self.registry.default_model().cloned() else {
            return Err("No model specified and the catalog is empty.".to_string());
        };
        Ok(ModelSelection {
            model_id: model.id.clone(),
            known: Some(model),
            fallback_reason: Some("No model specified; using default.".to_string()),
        })
    }
}
