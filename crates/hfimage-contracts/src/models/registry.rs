use indexmap::IndexMap;

pub const DEFAULT_MODEL_ID: &str = "runwayml/stable-diffusion-v1-5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    pub pipeline_tag: String,
}

impl ModelSpec {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Ordered catalog of known models. The first entry is the default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.models.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn default_model(&self) -> Option<&ModelSpec> {
        self.models.values().next()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, name: &str| {
        map.insert(
            id.to_string(),
            ModelSpec {
                id: id.to_string(),
                name: name.to_string(),
                pipeline_tag: "text-to-image".to_string(),
            },
        );
    };

    insert(DEFAULT_MODEL_ID, "Stable Diffusion v1.5");
    insert("stabilityai/stable-diffusion-2", "Stable Diffusion v2");
    insert(
        "stabilityai/stable-diffusion-xl-base-1.0",
        "Stable Diffusion XL",
    );
    insert("CompVis/stable-diffusion-v1-4", "Stable Diffusion v1.4");
    insert("prompthero/openjourney", "Openjourney");

    map
}
