use serde::{Deserialize, Serialize};

pub const IMAGE_PIPELINE_TAGS: [&str; 2] = ["text-to-image", "image-to-image"];
pub const SEARCH_RESULT_LIMIT: usize = 20;

/// One entry of the hub's model listing. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub pipeline_tag: Option<String>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub downloads: Option<u64>,
}

impl ModelDescriptor {
    pub fn is_image_model(&self) -> bool {
        self.pipeline_tag
            .as_deref()
            .map(|tag| IMAGE_PIPELINE_TAGS.contains(&tag))
            .unwrap_or(false)
    }
}

pub fn filter_image_models(descriptors: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    descriptors
        .into_iter()
        .filter(ModelDescriptor::is_image_model)
        .take(SEARCH_RESULT_LIMIT)
        .collect()
}
