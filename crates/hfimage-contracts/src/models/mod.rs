mod registry;
mod search;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, DEFAULT_MODEL_ID};
pub use search::{filter_image_models, ModelDescriptor, IMAGE_PIPELINE_TAGS, SEARCH_RESULT_LIMIT};
pub use selectors::{ModelSelection, ModelSelector};
