use hfimage_contracts::models::{filter_image_models, ModelDescriptor};
use hfimage_contracts::request::BearerToken;
use tracing::{debug, warn};

use crate::client::GenerationClient;
use crate::error::{truncate_text, GenerationError, DIAGNOSTIC_BODY_MAX_CHARS};
use crate::transport::{Transport, TransportRequest};

const SEARCH_FILTER: &str = "image-to-image,text-to-image";

impl<T: Transport> GenerationClient<T> {
    /// Searches the hub for image models, keeping at most 20
    /// text-to-image or image-to-image entries.
    ///
    /// Does not touch the active generation slot.
    pub async fn search_models(
        &self,
        query: &str,
        token: &BearerToken,
    ) -> Result<Vec<ModelDescriptor>, GenerationError> {
        let query = query.trim();
        if query.is_empty() || token.is_empty() {
            return Ok(Vec::new());
        }

        let request = TransportRequest::get(self.config().search_endpoint.clone(), token.clone())
            .with_query("search", query)
            .with_query("filter", SEARCH_FILTER);
        debug!(%query, "searching models");

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "model search failed");
            // The body is diagnostic only; a failed read leaves it blank.
            let text = response.body.text().await.unwrap_or_default();
            return Err(GenerationError::HttpStatus {
                status: response.status,
                reason: response.reason,
                body: truncate_text(text.trim(), DIAGNOSTIC_BODY_MAX_CHARS),
            });
        }
        let text = response.body.text().await?;

        let descriptors: Vec<ModelDescriptor> = serde_json::from_str(&text)
            .map_err(|err| GenerationError::Decode(format!("model search: {err}")))?;
        let total = descriptors.len();
        let kept = filter_image_models(descriptors);
        debug!(total, kept = kept.len(), "model search finished");
        Ok(kept)
    }
}
