use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::request::GenerationRequest;
use crate::storage::KeyValueStore;

pub const HISTORY_KEY: &str = "generated_images";
pub const DEFAULT_PAGE_SIZE: usize = 4;

/// A settled successful generation, as kept in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    /// Where the image bytes were saved.
    pub url: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub model_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub byte_length: Option<u64>,
}

impl GenerationRecord {
    pub fn from_request(
        request: &GenerationRequest,
        url: impl Into<String>,
        mime_type: &str,
        byte_length: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            prompt: request.prompt.clone(),
            negative_prompt: request.effective_negative_prompt().map(str::to_string),
            width: request.width,
            height: request.height,
            num_inference_steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
            model_id: request.model_id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            mime_type: Some(mime_type.to_string()),
            byte_length: Some(byte_length),
        }
    }
}

/// Newest-first list of past generations. `clear` is irreversible.
#[derive(Debug, Clone)]
pub struct HistoryStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list(&self) -> anyhow::Result<Vec<GenerationRecord>> {
        let Some(raw) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        let Value::Array(rows) = raw else {
            return Ok(Vec::new());
        };
        // Rows that no longer parse are skipped.
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect())
    }

    /// Prepends `record`. Stored rows are kept as they are, including ones
    /// `list` cannot parse.
    pub fn append(&mut self, record: GenerationRecord) -> anyhow::Result<()> {
        let mut rows = match self.store.get(HISTORY_KEY)? {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        };
        let row = serde_json::to_value(&record).context("failed to encode history record")?;
        rows.insert(0, row);
        self.store.set(HISTORY_KEY, Value::Array(rows))
    }

    pub fn find(&self, id: &str) -> anyhow::Result<Option<GenerationRecord>> {
        Ok(self.list()?.into_iter().find(|record| record.id == id))
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.store.remove(HISTORY_KEY)
    }

    /// 1-based page; out-of-range pages are empty.
    pub fn page(&self, page: usize, per_page: usize) -> anyhow::Result<Vec<GenerationRecord>> {
        let per_page = per_page.max(1);
        let start = page.saturating_sub(1).saturating_mul(per_page);
        Ok(self
            .list()?
            .into_iter()
            .skip(start)
            .take(per_page)
            .collect())
    }

    pub fn page_count(&self, per_page: usize) -> anyhow::Result<usize> {
        Ok(self.list()?.len().div_ceil(per_page.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::BearerToken;
    use crate::storage::{FileStore, MemoryStore};

    fn record(prompt: &str) -> GenerationRecord {
        let request = GenerationRequest::new("m1", prompt, BearerToken::new("t"));
        GenerationRecord::from_request(&request, format!("/tmp/{prompt}.png"), "image/png", 10)
    }

    #[test]
    fn append_keeps_newest_first() -> anyhow::Result<()> {
        let mut history = HistoryStore::new(MemoryStore::new());
        history.append(record("first"))?;
        history.append(record("second"))?;

        let prompts: Vec<String> = history.list()?.into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["second", "first"]);
        Ok(())
    }

    #[test]
    fn records_serialize_camel_case_without_absent_optionals() -> anyhow::Result<()> {
        let value = serde_json::to_value(record("cat"))?;
        assert_eq!(value["modelId"], json!("m1"));
        assert_eq!(value["numInferenceSteps"], json!(50));
        assert_eq!(value["mimeType"], json!("image/png"));
        assert!(value.get("seed").is_none());
        assert!(value.get("negativePrompt").is_none());
        Ok(())
    }

    #[test]
    fn paging_and_clear() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut history = HistoryStore::new(FileStore::new(temp.path().join("store.json")));
        for idx in 0..6 {
            history.append(record(&format!("p{idx}")))?;
        }

        assert_eq!(history.page_count(DEFAULT_PAGE_SIZE)?, 2);
        let second: Vec<String> = history
            .page(2, DEFAULT_PAGE_SIZE)?
            .into_iter()
            .map(|r| r.prompt)
            .collect();
        assert_eq!(second, vec!["p1", "p0"]);
        assert!(history.page(3, DEFAULT_PAGE_SIZE)?.is_empty());

        let newest = history.list()?[0].clone();
        assert_eq!(history.find(&newest.id)?, Some(newest));

        history.clear()?;
        assert!(history.list()?.is_empty());
        assert_eq!(history.page_count(DEFAULT_PAGE_SIZE)?, 0);
        Ok(())
    }

    #[test]
    fn unparseable_rows_are_skipped() -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        let good = serde_json::to_value(record("ok"))?;
        store.set(HISTORY_KEY, json!([{"garbage": true}, good]))?;
        let history = HistoryStore::new(store);
        assert_eq!(history.list()?.len(), 1);
        Ok(())
    }

    #[test]
    fn append_preserves_rows_it_cannot_parse() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("store.json");
        FileStore::new(&path).set(HISTORY_KEY, json!([{"id": 42, "width": "wide"}]))?;

        let mut history = HistoryStore::new(FileStore::new(&path));
        let fresh = record("new");
        history.append(fresh.clone())?;

        let raw = FileStore::new(&path).get(HISTORY_KEY)?;
        let rows = raw.as_ref().and_then(Value::as_array).cloned().unwrap_or_default();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(fresh.id));
        assert_eq!(rows[1], json!({"id": 42, "width": "wide"}));
        assert_eq!(history.list()?, vec![fresh]);
        Ok(())
    }
}
