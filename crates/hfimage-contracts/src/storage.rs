use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

pub const API_KEY_KEY: &str = "huggingface_api_key";

/// Key-value capability the front end persists through. Implementations are
/// chosen by whoever composes the application.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// A single JSON object on disk. Every call re-reads the file so separate
/// instances over the same path see each other's writes.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>) -> bool) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if !apply(&mut on_disk) {
            return Ok(());
        }
        write_json_object(&self.path, &on_disk)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(read_json_object(&self.path).and_then(|payload| payload.get(key).cloned()))
    }

    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        self.update(|payload| {
            if payload.get(key) == Some(&value) {
                return false;
            }
            payload.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.update(|payload| payload.remove(key).is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ApiKeyStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .store
            .get(API_KEY_KEY)?
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }

    pub fn set(&mut self, api_key: &str) -> anyhow::Result<()> {
        self.store
            .set(API_KEY_KEY, Value::String(api_key.trim().to_string()))
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.store.remove(API_KEY_KEY)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
