//! Model persistence
//!
//! The session only needs to put and get agent bundles by key. Files are
//! written as JSON or bincode; the in-memory store backs tests and embedding
//! hosts that handle persistence themselves.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::AgentBundle;

/// Keyed storage for agent bundles
pub trait ModelStore {
    /// Store `bundle` under `key`, replacing any previous bundle
    fn save(&mut self, key: &str, bundle: &AgentBundle) -> Result<()>;

    /// Fetch the bundle stored under `key`
    fn load(&self, key: &str) -> Result<Option<AgentBundle>>;
}

/// On-disk encoding of a stored bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Json,
    Bincode,
}

impl StoreFormat {
    fn extension(self) -> &'static str {
        match self {
            StoreFormat::Json => "json",
            StoreFormat::Bincode => "bin",
        }
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
    format: StoreFormat,
}

impl FileModelStore {
    /// Open (and create if needed) a store directory
    pub fn new<P: AsRef<Path>>(dir: P, format: StoreFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating model directory {}", dir.display()))?;
        Ok(Self { dir, format })
    }

    /// File a key maps to
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            bail!("invalid model key '{}'", key);
        }
        Ok(self.dir.join(format!("{}.{}", key, self.format.extension())))
    }
}

impl ModelStore for FileModelStore {
    fn save(&mut self, key: &str, bundle: &AgentBundle) -> Result<()> {
        let path = self.path_for(key)?;
        let bytes = match self.format {
            StoreFormat::Json => serde_json::to_vec_pretty(bundle)?,
            StoreFormat::Bincode => bincode::serialize(bundle)?,
        };
        let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        file.write_all(&bytes)?;
        tracing::debug!("Saved model '{}' to {}", key, path.display());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<AgentBundle>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let bundle = match self.format {
            StoreFormat::Json => serde_json::from_slice(&bytes)?,
            StoreFormat::Bincode => bincode::deserialize(&bytes)?,
        };
        Ok(Some(bundle))
    }
}

/// Shared in-memory map; clones see the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryModelStore {
    entries: Rc<RefCell<HashMap<String, AgentBundle>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&mut self, key: &str, bundle: &AgentBundle) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), bundle.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<AgentBundle>> {
        Ok(self.entries.borrow().get(key).cloned())
    }
}
