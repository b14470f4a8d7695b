//! Record store collaborators
//!
//! The lifecycle controller only needs to list machines. Boot environment
//! persistence stays with the caller.

use crate::error::{BootEnvError, Result};
use async_trait::async_trait;
use provisioner_crd::Machine;
use provisioner_render::{RenderError, TemplateSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for machine record lookup
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// List all machines
    async fn list_machines(&self) -> Result<Vec<Machine>>;

    /// List machines bound to a boot environment, in store order
    async fn list_machines_by_bootenv(&self, name: &str) -> Result<Vec<Machine>> {
        Ok(self
            .list_machines()
            .await?
            .into_iter()
            .filter(|m| m.uses_bootenv(name))
            .collect())
    }
}

/// In-memory machine and template store
#[derive(Debug, Default)]
pub struct MemoryStore {
    machines: RwLock<Vec<Machine>>,
    templates: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a machine, keyed by name
    pub async fn put_machine(&self, machine: Machine) {
        let mut machines = self.machines.write().await;
        match machines.iter_mut().find(|m| m.name == machine.name) {
            Some(existing) => *existing = machine,
            None => machines.push(machine),
        }
    }

    pub async fn remove_machine(&self, name: &str) -> Option<Machine> {
        let mut machines = self.machines.write().await;
        let index = machines.iter().position(|m| m.name == name)?;
        Some(machines.remove(index))
    }

    pub async fn put_template(&self, id: impl Into<String>, body: impl Into<String>) {
        self.templates.write().await.insert(id.into(), body.into());
    }
}

#[async_trait]
impl MachineStore for MemoryStore {
    async fn list_machines(&self) -> Result<Vec<Machine>> {
        Ok(self.machines.read().await.clone())
    }
}

#[async_trait]
impl TemplateSource for MemoryStore {
    async fn load_template(&self, id: &str) -> provisioner_render::Result<Option<String>> {
        Ok(self.templates.read().await.get(id).cloned())
    }
}

/// File-backed store
///
/// Machines are `*.json` records in one directory, read in file name order.
/// Templates are files in another directory named by their identifier.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    machines_dir: PathBuf,
    templates_dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(machines_dir: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            machines_dir: machines_dir.into(),
            templates_dir: templates_dir.into(),
        }
    }

    async fn read_machine(path: &Path) -> Result<Machine> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| BootEnvError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| BootEnvError::Store(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl MachineStore for JsonDirStore {
    async fn list_machines(&self) -> Result<Vec<Machine>> {
        let mut entries = match fs::read_dir(&self.machines_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BootEnvError::io(&self.machines_dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BootEnvError::io(&self.machines_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut machines = Vec::with_capacity(paths.len());
        for path in &paths {
            machines.push(Self::read_machine(path).await?);
        }
        debug!(dir = %self.machines_dir.display(), count = machines.len(), "Loaded machines");
        Ok(machines)
    }
}

#[async_trait]
impl TemplateSource for JsonDirStore {
    async fn load_template(&self, id: &str) -> provisioner_render::Result<Option<String>> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.starts_with('.') {
            return Err(RenderError::TemplateSource(format!(
                "invalid template identifier {:?}",
                id
            )));
        }

        let path = self.templates_dir.join(id);
        match fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RenderError::TemplateSource(format!("{}: {}", path.display(), e))),
        }
    }
}
