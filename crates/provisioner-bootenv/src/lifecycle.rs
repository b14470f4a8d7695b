//! Boot environment lifecycle controller
//!
//! A definition moves from draft to active through [`BootEnvController::on_change`]
//! and is retired through [`BootEnvController::guard_delete`]. Steps run
//! strictly in sequence; nothing is retried. Every step before the cascade
//! is idempotent, so a failed update is completed by calling `on_change`
//! again.

use crate::config::ProvisionerConfig;
use crate::error::{BootEnvError, Result};
use crate::fetch::{ensure_file, FileFetcher, HttpFetcher};
use crate::media::{MediaExtractor, MediaOutcome, MediaPreparer, ScriptExtractor};
use crate::store::MachineStore;
use provisioner_crd::{BootEnv, Machine};
use provisioner_render::{
    CompiledBootEnv, PathResolver, RenderedArtifacts, TemplateCompiler, TemplateSource,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum BootEnvEvent {
    /// Definition validated, prepared and compiled
    Validated { bootenv: String },
    /// Media preparation ran
    MediaPrepared { bootenv: String, outcome: MediaOutcome },
    /// An auxiliary file is present
    FileReady {
        bootenv: String,
        name: String,
        fetched: bool,
    },
    /// Artifacts written for one machine
    MachineRendered {
        bootenv: String,
        machine: String,
        files: usize,
    },
    /// Every bound machine was re-rendered
    CascadeCompleted { bootenv: String, machines: usize },
    /// Definition deleted
    Retired { bootenv: String },
}

/// Drives boot environments through validation, preparation and cascade
pub struct BootEnvController {
    machines: Arc<dyn MachineStore>,
    compiler: TemplateCompiler,
    media: MediaPreparer,
    fetcher: Arc<dyn FileFetcher>,

    /// Compiled environments by name, replaced on every successful update
    compiled: RwLock<HashMap<String, Arc<CompiledBootEnv>>>,

    event_sender: broadcast::Sender<BootEnvEvent>,
}

impl BootEnvController {
    /// Create a controller using the configured extraction script and HTTP downloads
    pub fn new(
        config: ProvisionerConfig,
        machines: Arc<dyn MachineStore>,
        templates: Arc<dyn TemplateSource>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(1024);
        let extractor = Arc::new(ScriptExtractor::new(config.explode_script.clone()));

        Self {
            machines,
            compiler: TemplateCompiler::new(config.render_config(), templates),
            media: MediaPreparer::new(config.iso_dir(), extractor),
            fetcher: Arc::new(HttpFetcher::new()),
            compiled: RwLock::new(HashMap::new()),
            event_sender,
        }
    }

    /// Replace the media extraction procedure
    pub fn with_extractor(mut self, extractor: Arc<dyn MediaExtractor>) -> Self {
        self.media = self.media.with_extractor(extractor);
        self
    }

    /// Replace the file fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn FileFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<BootEnvEvent> {
        self.event_sender.subscribe()
    }

    /// Validate and prepare a definition without touching bound machines
    ///
    /// Runs the structural check, media preparation, file fetching, template
    /// compilation and the kernel and initrd checks, in that order. On
    /// success the compiled environment replaces any previous one.
    pub async fn validate_and_prepare(&self, bootenv: &BootEnv) -> Result<Arc<CompiledBootEnv>> {
        bootenv.validate()?;

        let resolver = PathResolver::new(self.compiler.config(), bootenv);

        if bootenv.os.iso_file.is_some() {
            let outcome = self.media.prepare(bootenv, &resolver).await?;
            self.emit(BootEnvEvent::MediaPrepared {
                bootenv: bootenv.name.clone(),
                outcome,
            });
        }

        for file in &bootenv.os.files {
            let fetched = ensure_file(self.fetcher.as_ref(), &resolver, file).await?;
            self.emit(BootEnvEvent::FileReady {
                bootenv: bootenv.name.clone(),
                name: file.name.clone(),
                fetched,
            });
        }

        let compiled = Arc::new(self.compiler.compile(bootenv).await?);

        if let Some(kernel) = &bootenv.kernel {
            let path = resolver.disk_path(kernel);
            if !is_regular_file(&path).await {
                return Err(BootEnvError::MissingKernel {
                    bootenv: bootenv.name.clone(),
                    kernel: kernel.clone(),
                    path,
                });
            }
        }

        for initrd in &bootenv.initrds {
            let path = resolver.disk_path(initrd);
            if !is_regular_file(&path).await {
                return Err(BootEnvError::MissingInitrd {
                    bootenv: bootenv.name.clone(),
                    initrd: initrd.clone(),
                    path,
                });
            }
        }

        self.compiled
            .write()
            .await
            .insert(bootenv.name.clone(), compiled.clone());

        info!(bootenv = %bootenv.name, "Boot environment validated");
        self.emit(BootEnvEvent::Validated {
            bootenv: bootenv.name.clone(),
        });

        Ok(compiled)
    }

    /// Activate a new or updated definition
    ///
    /// For an update, `previous` is the stored definition. Its name must
    /// match, and every machine bound to it is re-rendered in store order.
    /// The first machine that fails aborts the cascade. Returns the
    /// artifacts written by the cascade.
    pub async fn on_change(
        &self,
        bootenv: &BootEnv,
        previous: Option<&BootEnv>,
    ) -> Result<Vec<RenderedArtifacts>> {
        if let Some(previous) = previous {
            if previous.name != bootenv.name {
                return Err(BootEnvError::ImmutableIdentity {
                    from: previous.name.clone(),
                    to: bootenv.name.clone(),
                });
            }
        }

        let compiled = self.validate_and_prepare(bootenv).await?;

        match previous {
            Some(_) => self.cascade_render(&compiled).await,
            None => Ok(Vec::new()),
        }
    }

    /// Re-render every machine bound to a compiled environment
    pub async fn cascade_render(
        &self,
        compiled: &CompiledBootEnv,
    ) -> Result<Vec<RenderedArtifacts>> {
        let name = &compiled.bootenv().name;
        let machines = self.machines.list_machines_by_bootenv(name).await?;
        info!(bootenv = %name, machines = machines.len(), "Cascading render");

        let mut rendered = Vec::with_capacity(machines.len());
        for machine in &machines {
            let artifacts = compiled.render(machine).await.map_err(|e| {
                warn!(bootenv = %name, machine = %machine.name, error = %e, "Cascade aborted");
                e
            })?;
            self.emit(BootEnvEvent::MachineRendered {
                bootenv: name.clone(),
                machine: machine.name.clone(),
                files: artifacts.files.len(),
            });
            rendered.push(artifacts);
        }

        self.emit(BootEnvEvent::CascadeCompleted {
            bootenv: name.clone(),
            machines: rendered.len(),
        });
        Ok(rendered)
    }

    /// Refuse deletion while any machine references the environment
    pub async fn guard_delete(&self, name: &str) -> Result<()> {
        let machines = self.machines.list_machines_by_bootenv(name).await?;
        if let Some(machine) = machines.first() {
            return Err(BootEnvError::EnvironmentInUse {
                bootenv: name.to_string(),
                machine: machine.name.clone(),
            });
        }

        self.compiled.write().await.remove(name);
        info!(bootenv = %name, "Boot environment retired");
        self.emit(BootEnvEvent::Retired {
            bootenv: name.to_string(),
        });
        Ok(())
    }

    /// Render a boot environment for one machine
    pub async fn apply_to_machine(
        &self,
        bootenv: &BootEnv,
        machine: &Machine,
    ) -> Result<RenderedArtifacts> {
        let compiled = self.compiled_for(bootenv).await?;
        let artifacts = compiled.render(machine).await?;
        self.emit(BootEnvEvent::MachineRendered {
            bootenv: bootenv.name.clone(),
            machine: machine.name.clone(),
            files: artifacts.files.len(),
        });
        Ok(artifacts)
    }

    /// Remove a machine's artifacts for a boot environment
    pub async fn remove_from_machine(&self, bootenv: &BootEnv, machine: &Machine) -> Result<usize> {
        let compiled = self.compiled_for(bootenv).await?;
        Ok(compiled.delete_rendered(machine).await?)
    }

    /// Compiled form of a definition, compiling it if the cache is stale
    async fn compiled_for(&self, bootenv: &BootEnv) -> Result<Arc<CompiledBootEnv>> {
        if let Some(compiled) = self.compiled.read().await.get(&bootenv.name) {
            if compiled.bootenv() == bootenv {
                return Ok(compiled.clone());
            }
        }

        debug!(bootenv = %bootenv.name, "Compiling boot environment on demand");
        let compiled = Arc::new(self.compiler.compile(bootenv).await?);
        self.compiled
            .write()
            .await
            .insert(bootenv.name.clone(), compiled.clone());
        Ok(compiled)
    }

    fn emit(&self, event: BootEnvEvent) {
        let _ = self.event_sender.send(event);
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
