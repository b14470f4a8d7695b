//! Per-machine render pipeline
//!
//! Rendering for one machine runs in three phases:
//!
//! 1. Every required parameter must be present on the machine.
//! 2. Every path expression is evaluated. Any failure aborts before a single
//!    file is touched.
//! 3. Content templates are evaluated and written one file at a time. A
//!    template that fails leaves no file at its destination; files written
//!    for earlier templates are kept.

use crate::compiler::CompiledBootEnv;
use crate::error::{RenderError, Result};
use provisioner_crd::Machine;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Destination of one template for one machine
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    /// Template role, e.g. "pxelinux"
    pub name: String,

    /// Absolute destination path
    pub path: PathBuf,
}

/// Files written by one render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifacts {
    pub bootenv: String,
    pub machine: String,
    pub files: Vec<RenderedTemplate>,
}

impl CompiledBootEnv {
    /// Required parameters the machine does not carry, in declaration order
    pub fn missing_params(&self, machine: &Machine) -> Vec<String> {
        self.bootenv()
            .required_params
            .iter()
            .filter(|param| !machine.params.contains_key(param.as_str()))
            .cloned()
            .collect()
    }

    pub fn check_required_params(&self, machine: &Machine) -> Result<()> {
        let missing = self.missing_params(machine);
        if missing.is_empty() {
            return Ok(());
        }
        Err(RenderError::MissingRequiredParams {
            bootenv: self.bootenv().name.clone(),
            machine: machine.name.clone(),
            missing,
        })
    }

    /// Evaluate every destination path for a machine
    ///
    /// All or nothing: the first failing path expression is returned and no
    /// paths are produced.
    pub fn render_paths(&self, machine: &Machine) -> Result<Vec<RenderedTemplate>> {
        let ctx = self.context(machine);
        self.bootenv()
            .templates
            .iter()
            .enumerate()
            .map(|(index, info)| -> Result<RenderedTemplate> {
                let rendered = self.render_path(index, &ctx)?;
                Ok(RenderedTemplate {
                    name: info.name.clone(),
                    path: self.destination(&info.name, &rendered)?,
                })
            })
            .collect()
    }

    /// Render every template for a machine and write the results
    pub async fn render(&self, machine: &Machine) -> Result<RenderedArtifacts> {
        self.check_required_params(machine)?;
        let targets = self.render_paths(machine)?;
        let ctx = self.context(machine);

        for (index, target) in targets.iter().enumerate() {
            let content = self.render_content(index, &ctx);
            write_artifact(&target.path, content).await?;

            debug!(
                bootenv = %self.bootenv().name,
                machine = %machine.name,
                template = %target.name,
                path = %target.path.display(),
                "Rendered template"
            );
        }

        info!(
            bootenv = %self.bootenv().name,
            machine = %machine.name,
            files = targets.len(),
            "Rendered boot environment"
        );

        Ok(RenderedArtifacts {
            bootenv: self.bootenv().name.clone(),
            machine: machine.name.clone(),
            files: targets,
        })
    }

    /// Remove every file a render for this machine would have written
    ///
    /// Templates whose path cannot be evaluated, or whose file is already
    /// gone, are skipped. Any other removal failure is returned. Returns the
    /// number of files removed.
    pub async fn delete_rendered(&self, machine: &Machine) -> Result<usize> {
        let ctx = self.context(machine);
        let mut removed = 0;

        for (index, info) in self.bootenv().templates.iter().enumerate() {
            let path = match self
                .render_path(index, &ctx)
                .and_then(|rendered| self.destination(&info.name, &rendered))
            {
                Ok(path) => path,
                Err(e) => {
                    debug!(
                        bootenv = %self.bootenv().name,
                        machine = %machine.name,
                        template = %info.name,
                        error = %e,
                        "Skipping delete, path did not render"
                    );
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RenderError::io(path, e)),
            }
        }

        if removed > 0 {
            info!(
                bootenv = %self.bootenv().name,
                machine = %machine.name,
                removed,
                "Removed rendered files"
            );
        }
        Ok(removed)
    }

    fn destination(&self, template: &str, rendered: &str) -> Result<PathBuf> {
        if !is_relative_inside(rendered) {
            return Err(RenderError::InvalidPath {
                template: template.to_string(),
                path: rendered.to_string(),
            });
        }
        Ok(self.resolver().disk_path(rendered))
    }
}

/// A non-empty relative path with no parent or root components
fn is_relative_inside(rendered: &str) -> bool {
    let path = Path::new(rendered);
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Write rendered content, removing the destination if anything fails
async fn write_artifact(path: &Path, content: Result<String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| RenderError::io(parent, e))?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| RenderError::io(path, e))?;

    let result = match content {
        Ok(body) => match file.write_all(body.as_bytes()).await {
            Ok(()) => file.sync_all().await.map_err(|e| RenderError::io(path, e)),
            Err(e) => Err(RenderError::io(path, e)),
        },
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(err) = result {
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
        return Err(err);
    }
    Ok(())
}
