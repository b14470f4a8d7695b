//! Template compilation
//!
//! Compiling a boot environment parses every path expression, every content
//! template and the boot parameter template once, up front. The result is an
//! immutable [`CompiledBootEnv`] that can be shared across concurrent renders.

use crate::config::RenderConfig;
use crate::context::{register_helpers, RenderContext, BOOT_PARAMS_TEMPLATE};
use crate::error::{RenderError, Result};
use crate::paths::PathResolver;
use crate::syntax::normalize_actions;
use async_trait::async_trait;
use minijinja::{Environment, UndefinedBehavior};
use provisioner_crd::{BootEnv, Machine};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Source of content templates, keyed by template identifier
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Load a template body, `None` if the identifier is unknown
    async fn load_template(&self, id: &str) -> Result<Option<String>>;
}

/// Template source backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplates {
    templates: HashMap<String, String>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(id, body);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(id.into(), body.into());
    }
}

#[async_trait]
impl TemplateSource for MemoryTemplates {
    async fn load_template(&self, id: &str) -> Result<Option<String>> {
        Ok(self.templates.get(id).cloned())
    }
}

/// Compiles boot environments against a template source
#[derive(Clone)]
pub struct TemplateCompiler {
    config: RenderConfig,
    source: Arc<dyn TemplateSource>,
}

impl TemplateCompiler {
    pub fn new(config: RenderConfig, source: Arc<dyn TemplateSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Parse every template of a boot environment
    ///
    /// Dot-prefixed actions (`{{.Machine.Name}}`) are accepted alongside
    /// native expressions; see [`crate::syntax`].
    ///
    /// Fails on the first incomplete template entry, unknown template
    /// identifier or syntax error.
    pub async fn compile(&self, bootenv: &BootEnv) -> Result<CompiledBootEnv> {
        bootenv.validate_templates()?;

        let resolver = PathResolver::new(&self.config, bootenv);
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        register_helpers(&mut env, &resolver, &bootenv.initrds);

        for (index, info) in bootenv.templates.iter().enumerate() {
            env.add_template_owned(path_template(index), normalize_actions(&info.path))
                .map_err(|source| RenderError::TemplateCompile {
                    template: format!("{} path", info.name),
                    text: info.path.clone(),
                    source,
                })?;

            let body = self
                .source
                .load_template(&info.uuid)
                .await?
                .ok_or_else(|| RenderError::TemplateNotFound {
                    template: info.name.clone(),
                    uuid: info.uuid.clone(),
                })?;

            env.add_template_owned(content_template(index), normalize_actions(&body))
                .map_err(|source| RenderError::TemplateCompile {
                    template: info.name.clone(),
                    text: body,
                    source,
                })?;
        }

        if let Some(boot_params) = &bootenv.boot_params {
            env.add_template_owned(BOOT_PARAMS_TEMPLATE, normalize_actions(boot_params))
                .map_err(|source| RenderError::TemplateCompile {
                    template: BOOT_PARAMS_TEMPLATE.to_string(),
                    text: boot_params.clone(),
                    source,
                })?;
        }

        debug!(
            bootenv = %bootenv.name,
            templates = bootenv.templates.len(),
            "Compiled boot environment"
        );

        Ok(CompiledBootEnv {
            bootenv: bootenv.clone(),
            resolver,
            config: self.config.clone(),
            env,
        })
    }
}

/// A boot environment with all of its templates parsed
///
/// Derived state only: rebuilt from the definition whenever it changes and
/// never serialized.
pub struct CompiledBootEnv {
    bootenv: BootEnv,
    resolver: PathResolver,
    config: RenderConfig,
    env: Environment<'static>,
}

impl std::fmt::Debug for CompiledBootEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledBootEnv")
            .field("bootenv", &self.bootenv.name)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl CompiledBootEnv {
    pub fn bootenv(&self) -> &BootEnv {
        &self.bootenv
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Bind the variables for one machine
    pub fn context<'a>(&'a self, machine: &'a Machine) -> RenderContext<'a> {
        RenderContext::new(&self.config, &self.bootenv, machine)
    }

    /// Evaluate the path expression of the template at `index`
    pub fn render_path(&self, index: usize, ctx: &RenderContext<'_>) -> Result<String> {
        self.evaluate(&path_template(index), &self.role(index), ctx)
    }

    /// Evaluate the content template at `index`
    pub fn render_content(&self, index: usize, ctx: &RenderContext<'_>) -> Result<String> {
        self.evaluate(&content_template(index), &self.role(index), ctx)
    }

    /// Evaluate the kernel command line, empty if the environment has none
    pub fn render_boot_params(&self, machine: &Machine) -> Result<String> {
        if self.bootenv.boot_params.is_none() {
            return Ok(String::new());
        }
        self.evaluate(BOOT_PARAMS_TEMPLATE, BOOT_PARAMS_TEMPLATE, &self.context(machine))
    }

    fn evaluate(&self, name: &str, role: &str, ctx: &RenderContext<'_>) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|err| RenderError::evaluation(role, err))?;
        template
            .render(ctx)
            .map_err(|err| RenderError::evaluation(role, err))
    }

    fn role(&self, index: usize) -> String {
        self.bootenv
            .templates
            .get(index)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| index.to_string())
    }
}

fn path_template(index: usize) -> String {
    format!("path/{}", index)
}

fn content_template(index: usize) -> String {
    format!("content/{}", index)
}
