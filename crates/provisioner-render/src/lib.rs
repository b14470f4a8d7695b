//! Boot artifact rendering
//!
//! This crate turns a boot environment definition and a machine record into
//! files on disk: bootloader configs, kickstart/preseed files and kernel
//! command lines.
//!
//! # Pipeline
//!
//! ```text
//! BootEnv ──► TemplateCompiler ──► CompiledBootEnv
//!                   ▲                    │
//!            TemplateSource              ▼
//!                          Machine ──► RenderContext
//!                                        │
//!                    required params ◄───┤
//!                    path expressions ◄──┤  (all paths first)
//!                    content bodies  ◄───┘  (one file at a time)
//! ```
//!
//! Templates use `{{ }}` expressions with strict binding: an undefined
//! variable or map key fails the render instead of producing empty output.
//! Dot-prefixed actions such as `{{.Machine.HexAddress}}` are rewritten to
//! the same expressions before compilation.
//!
//! # Example
//!
//! ```ignore
//! use provisioner_render::{MemoryTemplates, RenderConfig, TemplateCompiler};
//! use std::sync::Arc;
//!
//! let config = RenderConfig::new("/tftpboot", "http://10.0.0.1:8091");
//! let compiler = TemplateCompiler::new(config, Arc::new(templates));
//! let compiled = compiler.compile(&bootenv).await?;
//! let artifacts = compiled.render(&machine).await?;
//! ```

pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod syntax;

pub use compiler::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use paths::*;
pub use pipeline::*;
pub use syntax::*;
