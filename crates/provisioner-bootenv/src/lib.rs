//! Boot environment lifecycle
//!
//! This crate keeps the artifacts on disk consistent with boot environment
//! definitions. It prepares install media, fetches auxiliary files, and
//! re-renders every bound machine when a definition changes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 BootEnvController                     │
//! │                                                       │
//! │  on_change ─► validate ─► MediaPreparer ─► ensure_file│
//! │                  │            (canary, sha256)        │
//! │                  ▼                                    │
//! │           TemplateCompiler ─► kernel/initrd check     │
//! │                  │                                    │
//! │                  ▼                                    │
//! │   MachineStore ─► cascade_render (fail fast)          │
//! │                                                       │
//! │  guard_delete ─► EnvironmentInUse | Retired           │
//! │                                                       │
//! │           BootEnvEvent stream (broadcast)             │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use provisioner_bootenv::{BootEnvController, MemoryStore, ProvisionerConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = ProvisionerConfig::default().with_file_root("/srv/provisioner");
//! let controller = BootEnvController::new(config, store.clone(), store);
//!
//! controller.on_change(&updated, Some(&previous)).await?;
//! controller.guard_delete(&updated.name).await?;
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod media;
pub mod store;

pub use attributes::*;
pub use config::*;
pub use error::*;
pub use fetch::*;
pub use lifecycle::*;
pub use media::*;
pub use store::*;
