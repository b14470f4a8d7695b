//! Provisioner record types
//!
//! This crate provides the data model shared by the rendering engine and the
//! boot environment lifecycle controller.
//!
//! # Resources
//!
//! - `BootEnv` - A named definition of what to boot or install a machine into
//! - `Machine` - The machine record a boot environment is rendered for
//!
//! Records are ingested as JSON with PascalCase field names:
//!
//! ```
//! use provisioner_crd::BootEnv;
//!
//! let env: BootEnv = serde_json::from_str(r#"{
//!     "Name": "ubuntu-16.04-install",
//!     "OS": { "Name": "ubuntu-16.04" },
//!     "Templates": [
//!         { "Name": "ipxe", "Path": "{{ Machine.Address }}.ipxe", "UUID": "default-ipxe.tmpl" }
//!     ]
//! }"#).unwrap();
//!
//! assert!(env.validate().is_ok());
//! ```

pub mod bootenv;
pub mod error;
pub mod machine;

pub use bootenv::*;
pub use error::*;
pub use machine::*;

/// OS name that lives directly under the file root instead of `<os>/install`
pub const DISCOVERY_OS: &str = "discovery";

/// Name suffix marking boot environments that install an operating system
pub const INSTALL_SUFFIX: &str = "-install";
