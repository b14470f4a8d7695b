//! Machine records
//!
//! The machine store itself is an external collaborator. This is the subset
//! of a machine record the rendering engine reads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// A machine that boot environments are rendered for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Machine {
    /// Fully qualified machine name
    pub name: String,

    /// Record identifier; see [`Machine::id`] when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// Address the machine boots from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Addr>,

    /// Name of the boot environment currently bound to this machine
    #[serde(default)]
    pub boot_env: String,

    /// Free-form parameters referenced by templates
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl Machine {
    /// Create a new machine without a stored UUID
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: None,
            address: None,
            boot_env: String::new(),
            params: HashMap::new(),
        }
    }

    /// Set the boot address
    pub fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the record identifier
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Stored UUID, or one derived from the name so it is stable across loads
    pub fn id(&self) -> Uuid {
        self.uuid
            .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_DNS, self.name.as_bytes()))
    }

    /// Bind to a boot environment
    pub fn with_boot_env(mut self, boot_env: impl Into<String>) -> Self {
        self.boot_env = boot_env.into();
        self
    }

    /// Add a parameter
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Address as eight upper-case hex digits, the pxelinux config file name
    pub fn hex_address(&self) -> Option<String> {
        self.address.map(|addr| {
            addr.octets()
                .iter()
                .map(|octet| format!("{:02X}", octet))
                .collect()
        })
    }

    /// Host part of the name, up to the first dot
    pub fn short_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Path of this machine's record relative to the provisioner URL
    pub fn path(&self) -> String {
        format!("machines/{}", self.id())
    }

    /// URL this machine fetches its own files from
    pub fn url(&self, provisioner_url: &str) -> String {
        format!("{}/{}", provisioner_url.trim_end_matches('/'), self.path())
    }

    /// Whether the machine is bound to the named boot environment
    pub fn uses_bootenv(&self, name: &str) -> bool {
        self.boot_env == name
    }
}
