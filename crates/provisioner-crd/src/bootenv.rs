//! Boot environment types
//!
//! A boot environment is the machine-agnostic description of what a machine
//! boots into: the OS media it installs from, the kernel and initrds it loads,
//! and the templates that are expanded into per-machine boot artifacts.
//!
//! Only the definition lives here. Compiled templates and per-machine
//! destination paths are derived state owned by the rendering engine.

use crate::{CrdError, Result, DISCOVERY_OS, INSTALL_SUFFIX};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Template role for iPXE boot scripts
pub const IPXE_TEMPLATE: &str = "ipxe";
/// Template role for BIOS pxelinux configs
pub const PXELINUX_TEMPLATE: &str = "pxelinux";
/// Template role for UEFI elilo configs
pub const ELILO_TEMPLATE: &str = "elilo";

/// Boot environment definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct BootEnv {
    /// Unique name, immutable once machines reference it
    pub name: String,

    /// Operating system this environment boots or installs
    #[serde(rename = "OS", default)]
    pub os: OsInfo,

    /// Templates expanded into files for every machine using this environment
    #[serde(default)]
    pub templates: Vec<TemplateInfo>,

    /// Partial path to the kernel inside the install tree
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub kernel: Option<String>,

    /// Partial paths to the initrds inside the install tree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initrds: Vec<String>,

    /// Template producing the full kernel command line
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub boot_params: Option<String>,

    /// Machine parameters that must be present before rendering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_params: Vec<String>,

    /// Tenant this environment belongs to
    #[serde(default)]
    pub tenant_id: i64,
}

impl BootEnv {
    /// Create a boot environment for an OS
    pub fn new(name: impl Into<String>, os: OsInfo) -> Self {
        Self {
            name: name.into(),
            os,
            ..Default::default()
        }
    }

    /// Add a template
    pub fn with_template(mut self, template: TemplateInfo) -> Self {
        self.templates.push(template);
        self
    }

    /// Set the kernel partial path
    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = Some(kernel.into());
        self
    }

    /// Add an initrd partial path
    pub fn with_initrd(mut self, initrd: impl Into<String>) -> Self {
        self.initrds.push(initrd.into());
        self
    }

    /// Set the boot parameter template
    pub fn with_boot_params(mut self, boot_params: impl Into<String>) -> Self {
        self.boot_params = Some(boot_params.into());
        self
    }

    /// Add a required machine parameter
    pub fn with_required_param(mut self, param: impl Into<String>) -> Self {
        self.required_params.push(param.into());
        self
    }

    /// Whether this environment installs an operating system
    pub fn is_install(&self) -> bool {
        self.name.ends_with(INSTALL_SUFFIX)
    }

    /// Directory segment of the install tree, relative to the file root
    ///
    /// `discovery` lives directly under the root, every other OS under
    /// `<os>/install`.
    pub fn install_segment(&self) -> String {
        if self.os.name == DISCOVERY_OS {
            self.os.name.clone()
        } else {
            format!("{}/install", self.os.name)
        }
    }

    /// Check every template entry is complete
    pub fn validate_templates(&self) -> Result<()> {
        for (index, template) in self.templates.iter().enumerate() {
            if !template.is_complete() {
                return Err(CrdError::IllegalTemplate {
                    index,
                    name: template.name.clone(),
                    path: template.path.clone(),
                    uuid: template.uuid.clone(),
                });
            }
        }
        Ok(())
    }

    /// Structural validation run before an environment becomes active
    ///
    /// Every template must be complete, and the template set must include
    /// either an `ipxe` template or both `pxelinux` and `elilo`.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CrdError::MissingField("Name".to_string()));
        }

        self.validate_templates()?;

        let roles: HashSet<&str> = self.templates.iter().map(|t| t.name.as_str()).collect();
        let has_ipxe = roles.contains(IPXE_TEMPLATE);
        let has_legacy = roles.contains(PXELINUX_TEMPLATE) && roles.contains(ELILO_TEMPLATE);
        if !has_ipxe && !has_legacy {
            return Err(CrdError::IncompleteBootSupport(self.name.clone()));
        }

        Ok(())
    }

    /// Get a template by role name
    pub fn template(&self, name: &str) -> Option<&TemplateInfo> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Operating system description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct OsInfo {
    /// OS name, used as the install tree directory and URL segment
    pub name: String,

    /// Distribution lineage
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub family: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub codename: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// ISO image name under `<file root>/isos`
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub iso_file: Option<String>,

    /// Expected hex SHA-256 of the ISO image
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub iso_sha256: Option<String>,

    /// Where the ISO image can be downloaded from
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub iso_url: Option<String>,

    /// Auxiliary files fetched into the install tree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileData>,
}

impl OsInfo {
    /// Create OS info with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the ISO image and its checksum
    pub fn with_iso(mut self, iso_file: impl Into<String>, sha256: Option<String>) -> Self {
        self.iso_file = Some(iso_file.into());
        self.iso_sha256 = sha256;
        self
    }

    /// Add an auxiliary file
    pub fn with_file(mut self, file: FileData) -> Self {
        self.files.push(file);
        self
    }
}

/// Auxiliary file downloaded alongside the install media
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FileData {
    /// Source URL
    #[serde(rename = "URL", alias = "Url")]
    pub url: String,

    /// Destination file name inside the install tree
    pub name: String,

    /// URL of a checksum or signature file
    #[serde(
        rename = "ValidationURL",
        alias = "ValidationUrl",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_url: Option<String>,

    /// Validation method; only existence checks are performed
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_method: Option<String>,
}

impl FileData {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A template expanded into one file per machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TemplateInfo {
    /// Logical role, e.g. "pxelinux" or "ipxe"
    #[serde(rename = "Name")]
    pub name: String,

    /// Template producing the destination path inside the install tree
    #[serde(rename = "Path")]
    pub path: String,

    /// Identifier of the content template in the template store
    #[serde(rename = "UUID", alias = "Uuid")]
    pub uuid: String,
}

impl TemplateInfo {
    pub fn new(name: impl Into<String>, path: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            uuid: uuid.into(),
        }
    }

    /// All three fields are non-empty
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.path.is_empty() && !self.uuid.is_empty()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipxe_env() -> BootEnv {
        BootEnv::new("ubuntu-16.04-install", OsInfo::new("ubuntu-16.04")).with_template(
            TemplateInfo::new("ipxe", "{{ Machine.Address }}.ipxe", "default-ipxe.tmpl"),
        )
    }

    #[test]
    fn test_parse_definition_payload() {
        let payload = r#"{
            "Name": "ubuntu-16.04-install",
            "OS": {
                "Name": "ubuntu-16.04",
                "IsoFile": "ubuntu-16.04-server-amd64.iso",
                "IsoSha256": "abc123",
                "Files": [
                    { "URL": "http://example.com/firmware.tar.gz", "Name": "firmware.tar.gz" }
                ]
            },
            "Kernel": "install/netboot/ubuntu-installer/amd64/linux",
            "Initrds": ["install/netboot/ubuntu-installer/amd64/initrd.gz"],
            "BootParams": "url={{ Machine.Url }}/seed",
            "RequiredParams": ["dns-domain"],
            "Templates": [
                {
                    "Name": "pxelinux",
                    "Path": "pxelinux.cfg/{{ Machine.HexAddress }}",
                    "UUID": "default-pxelinux.tmpl"
                },
                {
                    "Name": "elilo",
                    "Path": "{{ Machine.HexAddress }}.conf",
                    "UUID": "default-elilo.tmpl"
                }
            ]
        }"#;

        let env: BootEnv = serde_json::from_str(payload).unwrap();

        assert_eq!(env.name, "ubuntu-16.04-install");
        assert_eq!(env.os.iso_file.as_deref(), Some("ubuntu-16.04-server-amd64.iso"));
        assert_eq!(env.os.files[0].url, "http://example.com/firmware.tar.gz");
        assert_eq!(env.templates[0].uuid, "default-pxelinux.tmpl");
        assert_eq!(env.required_params, vec!["dns-domain"]);
        assert_eq!(env.tenant_id, 0);
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let payload = r#"{
            "Name": "discovery",
            "OS": {"Name": "discovery", "IsoFile": ""},
            "Kernel": "",
            "BootParams": ""
        }"#;
        let env: BootEnv = serde_json::from_str(payload).unwrap();

        assert!(env.kernel.is_none());
        assert!(env.boot_params.is_none());
        assert!(env.os.iso_file.is_none());
    }

    #[test]
    fn test_install_segment() {
        let env = ipxe_env();
        assert_eq!(env.install_segment(), "ubuntu-16.04/install");

        let discovery = BootEnv::new("discovery", OsInfo::new("discovery"));
        assert_eq!(discovery.install_segment(), "discovery");
    }

    #[test]
    fn test_is_install() {
        assert!(ipxe_env().is_install());
        assert!(!BootEnv::new("local", OsInfo::new("local")).is_install());
    }

    #[test]
    fn test_validate_requires_boot_support() {
        assert!(ipxe_env().validate().is_ok());

        let pxelinux_only = BootEnv::new("centos-7-install", OsInfo::new("centos-7"))
            .with_template(TemplateInfo::new("pxelinux", "pxelinux.cfg/x", "p.tmpl"));
        assert!(matches!(
            pxelinux_only.validate(),
            Err(CrdError::IncompleteBootSupport(name)) if name == "centos-7-install"
        ));

        let legacy = pxelinux_only
            .clone()
            .with_template(TemplateInfo::new("elilo", "x.conf", "e.tmpl"));
        assert!(legacy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_incomplete_template() {
        let env = ipxe_env().with_template(TemplateInfo::new("pxelinux", "", "p.tmpl"));

        match env.validate() {
            Err(CrdError::IllegalTemplate { index, name, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(name, "pxelinux");
            }
            other => panic!("expected IllegalTemplate, got {:?}", other),
        }
    }

    #[test]
    fn test_serialization_round_trip_uses_wire_names() {
        let env = ipxe_env().with_kernel("linux").with_required_param("dns-domain");
        let json = serde_json::to_value(&env).unwrap();

        assert!(json.get("OS").is_some());
        assert_eq!(json["Templates"][0]["UUID"], "default-ipxe.tmpl");
        assert_eq!(json["Kernel"], "linux");

        let parsed: BootEnv = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, env);
    }
}
