//! Available OS summary
//!
//! Aggregates install environments into the set of OSes the provisioner
//! can install and a preferred default, for publishing to an external
//! inventory.

use crate::error::Result;
use async_trait::async_trait;
use provisioner_crd::BootEnv;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::info;

/// Attribute carrying the set of installable OSes
pub const AVAILABLE_OSES_ATTRIBUTE: &str = "provisioner-available-oses";

/// Attribute carrying the default OS
pub const DEFAULT_OS_ATTRIBUTE: &str = "provisioner-default-os";

/// Default OS value when no install environment exists
pub const NO_DEFAULT_OS: &str = "STRING";

/// Default-OS preference, lower is better
const PREFERRED_OSES: &[(&str, u32)] = &[
    ("centos-7.2.1511", 0),
    ("centos-7.1.1503", 1),
    ("ubuntu-14.04", 2),
    ("ubuntu-15.04", 3),
    ("debian-8", 4),
    ("centos-6.6", 5),
    ("debian-7", 6),
    ("redhat-6.5", 7),
    ("ubuntu-12.04", 8),
];

const UNRANKED: u32 = 999;

fn rank(os_name: &str) -> u32 {
    PREFERRED_OSES
        .iter()
        .find(|(name, _)| *name == os_name)
        .map(|(_, rank)| *rank)
        .unwrap_or(UNRANKED)
}

/// Installable OSes and the preferred default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsSummary {
    pub available: BTreeSet<String>,
    pub default_os: String,
}

impl OsSummary {
    /// Summarize install environments; others are ignored
    ///
    /// Ties keep the first environment seen.
    pub fn from_bootenvs<'a>(bootenvs: impl IntoIterator<Item = &'a BootEnv>) -> Self {
        let mut available = BTreeSet::new();
        let mut default_os = NO_DEFAULT_OS.to_string();
        let mut best = 1000;

        for env in bootenvs.into_iter().filter(|env| env.is_install()) {
            available.insert(env.os.name.clone());
            let rank = rank(&env.os.name);
            if rank < best {
                best = rank;
                default_os = env.os.name.clone();
            }
        }

        Self {
            available,
            default_os,
        }
    }

    /// Available OSes as a JSON object of `name: true`
    pub fn available_value(&self) -> Value {
        Value::Object(
            self.available
                .iter()
                .map(|name| (name.clone(), Value::Bool(true)))
                .collect::<Map<_, _>>(),
        )
    }
}

/// External inventory that accepts attribute values
#[async_trait]
pub trait AttributeSink: Send + Sync {
    async fn set_attribute(&self, name: &str, value: Value) -> Result<()>;

    /// Make pending attribute changes visible
    async fn commit(&self) -> Result<()> {
        Ok(())
    }
}

/// Push both OS attributes and commit
pub async fn publish_os_summary(sink: &dyn AttributeSink, summary: &OsSummary) -> Result<()> {
    sink.set_attribute(AVAILABLE_OSES_ATTRIBUTE, summary.available_value())
        .await?;
    sink.set_attribute(DEFAULT_OS_ATTRIBUTE, json!(summary.default_os))
        .await?;
    sink.commit().await?;

    info!(
        available = summary.available.len(),
        default_os = %summary.default_os,
        "Published OS summary"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner_crd::OsInfo;
    use std::sync::Mutex;

    fn install(os: &str) -> BootEnv {
        BootEnv::new(format!("{}-install", os), OsInfo::new(os))
    }

    #[test]
    fn test_prefers_ranked_os() {
        let envs = vec![
            install("ubuntu-16.04"),
            install("debian-8"),
            install("ubuntu-14.04"),
            BootEnv::new("local", OsInfo::new("centos-7.2.1511")),
        ];

        let summary = OsSummary::from_bootenvs(&envs);

        assert_eq!(summary.default_os, "ubuntu-14.04");
        assert_eq!(
            summary.available.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["debian-8", "ubuntu-14.04", "ubuntu-16.04"]
        );
    }

    #[test]
    fn test_unranked_os_still_wins_over_nothing() {
        let envs = vec![install("fedora-25"), install("ubuntu-16.04")];
        assert_eq!(OsSummary::from_bootenvs(&envs).default_os, "fedora-25");

        let none: Vec<BootEnv> = vec![BootEnv::new("discovery", OsInfo::new("discovery"))];
        let summary = OsSummary::from_bootenvs(&none);
        assert_eq!(summary.default_os, NO_DEFAULT_OS);
        assert!(summary.available.is_empty());
    }

    #[derive(Default)]
    struct RecordingSink {
        values: Mutex<Vec<(String, Value)>>,
        commits: Mutex<usize>,
    }

    #[async_trait]
    impl AttributeSink for RecordingSink {
        async fn set_attribute(&self, name: &str, value: Value) -> Result<()> {
            self.values.lock().unwrap().push((name.to_string(), value));
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            *self.commits.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_os_summary() {
        let sink = RecordingSink::default();
        let summary = OsSummary::from_bootenvs(&[install("debian-8")]);

        publish_os_summary(&sink, &summary).await.unwrap();

        let values = sink.values.lock().unwrap();
        assert_eq!(values[0], (AVAILABLE_OSES_ATTRIBUTE.to_string(), json!({"debian-8": true})));
        assert_eq!(values[1], (DEFAULT_OS_ATTRIBUTE.to_string(), json!("debian-8")));
        assert_eq!(*sink.commits.lock().unwrap(), 1);
    }
}
