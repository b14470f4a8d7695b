//! Render context and template helpers
//!
//! Every template sees the same top-level variables:
//!
//! | Variable         | Value                                       |
//! |------------------|---------------------------------------------|
//! | `Machine`        | the machine being rendered for              |
//! | `Env`            | the boot environment definition             |
//! | `ProvisionerURL` | base URL of the provisioner file server     |
//! | `CommandURL`     | base URL of the command API                 |
//! | `TenantId`       | tenant the boot environment belongs to      |
//!
//! and a fixed set of helper functions: `bootParams()`, `parseUrl(segment,
//! url)`, `param(key)`, `pathFor(proto, partial)`, `joinInitrds(proto)` and
//! `installUrl()`.

use crate::config::RenderConfig;
use crate::paths::{PathResolver, Protocol};
use minijinja::value::Value;
use minijinja::{Environment, Error, ErrorKind, State};
use provisioner_crd::{BootEnv, Machine};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use url::Url;

/// Name the boot parameter template is registered under
pub const BOOT_PARAMS_TEMPLATE: &str = "bootparams";

/// Top-level variables forwarded when rendering the boot parameter template
const CONTEXT_KEYS: [&str; 5] = ["Machine", "Env", "ProvisionerURL", "CommandURL", "TenantId"];

/// Typed failure raised from inside a helper function
///
/// The template engine only carries its own error type, so helpers attach
/// one of these as the source and the pipeline digs it back out.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HelperError {
    #[error("no idea how to get URL part {segment} from {url}")]
    UnsupportedSegment { segment: String, url: String },

    #[error("cannot parse URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no such machine parameter {0}")]
    MissingParameter(String),

    #[error("unknown protocol {0}")]
    UnknownProtocol(String),
}

impl HelperError {
    /// Find a helper failure anywhere in an engine error's source chain
    pub fn find(err: &Error) -> Option<HelperError> {
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            if let Some(helper) = cause.downcast_ref::<HelperError>() {
                return Some(helper.clone());
            }
            source = cause.source();
        }
        None
    }
}

impl From<HelperError> for Error {
    fn from(err: HelperError) -> Self {
        Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err)
    }
}

/// Machine as seen by templates
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MachineView<'a> {
    pub name: &'a str,
    pub short_name: &'a str,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex_address: Option<String>,
    pub url: String,
    pub boot_env: &'a str,
    pub params: &'a HashMap<String, serde_json::Value>,
}

impl<'a> MachineView<'a> {
    pub fn new(machine: &'a Machine, provisioner_url: &str) -> Self {
        Self {
            name: &machine.name,
            short_name: machine.short_name(),
            uuid: machine.id().to_string(),
            address: machine.address.map(|addr| addr.to_string()),
            hex_address: machine.hex_address(),
            url: machine.url(provisioner_url),
            boot_env: &machine.boot_env,
            params: &machine.params,
        }
    }
}

/// Variables bound for one render of one machine
#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    #[serde(rename = "Machine")]
    pub machine: MachineView<'a>,

    #[serde(rename = "Env")]
    pub env: &'a BootEnv,

    #[serde(rename = "ProvisionerURL")]
    pub provisioner_url: &'a str,

    #[serde(rename = "CommandURL")]
    pub command_url: &'a str,

    #[serde(rename = "TenantId")]
    pub tenant_id: i64,
}

impl<'a> RenderContext<'a> {
    pub fn new(config: &'a RenderConfig, env: &'a BootEnv, machine: &'a Machine) -> Self {
        Self {
            machine: MachineView::new(machine, &config.provisioner_url),
            env,
            provisioner_url: &config.provisioner_url,
            command_url: &config.command_url,
            tenant_id: env.tenant_id,
        }
    }
}

/// Register the helper functions for one boot environment
pub(crate) fn register_helpers(
    env: &mut Environment<'static>,
    resolver: &PathResolver,
    initrds: &[String],
) {
    env.add_function("bootParams", boot_params);
    env.add_function("parseUrl", parse_url);
    env.add_function("param", param);

    let paths = resolver.clone();
    env.add_function("pathFor", move |proto: &str, partial: &str| -> Result<String, Error> {
        Ok(paths.path_for(protocol(proto)?, partial))
    });

    let paths = resolver.clone();
    let initrds = initrds.to_vec();
    env.add_function("joinInitrds", move |proto: &str| -> Result<String, Error> {
        Ok(paths.join_paths(protocol(proto)?, &initrds))
    });

    let paths = resolver.clone();
    env.add_function("installUrl", move || -> Result<String, Error> { Ok(paths.install_url()) });
}

fn protocol(tag: &str) -> Result<Protocol, Error> {
    tag.parse::<Protocol>()
        .map_err(|_| HelperError::UnknownProtocol(tag.to_string()).into())
}

/// Render the boot parameter template against the caller's variables
///
/// Yields an empty string when the environment has no boot parameters.
fn boot_params(state: &State) -> Result<String, Error> {
    let template = match state.env().get_template(BOOT_PARAMS_TEMPLATE) {
        Ok(template) => template,
        Err(err) if err.kind() == ErrorKind::TemplateNotFound => return Ok(String::new()),
        Err(err) => return Err(err),
    };

    let ctx: BTreeMap<&str, Value> = CONTEXT_KEYS
        .iter()
        .filter_map(|key| state.lookup(key).map(|value| (*key, value)))
        .collect();
    template.render(ctx)
}

/// Extract `scheme`, `host` (with port, if explicit) or `path` from a URL
///
/// Relative references are accepted: `/a/b` has an empty scheme and host,
/// `//host/a` has a host but no scheme, and the empty string yields empty
/// segments.
fn parse_url(segment: &str, raw_url: &str) -> Result<String, Error> {
    if !matches!(segment, "scheme" | "host" | "path") {
        return Err(HelperError::UnsupportedSegment {
            segment: segment.to_string(),
            url: raw_url.to_string(),
        }
        .into());
    }

    let invalid = |e: url::ParseError| HelperError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    };
    let (scheme, parsed) = match Url::parse(raw_url) {
        Ok(parsed) => (parsed.scheme().to_string(), Some(parsed)),
        Err(url::ParseError::RelativeUrlWithoutBase) if raw_url.starts_with("//") => {
            let parsed = Url::parse(&format!("http:{}", raw_url)).map_err(invalid)?;
            (String::new(), Some(parsed))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => (String::new(), None),
        Err(e) => return Err(invalid(e).into()),
    };

    Ok(match (segment, parsed) {
        ("scheme", _) => scheme,
        ("host", Some(parsed)) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        },
        ("path", Some(parsed)) => parsed.path().to_string(),
        // Bare relative reference: no host, path runs up to any query or fragment
        ("path", None) => raw_url.split(['?', '#']).next().unwrap_or_default().to_string(),
        _ => String::new(),
    })
}

/// Look up a machine parameter, failing if it is absent
fn param(state: &State, key: &str) -> Result<Value, Error> {
    let missing = || Error::from(HelperError::MissingParameter(key.to_string()));

    let machine = state.lookup("Machine").ok_or_else(missing)?;
    let params = machine.get_attr("Params")?;
    if params.is_undefined() {
        return Err(missing());
    }

    let value = params.get_item(&Value::from(key))?;
    if value.is_undefined() {
        return Err(missing());
    }
    Ok(value)
}
