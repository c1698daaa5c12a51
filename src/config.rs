//! Webhook configuration.
//!
//! Loaded once at startup from a JSON file and shared read-only with every
//! admission handler. The container templates are copied into patches as-is,
//! so they are validated here instead of per request.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Container;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listen address for the webhook server
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:4443";
/// Default cluster domain used by the namespace-scoping check
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
/// Default prefix for all management annotations
pub const DEFAULT_ANNOTATION_PREFIX: &str = "pmsm";

/// Errors raised while loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but is not usable
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Management port added to Services
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePortConfig {
    pub name: String,
    pub port: i32,
}

/// Configuration options for the admission webhook
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Listen address, `0.0.0.0:4443` when unset
    pub address: Option<String>,
    /// Cluster DNS domain, `cluster.local` when unset
    pub cluster_domain: Option<String>,
    /// Reject objects whose subject names a service in another namespace
    pub restrict_certificates_to_namespace: bool,
    pub service_port: ServicePortConfig,
    /// Sidecar proxy container template
    pub proxy: Container,
    /// Init container template that installs the iptables redirect
    pub iptables: Container,
    /// Prefix for the `name`, `status` and `ignore` annotations
    pub annotation_prefix: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate the configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&data)
    }

    /// Parse and validate the configuration from raw JSON
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the templates and port are usable in a patch
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, container) in [("proxy", &self.proxy), ("iptables", &self.iptables)] {
            if container.name.is_empty() {
                return Err(ConfigError::Invalid(format!("{field}.name must be set")));
            }
            if container.image.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Invalid(format!("{field}.image must be set")));
            }
        }

        if self.service_port.name.is_empty() {
            return Err(ConfigError::Invalid("servicePort.name must be set".into()));
        }
        if !(1..=65535).contains(&self.service_port.port) {
            return Err(ConfigError::Invalid(format!(
                "servicePort.port must be between 1 and 65535 (got {})",
                self.service_port.port
            )));
        }

        self.socket_addr()?;
        Ok(())
    }

    /// Listen address for the webhook server
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
        // ":4443" style addresses bind on all interfaces
        let address = match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        };
        address
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("address {address:?}: {e}")))
    }

    pub fn cluster_domain(&self) -> &str {
        match self.cluster_domain.as_deref() {
            Some(domain) if !domain.is_empty() => domain,
            _ => DEFAULT_CLUSTER_DOMAIN,
        }
    }

    /// Annotation keys derived from the configured prefix
    pub fn annotation_keys(&self) -> AnnotationKeys {
        let prefix = match self.annotation_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => DEFAULT_ANNOTATION_PREFIX,
        };
        AnnotationKeys::new(prefix)
    }
}

/// Management annotation keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationKeys {
    /// Subject identity checked by namespace scoping
    pub name: String,
    /// Idempotency marker
    pub status: String,
    /// Boolean override
    pub ignore: String,
}

impl AnnotationKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            name: format!("{prefix}/name"),
            status: format!("{prefix}/status"),
            ignore: format!("{prefix}/ignore"),
        }
    }
}
