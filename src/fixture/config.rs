//! Fixture Configuration
//! =====================
//!
//! Every option can come from four places. The first one that sets a value
//! wins:
//!
//! 1. the value passed to the fixture builder,
//! 2. a `--elasticsearch-*` flag or its `ELASTICSEARCH_*` environment variable,
//! 3. a TOML config file (explicit path, else `$ES_FIXTURE_CONFIG`),
//! 4. the built-in default.
//!
//! ```toml
//! # es-fixture.toml
//! executable = "/opt/elasticsearch-7.17.0/bin/elasticsearch"
//! port = "9200-9300"
//! index_store_type = "fs"
//! timeout_secs = 120
//! ```
//!
//! Inside `cargo test` there is no command line of our own, so
//! [`FixtureOptions::from_env`] reads just the environment half of the clap
//! definitions.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bon::Builder;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{
    error::{FixtureError, FixtureResult},
    fixture::port::PortSpec,
    server::types::{DEFAULT_HOST, DEFAULT_INDEX_STORE_TYPE},
};

pub const DEFAULT_EXECUTABLE: &str = "/usr/share/elasticsearch/bin/elasticsearch";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Environment variable naming a config file when none is passed explicitly.
pub const CONFIG_ENV_VAR: &str = "ES_FIXTURE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, clap::Args, Builder)]
#[serde(default)]
pub struct FixtureOptions {
    /// Path to the elasticsearch executable
    #[arg(long = "elasticsearch-executable", env = "ELASTICSEARCH_EXECUTABLE")]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Host the instance listens on
    #[arg(long = "elasticsearch-host", env = "ELASTICSEARCH_HOST")]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// HTTP port: exact, range "a-b", list "a,b,c-d" or "?"
    #[arg(long = "elasticsearch-port", env = "ELASTICSEARCH_PORT")]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,

    /// Port used for communication between nodes; same syntax as the HTTP port
    #[arg(
        long = "elasticsearch-transport-tcp-port",
        env = "ELASTICSEARCH_TRANSPORT_TCP_PORT"
    )]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_tcp_port: Option<PortSpec>,

    /// Cluster the node joins; defaults to one cluster per node
    #[arg(long = "elasticsearch-cluster-name", env = "ELASTICSEARCH_CLUSTER_NAME")]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Host the node publishes itself under
    #[arg(
        long = "elasticsearch-network-publish-host",
        env = "ELASTICSEARCH_NETWORK_PUBLISH_HOST"
    )]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_publish_host: Option<String>,

    /// Value of index.store.type
    #[arg(
        long = "elasticsearch-index-store-type",
        env = "ELASTICSEARCH_INDEX_STORE_TYPE"
    )]
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_store_type: Option<String>,

    /// Seconds to wait for the server to become ready
    #[arg(long = "elasticsearch-timeout", env = "ELASTICSEARCH_TIMEOUT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Parses nothing but the environment.
#[derive(Parser)]
#[command(no_binary_name = true)]
struct EnvOnly {
    #[command(flatten)]
    options: FixtureOptions,
}

/// [`FixtureOptions`] with every default applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOptions {
    pub executable: PathBuf,
    pub host: String,
    pub port: PortSpec,
    pub transport_tcp_port: PortSpec,
    pub cluster_name: Option<String>,
    pub network_publish_host: String,
    pub index_store_type: String,
    pub timeout: Duration,
}

impl FixtureOptions {
    /// Options set through `ELASTICSEARCH_*` environment variables.
    pub fn from_env() -> FixtureResult<Self> {
        EnvOnly::try_parse_from(std::iter::empty::<String>())
            .map(|parsed| parsed.options)
            .map_err(|e| FixtureError::InvalidConfig {
                field: "environment",
                reason: e.to_string(),
            })
    }

    /// Load a TOML config file. A missing file is an error; use
    /// [`FixtureOptions::from_default_file`] for the optional lookup.
    pub fn from_file(path: &Path) -> FixtureResult<Self> {
        if !path.is_file() {
            return Err(FixtureError::file_system(
                "load config file",
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such config file"),
            ));
        }
        let options: Self = confy::load_path(path).map_err(|e| FixtureError::InvalidConfig {
            field: "config file",
            reason: format!("{}: {e}", path.display()),
        })?;
        crate::debug!("Loaded fixture options from {}", path.display());
        Ok(options)
    }

    /// The file named by `$ES_FIXTURE_CONFIG`, if that variable is set.
    pub fn from_default_file() -> FixtureResult<Option<Self>> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)).map(Some),
            _ => Ok(None),
        }
    }

    /// Field-wise: keep what `self` sets, take the rest from `fallback`.
    pub fn or(self, fallback: FixtureOptions) -> FixtureOptions {
        FixtureOptions {
            executable: self.executable.or(fallback.executable),
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            transport_tcp_port: self.transport_tcp_port.or(fallback.transport_tcp_port),
            cluster_name: self.cluster_name.or(fallback.cluster_name),
            network_publish_host: self.network_publish_host.or(fallback.network_publish_host),
            index_store_type: self.index_store_type.or(fallback.index_store_type),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
        }
    }

    /// Stack explicit options over the environment (when `read_env`) and the
    /// config file.
    pub fn layered(
        self,
        read_env: bool,
        config_file: Option<&Path>,
    ) -> FixtureResult<FixtureOptions> {
        let env = if read_env {
            Self::from_env()?
        } else {
            Self::default()
        };
        let file = match config_file {
            Some(path) => Self::from_file(path)?,
            None if read_env => Self::from_default_file()?.unwrap_or_default(),
            None => Self::default(),
        };
        Ok(self.or(env).or(file))
    }

    pub fn resolve(self) -> ResolvedOptions {
        ResolvedOptions {
            executable: self
                .executable
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or_default(),
            transport_tcp_port: self.transport_tcp_port.unwrap_or_default(),
            cluster_name: self.cluster_name.filter(|name| !name.is_empty()),
            network_publish_host: self
                .network_publish_host
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            index_store_type: self
                .index_store_type
                .unwrap_or_else(|| DEFAULT_INDEX_STORE_TYPE.to_string()),
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}
