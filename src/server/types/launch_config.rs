//! Server Types – Launch Configuration
//! ===================================
//!
//! [`LaunchConfig`] is the fully resolved description of *one* server
//! instance: where the binary lives, which ports it binds, where it writes its
//! pid, logs and data, and how its cluster is named. Option precedence and
//! port selection happen before this struct is built (see
//! `crate::fixture`); the executor only consumes it.

use std::{collections::BTreeMap, path::PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INDEX_STORE_TYPE: &str = "mmapfs";
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Builder)]
#[builder(on(String, into), on(PathBuf, into))]
pub struct LaunchConfig {
    /// Path to the `elasticsearch` launcher script or binary.
    pub executable: PathBuf,

    /// Host the HTTP interface is reached on; also used for the readiness URL.
    #[builder(default = DEFAULT_HOST.to_string())]
    pub host: String,

    /// HTTP port (`http.port`).
    pub port: u16,

    /// Port for node-to-node traffic. Left to the server's default when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_port: Option<u16>,

    /// File the server writes its own pid into (`-p`).
    pub pidfile: PathBuf,

    /// `path.logs`
    pub logs_path: PathBuf,

    /// `path.data`
    pub works_path: PathBuf,

    /// `cluster.name`; see [`LaunchConfig::cluster_name`] for the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// `network.host`, the address the node publishes itself under.
    #[builder(default = DEFAULT_HOST.to_string())]
    pub network_publish_host: String,

    /// `index.store.type`
    #[builder(default = DEFAULT_INDEX_STORE_TYPE.to_string())]
    pub index_store_type: String,

    /// Extra environment for both the version probe and the server, e.g.
    /// `ES_JAVA_OPTS`.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl LaunchConfig {
    /// Cluster name passed to the server. Each node gets a cluster of its own
    /// unless told otherwise, so concurrently running fixtures never join each
    /// other.
    pub fn cluster_name(&self) -> String {
        match &self.cluster_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("elasticsearch_cluster_{}", self.port),
        }
    }

    /// Base URL polled for readiness.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
