//! Server – Command Line Dialects
//! ==============================
//!
//! Maps a [`ServerVersion`] to the command line understood by that release.
//! The dialects live in one ordered table; the entry with the highest
//! `min_version` not above the probed version wins.
//!
//! ```text
//! <executable> -p <pidfile>
//!     -E http.port=<port>
//!     -E transport.tcp.port=<port>   (5.x, 6.x)
//!     -E transport.port=<port>       (7.0 and later)
//!     -E path.logs=<dir> -E path.data=<dir>
//!     -E cluster.name=<name> -E network.host=<host>
//!     -E index.store.type=<type> -E xpack.security.enabled=false
//! ```

use crate::{
    error::{FixtureError, FixtureResult},
    server::{types::LaunchConfig, version::ServerVersion},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub min_version: ServerVersion,
    /// Setting key for the node-to-node port.
    pub transport_port_key: &'static str,
}

/// Ascending by `min_version`.
pub const DIALECTS: &[Dialect] = &[
    Dialect {
        min_version: ServerVersion::new(5, 0, 0),
        transport_port_key: "transport.tcp.port",
    },
    Dialect {
        min_version: ServerVersion::new(7, 0, 0),
        transport_port_key: "transport.port",
    },
];

pub const MINIMUM_SUPPORTED_VERSION: ServerVersion = ServerVersion::new(5, 0, 0);

/// Pick the dialect for `version`. Anything newer than the last entry uses the
/// last entry.
pub fn select_dialect(version: ServerVersion) -> FixtureResult<&'static Dialect> {
    DIALECTS
        .iter()
        .rev()
        .find(|d| d.min_version <= version)
        .ok_or(FixtureError::UnsupportedVersion {
            version,
            minimum: MINIMUM_SUPPORTED_VERSION,
        })
}

impl Dialect {
    pub fn args(&self, config: &LaunchConfig) -> Vec<String> {
        let mut settings = vec![format!("http.port={}", config.port)];
        if let Some(transport_port) = config.transport_port {
            settings.push(format!("{}={transport_port}", self.transport_port_key));
        }
        settings.extend([
            format!("path.logs={}", config.logs_path.display()),
            format!("path.data={}", config.works_path.display()),
            format!("cluster.name={}", config.cluster_name()),
            format!("network.host={}", config.network_publish_host),
            format!("index.store.type={}", config.index_store_type),
            "xpack.security.enabled=false".to_string(),
        ]);

        let mut args = vec!["-p".to_string(), config.pidfile.display().to_string()];
        for setting in settings {
            args.push("-E".to_string());
            args.push(setting);
        }
        args
    }
}

/// Full argument list (without the executable) for `version`.
pub fn build_args(version: ServerVersion, config: &LaunchConfig) -> FixtureResult<Vec<String>> {
    let dialect = select_dialect(version)?;
    crate::trace!(
        "Using dialect >= {} for version {version}",
        dialect.min_version
    );
    Ok(dialect.args(config))
}
