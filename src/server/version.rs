//! Server – Version
//! ================
//!
//! The Elasticsearch command line changed between major releases, so the
//! launcher has to know which release it is about to start. The only reliable
//! source is the binary itself: `elasticsearch -Vv` prints a banner such as
//!
//! ```text
//! OpenJDK 64-Bit Server VM warning: Option UseConcMarkSweepGC was deprecated …
//! Version: 7.9.0, Build: default/tar/a479a2a/2020-08-11T21:36:48.204330Z, JVM: 11.0.2
//! ```
//!
//! * [`ServerVersion::from_banner`] – pure parser over that text.
//! * [`probe_version`] – runs the binary (killing it if it hangs) and parses
//!   what it printed.
//! * [`VersionCache`] – resolve-once slot that also remembers failures, so a
//!   broken binary is only invoked a single time per executor.

use std::{
    collections::BTreeMap,
    fmt,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

/// Flag that makes the server print its banner and exit.
pub const VERSION_FLAG: &str = "-Vv";

static BANNER_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Version: (?P<major>[0-9]+)\.(?P<minor>[0-9]+)\.(?P<patch>[0-9]+)")
        .expect("version pattern is valid")
});

/// `major.minor.patch` of an Elasticsearch release.
///
/// Ordering is lexicographic over the three components, in field order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first `Version: X.Y.Z` occurrence from free-form banner text.
    ///
    /// Lines before the match (JVM warnings, deprecation notices) and anything
    /// after the numeric triple (build hash, JVM version) are ignored.
    pub fn from_banner(banner: &str) -> Result<Self, VersionError> {
        let unrecognized = || VersionError::UnrecognizedVersion {
            output: banner.to_string(),
        };
        let caps = BANNER_VERSION.captures(banner).ok_or_else(unrecognized)?;
        let component = |name: &str| -> Result<u32, VersionError> {
            caps[name].parse::<u32>().map_err(|_| unrecognized())
        };
        Ok(Self::new(
            component("major")?,
            component("minor")?,
            component("patch")?,
        ))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ServerVersion {
    type Err = VersionError;

    /// Parses a bare `X.Y.Z` string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unrecognized = || VersionError::UnrecognizedVersion {
            output: s.to_string(),
        };
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, VersionError> {
            let part = parts.next().ok_or_else(unrecognized)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(unrecognized());
            }
            part.parse().map_err(|_| unrecognized())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(unrecognized());
        }
        Ok(version)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The configured path could not be executed at all.
    #[error("'{}' does not point to an Elasticsearch executable: {reason}", .path.display())]
    ExecutableNotFound { path: PathBuf, reason: String },

    #[error("Elasticsearch version is not recognized, it is probably not supported. Output is: {output}")]
    UnrecognizedVersion { output: String },

    /// `-Vv` was still running when the timeout expired; it has been killed.
    #[error("'{}' -Vv did not finish within {timeout:?}", .path.display())]
    VersionTimeout { path: PathBuf, timeout: Duration },
}

/// Run `<executable> -Vv` and parse its standard output.
///
/// `envs` is applied on top of the inherited environment, exactly as it will
/// be for the real server process. A binary still running after `timeout` is
/// killed and reported as [`VersionError::VersionTimeout`].
pub fn probe_version(
    executable: &Path,
    envs: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ServerVersion, VersionError> {
    crate::debug!("Probing version of {}", executable.display());
    let not_executable = |e: std::io::Error| VersionError::ExecutableNotFound {
        path: executable.to_path_buf(),
        reason: e.to_string(),
    };
    let mut child = Command::new(executable)
        .arg(VERSION_FLAG)
        .envs(envs)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(not_executable)?;

    // Drain stdout concurrently so a chatty JVM cannot block on a full pipe.
    let mut stdout = child.stdout.take();
    let reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            crate::warn!(
                "{} {VERSION_FLAG} still running after {timeout:?}; killing it",
                executable.display()
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(VersionError::VersionTimeout {
                path: executable.to_path_buf(),
                timeout,
            });
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(not_executable(e));
        }
    };
    let output = reader.join().unwrap_or_default();

    let banner = String::from_utf8_lossy(&output);
    if !status.success() {
        crate::warn!("{} {VERSION_FLAG} exited with {status}", executable.display());
    }
    let version = ServerVersion::from_banner(&banner)?;
    crate::info!("{} reports version {version}", executable.display());
    Ok(version)
}

/// Resolve-once storage for the server version.
///
/// Both outcomes are sticky: after the first attempt the resolver is never
/// called again, and a failure is replayed as the same error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionCache {
    #[default]
    Unresolved,
    Resolved(ServerVersion),
    Failed(VersionError),
}

impl VersionCache {
    pub fn get_or_resolve<F>(&mut self, resolve: F) -> Result<ServerVersion, VersionError>
    where
        F: FnOnce() -> Result<ServerVersion, VersionError>,
    {
        match self {
            VersionCache::Resolved(version) => Ok(*version),
            VersionCache::Failed(err) => Err(err.clone()),
            VersionCache::Unresolved => {
                let outcome = resolve();
                *self = match &outcome {
                    Ok(version) => VersionCache::Resolved(*version),
                    Err(err) => VersionCache::Failed(err.clone()),
                };
                outcome
            }
        }
    }

    pub fn resolved(&self) -> Option<ServerVersion> {
        match self {
            VersionCache::Resolved(version) => Some(*version),
            _ => None,
        }
    }
}
