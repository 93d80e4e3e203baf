//! Port expressions
//! ================
//!
//! | Expression            | Meaning                                       |
//! |-----------------------|-----------------------------------------------|
//! | `9200`                | exactly this port, availability not checked   |
//! | `?`                   | any free port the OS hands out                |
//! | `9200-9300`           | a free port from the inclusive range          |
//! | `9200,9201,9300-9310` | a free port from the union of the parts       |

use std::{collections::BTreeSet, fmt, net::TcpListener, str::FromStr};

use rand::seq::SliceRandom;

use crate::error::{FixtureError, FixtureResult};

/// How often `?` asks the OS for another ephemeral port when the one it got is
/// excluded.
const ANY_PORT_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSpec {
    Exact(u16),
    #[default]
    Any,
    Candidates(BTreeSet<u16>),
}

fn invalid(expression: &str) -> FixtureError {
    FixtureError::InvalidConfig {
        field: "port",
        reason: format!(
            "unknown format of ports: `{expression}`; expected an exact port, a range \
             \"4000-5000\", a comma-separated list \"4000,5000,6000-8000\" or \"?\""
        ),
    }
}

fn parse_port(s: &str, expression: &str) -> FixtureResult<u16> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid(expression)),
        Ok(port) => Ok(port),
    }
}

impl FromStr for PortSpec {
    type Err = FixtureError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let trimmed = expression.trim();
        if trimmed == "?" {
            return Ok(PortSpec::Any);
        }
        if !trimmed.contains([',', '-']) {
            return parse_port(trimmed, expression).map(PortSpec::Exact);
        }

        let mut ports = BTreeSet::new();
        for part in trimmed.split(',') {
            match part.split_once('-') {
                None => {
                    ports.insert(parse_port(part, expression)?);
                }
                Some((start, end)) => {
                    let start = parse_port(start, expression)?;
                    let end = parse_port(end, expression)?;
                    if end < start {
                        return Err(invalid(expression));
                    }
                    ports.extend(start..=end);
                }
            }
        }
        Ok(PortSpec::Candidates(ports))
    }
}

impl TryFrom<String> for PortSpec {
    type Error = FixtureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortSpec> for String {
    fn from(value: PortSpec) -> Self {
        value.to_string()
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::Exact(port)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Exact(port) => write!(f, "{port}"),
            PortSpec::Any => f.write_str("?"),
            PortSpec::Candidates(ports) => {
                // Collapse consecutive runs back into ranges.
                let mut parts = Vec::new();
                let mut iter = ports.iter().copied().peekable();
                while let Some(start) = iter.next() {
                    let mut end = start;
                    while iter.peek() == Some(&(end.wrapping_add(1))) && end < u16::MAX {
                        end = iter.next().unwrap_or(end);
                    }
                    parts.push(if start == end {
                        start.to_string()
                    } else {
                        format!("{start}-{end}")
                    });
                }
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// Whether nothing is listening on `port` on the loopback interface.
pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

fn ephemeral_port() -> FixtureResult<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| FixtureError::InvalidConfig {
        field: "port",
        reason: format!("failed to obtain an ephemeral port: {e}"),
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| FixtureError::InvalidConfig {
            field: "port",
            reason: format!("could not read local address: {e}"),
        })?
        .port();
    drop(listener);
    Ok(port)
}

impl PortSpec {
    /// Choose a concrete port that is not in `exclude`.
    ///
    /// An exact port is returned as is; everything else is picked at random
    /// among the candidates that can currently be bound.
    pub fn select(&self, exclude: &[u16]) -> FixtureResult<u16> {
        let port = match self {
            PortSpec::Exact(port) if exclude.contains(port) => {
                return Err(FixtureError::InvalidConfig {
                    field: "port",
                    reason: format!("port {port} is already taken by this fixture"),
                });
            }
            PortSpec::Exact(port) => *port,
            PortSpec::Any => (0..ANY_PORT_ATTEMPTS)
                .map(|_| ephemeral_port())
                .find(|p| !matches!(p, Ok(port) if exclude.contains(port)))
                .unwrap_or_else(|| {
                    Err(FixtureError::PortUnavailable {
                        spec: self.to_string(),
                    })
                })?,
            PortSpec::Candidates(ports) => {
                let mut candidates: Vec<u16> = ports
                    .iter()
                    .copied()
                    .filter(|p| !exclude.contains(p))
                    .collect();
                candidates.shuffle(&mut rand::thread_rng());
                candidates
                    .into_iter()
                    .find(|&p| port_is_free(p))
                    .ok_or_else(|| FixtureError::PortUnavailable {
                        spec: self.to_string(),
                    })?
            }
        };
        crate::debug!("Port expression `{self}` resolved to {port}");
        Ok(port)
    }
}
