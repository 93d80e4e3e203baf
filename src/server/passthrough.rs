//! Stand-in for a server this crate does not manage, e.g. one started by CI
//! or a docker-compose file. Always reports itself as running; `start` and
//! `stop` do nothing.

use serde::{Deserialize, Serialize};

use crate::{error::FixtureResult, server::handle::ServerHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughHandle {
    host: String,
    port: u16,
}

impl PassthroughHandle {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl ServerHandle for PassthroughHandle {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn running(&mut self) -> bool {
        true
    }

    fn start(&mut self) -> FixtureResult<()> {
        crate::trace!("{}:{} is managed externally, not starting", self.host, self.port);
        Ok(())
    }

    fn stop(&mut self) -> FixtureResult<()> {
        crate::trace!("{}:{} is managed externally, not stopping", self.host, self.port);
        Ok(())
    }
}
