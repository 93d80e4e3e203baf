//! Server – Handle
//! ===============
//!
//! [`ServerHandle`] is the one capability every server reference offers,
//! whether this crate spawned the process ([`ProcessExecutor`]) or someone
//! else runs it ([`PassthroughHandle`]). Code that only needs *a* server, such
//! as [`ClientFixture`], takes `&mut dyn ServerHandle`.
//!
//! [`ProcessExecutor`]: crate::ProcessExecutor
//! [`PassthroughHandle`]: crate::PassthroughHandle
//! [`ClientFixture`]: crate::ClientFixture

use crate::error::FixtureResult;

pub trait ServerHandle: std::fmt::Debug + Send {
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host(), self.port())
    }

    /// Whether the server is believed to accept requests right now.
    ///
    /// Takes `&mut self` because a managed process that died is observed (and
    /// recorded) here.
    fn running(&mut self) -> bool;

    fn start(&mut self) -> FixtureResult<()>;

    fn stop(&mut self) -> FixtureResult<()>;
}
