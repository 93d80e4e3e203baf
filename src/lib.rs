//! es_fixture – throwaway Elasticsearch servers for Rust test suites
//! =================================================================
//!
//! ## What you get
//! - **Version aware launch** – The server binary is asked for its version
//!   (`-Vv`) once, and the matching command line dialect is picked from a small
//!   table (`transport.tcp.port` before 7.0, `transport.port` after).
//! - **Readiness polling** – [`ProcessExecutor::start`] blocks until
//!   `GET http://{host}:{port}/` answers with a success status, or fails with
//!   [`FixtureError::StartupTimeout`] after killing the process.
//! - **Guaranteed cleanup** – Fixtures stop the server and delete their
//!   scratch directories on `Drop`, whether the test passed, failed or
//!   panicked.
//! - **Shared servers** – [`PassthroughHandle`] stands in for a server somebody
//!   else started, behind the same [`ServerHandle`] trait.
//!
//! ---
//!
//! ```rust,no_run
//! use es_fixture::*;
//!
//! fn main() -> FixtureResult<()> {
//!     let mut proc = ElasticsearchProc::builder()
//!         .name("search_tests")
//!         .build()
//!         .start()?;
//!
//!     let client = ClientFixture::connect(&mut proc)?;
//!     let health = client.cluster_health()?;
//!     println!("cluster {} is {}", health.cluster_name, health.status);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## How It Works
//!
//! ```text
//! Your test
//!     │
//!     ├─→ ElasticsearchProc     (config precedence, ports, scratch dirs)
//!     │        ↓
//!     ├─→ ProcessExecutor       (version probe → dialect → spawn → poll)
//!     │        ↓
//!     └─→ ClientFixture         (SearchClient, wipes indices on drop)
//! ```
//!
//! | State       | Reached by                         | Leaves via                     |
//! |-------------|------------------------------------|--------------------------------|
//! | `Unstarted` | construction                       | `start()`                      |
//! | `Starting`  | process spawned                    | ready / timeout / early exit   |
//! | `Ready`     | health check succeeded             | `stop()` / death in `running()`|
//! | `Stopped`   | `stop()`                           | –                              |
//! | `Failed`    | probe, dialect, spawn or readiness | –                              |

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn, Level};

pub mod client;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod server;

pub use client::*;
pub use error::{FixtureError, FixtureResult};
pub use fixture::{config::*, factory::*, port::*, scratch::*};
pub use logging::*;
pub use server::{
    dialect::*, executor::*, handle::*, ipc::http::HttpClient, passthrough::*, process::*,
    types::*, version::*,
};
