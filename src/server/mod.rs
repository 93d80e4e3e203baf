pub mod dialect;
pub mod executor;
pub mod handle;
pub mod ipc;
pub mod passthrough;
pub mod process;
pub mod types;
pub mod version;
