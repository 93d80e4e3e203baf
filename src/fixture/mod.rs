pub mod config;
pub mod factory;
pub mod port;
pub mod scratch;
