pub mod budget;
pub mod launch_config;

pub use budget::*;
pub use launch_config::*;
