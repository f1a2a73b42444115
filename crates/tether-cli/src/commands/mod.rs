//! Subcommand implementations

pub mod info;
pub mod pool;
pub mod queue;
pub mod timer;
