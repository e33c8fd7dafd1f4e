//! Command implementations for the fstriage binary

pub mod config;
pub mod mounts;
pub mod output;
pub mod scan;
pub mod stats;
