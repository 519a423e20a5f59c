//! Utility modules for the migration tool.

pub mod exec;
