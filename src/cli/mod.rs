//! CLI-specific functionality for the orchestrator
//!
//! This module contains all CLI-related code including argument parsing
//! and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, Commands, ExecConfig, ExecutionMode, LifecycleAction, LifecycleConfig};
pub use config::ConfigDiscovery;
