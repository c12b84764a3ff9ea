pub mod cache_manager;
pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod logging;
pub mod profiler;
