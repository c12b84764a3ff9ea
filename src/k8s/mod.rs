pub mod cache;
pub mod matcher;
pub mod model;

/// User agent sent to the cluster state service - automatically uses the package version
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
