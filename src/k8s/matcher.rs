use crate::k8s::model::ContainerKey;
use regex::Regex;
use std::sync::LazyLock;

static CONTAINER_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:[a-z0-9-]+://)?([0-9a-fA-F]{64})$").ok());

/// Turns a raw container ID into its canonical key.
///
/// Implementations must be pure: the index calls them from the reconciliation task
/// and lookups call them from any number of profiling workers.
pub trait IdentifierMatcher: Send + Sync {
    fn match_id(&self, raw: &str) -> Option<ContainerKey>;
}

/// Accepts 64-hex-digit IDs, optionally carrying a runtime prefix such as
/// `containerd://`, `docker://` or `cri-o://`. Keys are lowercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeIdMatcher;

impl IdentifierMatcher for RuntimeIdMatcher {
    fn match_id(&self, raw: &str) -> Option<ContainerKey> {
        let re = CONTAINER_ID.as_ref()?;
        let caps = re.captures(raw.trim())?;
        Some(ContainerKey::from_canonical(caps[1].to_ascii_lowercase()))
    }
}
