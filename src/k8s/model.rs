//! Wire and cache types for cluster entities and change events.
//!
//! The cluster state service and the change event channel share these JSON shapes.
//! A [`PodRecord`] is both the decoded pod and, once restricted to one container,
//! the value stored in the container index.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Canonical container identifier.
///
/// Only an [`IdentifierMatcher`](crate::k8s::matcher::IdentifierMatcher) should build
/// one; the cache never derives keys on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKey(String);

impl ContainerKey {
    #[must_use]
    pub const fn from_canonical(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub kind: String,
}

/// A pod as reported by the cluster state service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl PodRecord {
    #[must_use]
    pub fn is_on_node(&self, node_name: &str) -> bool {
        self.node_name == node_name
    }

    /// Copy of this pod whose container list holds only `container`.
    #[must_use]
    pub fn restricted_to(&self, container: &Container) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            node_name: self.node_name.clone(),
            containers: vec![container.clone()],
            ips: self.ips.clone(),
            owner: self.owner.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub cluster_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_pod_owner: Option<Owner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

/// Envelope around one cluster entity. Only pods feed the container index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
}

impl Entity {
    #[must_use]
    pub const fn pod(pod: PodRecord) -> Self {
        Self {
            pod: Some(pod),
            service: None,
            node: None,
        }
    }
}

/// Body of `GET /api/v1/k8s/pods?node=<node>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateResponse {
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// One message from the change event channel, before variant selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChangeEvent {
    #[serde(rename = "Modified", default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Entity>,
    #[serde(rename = "Deleted", default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Entity>,
    #[serde(rename = "Refresh", default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Modified(Entity),
    Deleted(Entity),
    /// Upstream asks for a full resync
    Refresh,
}

impl ChangeEvent {
    /// Decode a channel payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or carries no variant.
    pub fn from_payload(payload: &str) -> Result<Self> {
        let raw: RawChangeEvent = serde_json::from_str(payload)?;
        Self::try_from(raw)
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
            Self::Refresh => "refresh",
        }
    }
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
    type Error = Error;

    // Modified wins over Deleted, which wins over Refresh
    fn try_from(raw: RawChangeEvent) -> Result<Self> {
        if let Some(entity) = raw.modified {
            return Ok(Self::Modified(entity));
        }
        if let Some(entity) = raw.deleted {
            return Ok(Self::Deleted(entity));
        }
        if raw.refresh == Some(true) {
            return Ok(Self::Refresh);
        }
        Err(Error::Custom("change event carries no variant".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";

    fn pod() -> PodRecord {
        PodRecord {
            name: "web-1".to_string(),
            namespace: "default".to_string(),
            node_name: "node-A".to_string(),
            containers: vec![
                Container {
                    id: ID.to_string(),
                    name: "app".to_string(),
                },
                Container {
                    id: "other".to_string(),
                    name: "sidecar".to_string(),
                },
            ],
            ips: vec!["10.0.0.5".to_string()],
            owner: Some(Owner {
                name: "web".to_string(),
                kind: "ReplicaSet".to_string(),
            }),
        }
    }

    #[test]
    fn test_decode_state_response() {
        let body = format!(
            r#"{{"entities":[{{"pod":{{"name":"web-1","namespace":"default","node_name":"node-A",
            "containers":[{{"id":"{ID}","name":"app"}}],"ips":["10.0.0.5"]}}}}]}}"#
        );
        let state: StateResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(state.entities.len(), 1);
        let pod = state.entities[0].pod.as_ref().unwrap();
        assert_eq!(pod.name, "web-1");
        assert_eq!(pod.containers[0].name, "app");
        assert!(pod.owner.is_none());
    }

    #[test]
    fn test_restricted_to_keeps_identity() {
        let pod = pod();
        let restricted = pod.restricted_to(&pod.containers[1]);
        assert_eq!(restricted.containers.len(), 1);
        assert_eq!(restricted.containers[0].name, "sidecar");
        assert_eq!(restricted.name, pod.name);
        assert_eq!(restricted.owner, pod.owner);
        assert_eq!(restricted.ips, pod.ips);
    }

    #[test]
    fn test_change_event_variants() {
        let modified = serde_json::to_string(&RawChangeEvent {
            modified: Some(Entity::pod(pod())),
            ..RawChangeEvent::default()
        })
        .unwrap();
        assert!(matches!(
            ChangeEvent::from_payload(&modified).unwrap(),
            ChangeEvent::Modified(_)
        ));

        let deleted = serde_json::to_string(&RawChangeEvent {
            deleted: Some(Entity::pod(pod())),
            ..RawChangeEvent::default()
        })
        .unwrap();
        assert!(matches!(
            ChangeEvent::from_payload(&deleted).unwrap(),
            ChangeEvent::Deleted(_)
        ));

        assert_eq!(
            ChangeEvent::from_payload(r#"{"Refresh":true}"#).unwrap(),
            ChangeEvent::Refresh
        );
    }

    #[test]
    fn test_change_event_without_variant_is_rejected() {
        assert!(ChangeEvent::from_payload("{}").is_err());
        assert!(ChangeEvent::from_payload(r#"{"Refresh":false}"#).is_err());
        assert!(ChangeEvent::from_payload("not json").is_err());
    }

    #[test]
    fn test_modified_takes_precedence() {
        let raw = RawChangeEvent {
            modified: Some(Entity::pod(pod())),
            deleted: Some(Entity::pod(pod())),
            refresh: Some(true),
        };
        assert_eq!(ChangeEvent::try_from(raw).unwrap().kind(), "modified");
    }
}
