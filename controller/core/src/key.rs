use std::{fmt, str::FromStr};

/// Identifies a namespaced workload on the work queue.
///
/// Keys are built once, when an event is observed, and display as `namespace/name`. Two events
/// for the same object always produce equal keys, which is what lets the queue deduplicate them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem {
    namespace: String,
    name: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("resource has no namespace")]
    MissingNamespace,

    #[error("resource has no name")]
    MissingName,

    #[error("invalid segment {0:?}: must not contain '/'")]
    InvalidSegment(String),

    #[error("unexpected key format {0:?}: expected namespace/name")]
    Format(String),
}

// === impl WorkItem ===

impl WorkItem {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, KeyError> {
        let namespace = namespace.into();
        let name = name.into();
        if namespace.is_empty() {
            return Err(KeyError::MissingNamespace);
        }
        if name.is_empty() {
            return Err(KeyError::MissingName);
        }
        for segment in [&namespace, &name] {
            if segment.contains('/') {
                return Err(KeyError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { namespace, name })
    }

    /// Builds a key from optional metadata, as found on a resource's `ObjectMeta`.
    pub fn from_meta(namespace: Option<&str>, name: Option<&str>) -> Result<Self, KeyError> {
        let namespace = namespace.ok_or(KeyError::MissingNamespace)?;
        let name = name.ok_or(KeyError::MissingName)?;
        Self::new(namespace, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for WorkItem {
    type Err = KeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key.split_once('/') {
            Some((namespace, name)) if !name.contains('/') => Self::new(namespace, name),
            _ => Err(KeyError::Format(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips() {
        let names = [
            ("ns1", "web"),
            ("default", "a"),
            ("kube-system", "coredns"),
            ("team-0", "api.v2-canary"),
            ("x", "9"),
        ];
        for (ns, name) in names {
            let key = WorkItem::new(ns, name).expect("valid key");
            let parsed = key.to_string().parse::<WorkItem>().expect("must parse");
            assert_eq!(parsed, key);
            assert_eq!((parsed.namespace(), parsed.name()), (ns, name));
        }
    }

    #[test]
    fn displays_as_namespace_slash_name() {
        let key = WorkItem::new("ns1", "web").unwrap();
        assert_eq!(key.to_string(), "ns1/web");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(
            "web".parse::<WorkItem>(),
            Err(KeyError::Format("web".to_string()))
        );
        assert_eq!(
            "a/b/c".parse::<WorkItem>(),
            Err(KeyError::Format("a/b/c".to_string()))
        );
        assert_eq!("/web".parse::<WorkItem>(), Err(KeyError::MissingNamespace));
        assert_eq!("ns1/".parse::<WorkItem>(), Err(KeyError::MissingName));
    }

    #[test]
    fn rejects_missing_metadata() {
        assert_eq!(
            WorkItem::from_meta(None, Some("web")),
            Err(KeyError::MissingNamespace)
        );
        assert_eq!(
            WorkItem::from_meta(Some("ns1"), None),
            Err(KeyError::MissingName)
        );
        assert_eq!(
            WorkItem::new("ns/1", "web"),
            Err(KeyError::InvalidSegment("ns/1".to_string()))
        );
    }
}
