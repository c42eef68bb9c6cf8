//! The exposure objects derived from a workload.
//!
//! Every workload is exposed the same way: a `Service` named after the workload selecting its
//! labels on port 80, and an `Ingress` routing the `/<name>` prefix to that service.

use crate::WorkloadSnapshot;
use std::collections::BTreeMap;

pub const HTTP_PORT: u16 = 80;
pub const HTTP_PORT_NAME: &str = "http";
pub const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSpec {
    pub namespace: String,
    pub name: String,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathType {
    Prefix,
    Exact,
    ImplementationSpecific,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressSpec {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub path: String,
    pub path_type: PathType,
    pub backend_service: String,
    pub backend_port: u16,
}

/// The exposure computed for a single workload. Never stored; recomputed on every sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExposureSpec {
    pub service: ServiceSpec,
    pub ingress: IngressSpec,
}

// === impl ExposureSpec ===

impl ExposureSpec {
    pub fn for_workload(workload: &WorkloadSnapshot) -> Self {
        let service = ServiceSpec {
            namespace: workload.namespace.clone(),
            name: workload.name.clone(),
            selector: workload.labels.clone(),
            ports: vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port: HTTP_PORT,
            }],
        };

        let ingress = IngressSpec {
            namespace: service.namespace.clone(),
            name: service.name.clone(),
            annotations: [(REWRITE_TARGET_ANNOTATION.to_string(), "/".to_string())]
                .into_iter()
                .collect(),
            path: format!("/{}", service.name),
            path_type: PathType::Prefix,
            backend_service: service.name.clone(),
            backend_port: HTTP_PORT,
        };

        Self { service, ingress }
    }
}

// === impl ServiceSpec ===

impl ServiceSpec {
    /// Returns true if an existing service selects the same pods on the same ports.
    pub fn matches(&self, existing: &ServiceSpec) -> bool {
        self.selector == existing.selector && self.ports == existing.ports
    }
}

// === impl IngressSpec ===

impl IngressSpec {
    /// Returns true if an existing ingress routes the same path to the same backend.
    ///
    /// Annotations are not compared; they may be edited by users or other controllers.
    pub fn matches(&self, existing: &IngressSpec) -> bool {
        self.path == existing.path
            && self.path_type == existing.path_type
            && self.backend_service == existing.backend_service
            && self.backend_port == existing.backend_port
    }
}

impl std::fmt::Display for PathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix => "Prefix".fmt(f),
            Self::Exact => "Exact".fmt(f),
            Self::ImplementationSpecific => "ImplementationSpecific".fmt(f),
        }
    }
}

impl std::str::FromStr for PathType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Prefix" => Ok(Self::Prefix),
            "Exact" => Ok(Self::Exact),
            "ImplementationSpecific" => Ok(Self::ImplementationSpecific),
            s => Err(anyhow::anyhow!("invalid path type: {s}")),
        }
    }
}
