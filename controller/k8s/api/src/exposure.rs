//! Conversions between the controller's exposure specs and Kubernetes resources.

use crate::{Deployment, Ingress, ObjectMeta, ResourceExt, Service};
use anyhow::{anyhow, Result};
use ekspose_controller_core::{IngressSpec, ServicePort, ServiceSpec, WorkloadSnapshot};
use k8s_openapi::api::{core::v1 as corev1, networking::v1 as netv1};

/// Reads the parts of a `Deployment` that determine its exposure.
pub fn workload(deployment: &Deployment) -> Result<WorkloadSnapshot> {
    let namespace = deployment
        .namespace()
        .ok_or_else(|| anyhow!("Deployment must have a namespace"))?;
    let name = deployment
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("Deployment must have a name"))?;
    Ok(WorkloadSnapshot {
        namespace,
        name,
        labels: deployment.labels().clone(),
    })
}

pub fn service(spec: &ServiceSpec) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some(spec.namespace.clone()),
            name: Some(spec.name.clone()),
            ..Default::default()
        },
        spec: Some(corev1::ServiceSpec {
            selector: Some(spec.selector.clone()),
            ports: Some(
                spec.ports
                    .iter()
                    .map(|port| corev1::ServicePort {
                        name: port.name.clone(),
                        port: port.port.into(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service_spec(service: &Service) -> ServiceSpec {
    let spec = service.spec.as_ref();
    ServiceSpec {
        namespace: service.namespace().unwrap_or_default(),
        name: service.name_any(),
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
        ports: spec
            .and_then(|s| s.ports.as_ref())
            .into_iter()
            .flatten()
            .map(|port| ServicePort {
                name: port.name.clone(),
                // Out-of-range ports can only come from an invalid object; they never match.
                port: u16::try_from(port.port).unwrap_or_default(),
            })
            .collect(),
    }
}

pub fn ingress(spec: &IngressSpec) -> Ingress {
    let path = netv1::HTTPIngressPath {
        path: Some(spec.path.clone()),
        path_type: spec.path_type.to_string(),
        backend: netv1::IngressBackend {
            service: Some(netv1::IngressServiceBackend {
                name: spec.backend_service.clone(),
                port: Some(netv1::ServiceBackendPort {
                    number: Some(spec.backend_port.into()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    };

    Ingress {
        metadata: ObjectMeta {
            namespace: Some(spec.namespace.clone()),
            name: Some(spec.name.clone()),
            annotations: Some(spec.annotations.clone()),
            ..Default::default()
        },
        spec: Some(netv1::IngressSpec {
            rules: Some(vec![netv1::IngressRule {
                http: Some(netv1::HTTPIngressRuleValue { paths: vec![path] }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Reads an `Ingress` as an exposure spec.
///
/// Only the first path of the first rule is considered. Ingresses that do not route a path to a
/// service by port number produce a spec with an empty backend, which matches no exposure.
pub fn ingress_spec(ingress: &Ingress) -> IngressSpec {
    let path = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .and_then(|rules| rules.first())
        .and_then(|rule| rule.http.as_ref())
        .and_then(|http| http.paths.first());
    let backend = path.and_then(|p| p.backend.service.as_ref());

    IngressSpec {
        namespace: ingress.namespace().unwrap_or_default(),
        name: ingress.name_any(),
        annotations: ingress.annotations().clone(),
        path: path.and_then(|p| p.path.clone()).unwrap_or_default(),
        path_type: path
            .and_then(|p| p.path_type.parse().ok())
            .unwrap_or(ekspose_controller_core::PathType::ImplementationSpecific),
        backend_service: backend.map(|b| b.name.clone()).unwrap_or_default(),
        backend_port: backend
            .and_then(|b| b.port.as_ref())
            .and_then(|port| port.number)
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or_default(),
    }
}
