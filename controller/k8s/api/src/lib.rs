#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster;
pub mod exposure;

pub use self::cluster::KubeCluster;
pub use k8s_openapi::api::{
    self,
    apps::v1::Deployment,
    core::v1::Service,
    networking::v1::Ingress,
};
pub use kube::{
    api::{Api, DeleteParams, ObjectMeta, PostParams, ResourceExt},
    Client, Error,
};
