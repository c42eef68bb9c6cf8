use crate::{exposure, Api, Client, DeleteParams, Deployment, Ingress, PostParams, Service};
use ekspose_controller_core::{
    ApiError, ClusterApi, IngressSpec, ServiceSpec, WorkloadSnapshot, CONTROLLER_NAME,
};

/// A [`ClusterApi`] backed by the Kubernetes API server.
///
/// The client is cheap to clone; one instance is shared by every worker.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadSnapshot, ApiError> {
        let api = Api::<Deployment>::namespaced(self.client.clone(), namespace);
        let deployment = api.get(name).await.map_err(api_error)?;
        exposure::workload(&deployment).map_err(ApiError::Other)
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceSpec, ApiError> {
        let api = Api::<Service>::namespaced(self.client.clone(), &spec.namespace);
        let created = api
            .create(&Self::post_params(), &exposure::service(spec))
            .await
            .map_err(api_error)?;
        Ok(exposure::service_spec(&created))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSpec, ApiError> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        let service = api.get(name).await.map_err(api_error)?;
        Ok(exposure::service_spec(&service))
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_ingress(&self, spec: &IngressSpec) -> Result<IngressSpec, ApiError> {
        let api = Api::<Ingress>::namespaced(self.client.clone(), &spec.namespace);
        let created = api
            .create(&Self::post_params(), &exposure::ingress(spec))
            .await
            .map_err(api_error)?;
        Ok(exposure::ingress_spec(&created))
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<IngressSpec, ApiError> {
        let api = Api::<Ingress>::namespaced(self.client.clone(), namespace);
        let ingress = api.get(name).await.map_err(api_error)?;
        Ok(exposure::ingress_spec(&ingress))
    }
}

fn api_error(error: kube::Error) -> ApiError {
    if let kube::Error::Api(ref rsp) = error {
        if let Some(error) = classify(rsp.code, &rsp.reason) {
            return error;
        }
    }
    ApiError::Other(error.into())
}

fn classify(code: u16, reason: &str) -> Option<ApiError> {
    match (code, reason) {
        (404, _) => Some(ApiError::NotFound),
        (409, "AlreadyExists") => Some(ApiError::AlreadyExists),
        _ => None,
    }
}
