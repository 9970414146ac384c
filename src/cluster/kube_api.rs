/// kube-rs backed implementation of [`ClusterApi`]
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::debug;

use super::api::{ClusterApi, ListOptions, ResourceKind};
use crate::error::Error;

/// Talks to the API server through a shared, already authenticated [`kube::Client`].
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let resource = api_resource(kind);
        match scope(kind, namespace) {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

/// Namespace a request is scoped to. Cluster-scoped kinds and an empty
/// namespace address every namespace.
fn scope(kind: ResourceKind, namespace: &str) -> Option<&str> {
    (kind.is_namespaced() && !namespace.is_empty()).then_some(namespace)
}

fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
        ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
    }
}

/// Map a kube error onto the library's error kinds.
pub(crate) fn classify(kind: ResourceKind, namespace: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            Error::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(response) if response.code == 404 => Error::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) => Error::Api {
            code: response.code,
            reason: response.reason,
            message: response.message,
        },
        other => Error::Transport(other.to_string()),
    }
}

fn object_name(object: &Value) -> String {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: Value,
    ) -> Result<Value, Error> {
        let name = object_name(&object);
        debug!("POST {} {}/{}", kind, namespace, name);

        let object: DynamicObject = serde_json::from_value(object)?;
        let created = self
            .api(kind, namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| classify(kind, namespace, &name, e))?;

        Ok(serde_json::to_value(created)?)
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Value, Error> {
        debug!("GET {} {}/{}", kind, namespace, name);

        let object = self
            .api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| classify(kind, namespace, name, e))?;

        Ok(serde_json::to_value(object)?)
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, Error> {
        debug!("PUT {} {}/{}", kind, namespace, name);

        let object: DynamicObject = serde_json::from_value(object)?;
        let replaced = self
            .api(kind, namespace)
            .replace(name, &PostParams::default(), &object)
            .await
            .map_err(|e| classify(kind, namespace, name, e))?;

        Ok(serde_json::to_value(replaced)?)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error> {
        debug!("DELETE {} {}/{}", kind, namespace, name);

        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(kind, namespace, name, e))?;

        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, Error> {
        debug!("LIST {} {}", kind, namespace);

        let mut params = ListParams::default();
        if let Some(limit) = options.limit {
            params = params.limit(limit);
        }
        if let Some(selector) = &options.label_selector {
            params = params.labels(selector);
        }

        let list = self
            .api(kind, namespace)
            .list(&params)
            .await
            .map_err(|e| classify(kind, namespace, "", e))?;

        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("simulated {}", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_already_exists() {
        let err = classify(
            ResourceKind::Service,
            "shop",
            "shop-service",
            api_error(409, "AlreadyExists"),
        );
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_classify_conflict_is_not_already_exists() {
        let err = classify(
            ResourceKind::Secret,
            "shop",
            "shop-secrets",
            api_error(409, "Conflict"),
        );
        assert!(matches!(err, Error::Api { code: 409, .. }));
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(
            ResourceKind::Ingress,
            "shop",
            "shop-ingress",
            api_error(404, "NotFound"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("shop/shop-ingress"));
    }

    #[test]
    fn test_empty_namespace_addresses_all_namespaces() {
        assert_eq!(scope(ResourceKind::Deployment, "shop"), Some("shop"));
        assert_eq!(scope(ResourceKind::Deployment, ""), None);
        assert_eq!(scope(ResourceKind::Namespace, "shop"), None);
    }

    #[test]
    fn test_object_name_reads_metadata() {
        let object = serde_json::json!({"metadata": {"name": "shop-config"}});
        assert_eq!(object_name(&object), "shop-config");
        assert_eq!(object_name(&serde_json::json!({})), "");
    }
}
