/// Object-safe seam over the Kubernetes resource collections used by the provisioners
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// The six resource kinds an application is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Namespace,
    ConfigMap,
    Secret,
    Deployment,
    Service,
    Ingress,
}

impl ResourceKind {
    /// Namespaces are the only cluster-scoped kind handled here.
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for list calls.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<u32>,
    pub label_selector: Option<String>,
}

impl ListOptions {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

/// Raw access to resource collections.
///
/// Objects travel as JSON so the trait stays object-safe and can be shared as
/// `Arc<dyn ClusterApi>`. For cluster-scoped kinds the `namespace` argument is
/// ignored. Implementations must classify "already exists" and "not found"
/// into [`Error::AlreadyExists`] and [`Error::NotFound`].
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value)
        -> Result<Value, Error>;

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Value, Error>;

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value, Error>;

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error>;

    /// An empty `namespace` lists across all namespaces.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, Error>;
}

/// A typed Kubernetes object that maps onto one [`ResourceKind`].
pub trait ClusterResource:
    k8s_openapi::Metadata<Ty = ObjectMeta>
    + Serialize
    + DeserializeOwned
    + Clone
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
    const RESOURCE_KIND: ResourceKind;
}

impl ClusterResource for Namespace {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Namespace;
}

impl ClusterResource for ConfigMap {
    const RESOURCE_KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl ClusterResource for Secret {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Secret;
}

impl ClusterResource for Deployment {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Deployment;
}

impl ClusterResource for Service {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Service;
}

impl ClusterResource for Ingress {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Ingress;
}
