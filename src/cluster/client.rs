/// Shared, authenticated handle to the cluster API
use std::sync::Arc;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use tracing::{debug, info};

use super::api::{ClusterApi, ClusterResource, ListOptions, ResourceKind};
use super::kube_api::KubeClusterApi;
use crate::config::ClusterSettings;
use crate::error::Error;

/// Cluster client handed to every provisioner.
///
/// Cloning is cheap and clones share the same underlying connection pool, so a
/// single client can serve any number of concurrent provisioning sequences.
#[derive(Clone)]
pub struct ClusterClient {
    api: Arc<dyn ClusterApi>,
}

impl ClusterClient {
    /// Wrap an existing [`ClusterApi`] implementation
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Resolve credentials and build a client.
    ///
    /// An explicit kubeconfig path in `settings` wins. Otherwise the in-cluster
    /// service account is tried first and the local kubeconfig is the fallback.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self, Error> {
        let options = KubeConfigOptions {
            context: settings.context.clone(),
            ..KubeConfigOptions::default()
        };

        let mut config = match &settings.kubeconfig {
            Some(path) => {
                info!("Using kubeconfig: {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::ClientInit(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| Error::ClientInit(format!("failed to load kubeconfig: {}", e)))?
            }
            None => match Config::incluster() {
                Ok(config) => {
                    info!("Using in-cluster service account credentials");
                    config
                }
                Err(incluster_err) => {
                    debug!("In-cluster credentials unavailable: {}", incluster_err);
                    let config = Config::from_kubeconfig(&options).await.map_err(|e| {
                        Error::ClientInit(format!(
                            "no in-cluster credentials ({}) and no usable kubeconfig ({})",
                            incluster_err, e
                        ))
                    })?;
                    info!("Using local kubeconfig credentials");
                    config
                }
            },
        };

        config.connect_timeout = Some(Duration::from_secs(settings.connect_timeout_secs));
        config.read_timeout = Some(Duration::from_secs(settings.request_timeout_secs));

        let client = kube::Client::try_from(config)
            .map_err(|e| Error::ClientInit(format!("failed to create client: {}", e)))?;

        Ok(Self::new(Arc::new(KubeClusterApi::new(client))))
    }

    /// Cheap liveness probe: list at most one namespace within `timeout`
    pub async fn health_check(&self, timeout: Duration) -> Result<(), Error> {
        let options = ListOptions::default().limit(1);
        let probe = self.api.list(ResourceKind::Namespace, "", &options);

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(_)) => {
                debug!("Cluster health check passed");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::ClusterUnreachable(e.to_string())),
            Err(_) => Err(Error::ClusterUnreachable(format!(
                "no answer within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Submit a new object; fails with `AlreadyExists` if the name is taken
    pub async fn create<K: ClusterResource>(&self, object: &K) -> Result<K, Error> {
        let (namespace, name) = object_key(object)?;
        let value = serde_json::to_value(object)?;
        debug!("Creating {} {}/{}", K::RESOURCE_KIND, namespace, name);
        let created = self.api.create(K::RESOURCE_KIND, &namespace, value).await?;
        Ok(serde_json::from_value(created)?)
    }

    pub async fn get<K: ClusterResource>(&self, namespace: &str, name: &str) -> Result<K, Error> {
        let value = self.api.get(K::RESOURCE_KIND, namespace, name).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Replace an existing object with `object` as a whole
    pub async fn replace<K: ClusterResource>(&self, object: &K) -> Result<K, Error> {
        let (namespace, name) = object_key(object)?;
        let value = serde_json::to_value(object)?;
        debug!("Replacing {} {}/{}", K::RESOURCE_KIND, namespace, name);
        let replaced = self.api.replace(K::RESOURCE_KIND, &namespace, &name, value).await?;
        Ok(serde_json::from_value(replaced)?)
    }

    pub async fn delete<K: ClusterResource>(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.api.delete(K::RESOURCE_KIND, namespace, name).await
    }

    pub async fn list<K: ClusterResource>(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<K>, Error> {
        self.api
            .list(K::RESOURCE_KIND, namespace, options)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Error::from))
            .collect()
    }
}

/// Namespace and name of an object about to be submitted.
///
/// For cluster-scoped kinds the namespace is empty.
pub(crate) fn object_key<K: ClusterResource>(object: &K) -> Result<(String, String), Error> {
    let meta = object.metadata();
    let name = meta
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidSpec(format!("{} object has no name", K::RESOURCE_KIND)))?;
    let namespace = if K::RESOURCE_KIND.is_namespaced() {
        meta.namespace
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                Error::InvalidSpec(format!("{} {} has no namespace", K::RESOURCE_KIND, name))
            })?
    } else {
        String::new()
    };
    Ok((namespace, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{FakeCluster, FakeFailure, Operation};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(namespace: Option<&str>, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: namespace.map(str::to_string),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn test_health_check_passes_against_responsive_cluster() {
        let fake = FakeCluster::new();
        let client = fake.client();

        tokio_test::assert_ok!(client.health_check(Duration::from_secs(1)).await);

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, Operation::List);
        assert_eq!(calls[0].kind, ResourceKind::Namespace);
    }

    #[tokio::test]
    async fn test_health_check_maps_errors_to_unreachable() {
        let fake = FakeCluster::new();
        fake.fail_always(Operation::List, ResourceKind::Namespace, FakeFailure::Transport);

        let err = fake
            .client()
            .health_check(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClusterUnreachable(_)));
    }

    #[tokio::test]
    async fn test_health_check_times_out() {
        let fake = FakeCluster::new();
        fake.hang(Operation::List, ResourceKind::Namespace);

        let err = fake
            .client()
            .health_check(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClusterUnreachable(_)));
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips_typed_object() {
        let fake = FakeCluster::new();
        let client = fake.client();

        client.create(&config_map(Some("shop"), "shop-config")).await.unwrap();
        let fetched: ConfigMap = client.get("shop", "shop-config").await.unwrap();

        assert_eq!(fetched.metadata.name.as_deref(), Some("shop-config"));
        assert!(fetched.metadata.resource_version.is_some());
    }

    #[tokio::test]
    async fn test_create_without_namespace_is_rejected_locally() {
        let fake = FakeCluster::new();

        let err = fake
            .client()
            .create(&config_map(None, "shop-config"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(fake.calls().is_empty());
    }
}
