/// ConfigMap provisioning for non-secret configuration
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::ResourceProvisioner;
use crate::cluster::ClusterClient;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMapSpec {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

pub struct ConfigMapProvisioner {
    client: ClusterClient,
}

impl ConfigMapProvisioner {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Plain key/value contents of a stored ConfigMap
    pub async fn get_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        let config_map = self.get(namespace, name).await?;
        Ok(config_map.data.unwrap_or_default())
    }
}

impl ResourceProvisioner for ConfigMapProvisioner {
    type Spec = ConfigMapSpec;
    type Resource = ConfigMap;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    fn build(&self, spec: &ConfigMapSpec) -> Result<ConfigMap, Error> {
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(spec.labels.clone()),
                ..ObjectMeta::default()
            },
            data: Some(spec.data.clone()),
            ..ConfigMap::default()
        })
    }
}
