/// Secret provisioning; callers hand over plain strings and never pre-encode
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use super::ResourceProvisioner;
use crate::cluster::ClusterClient;
use crate::error::Error;
use crate::model::SecretValues;

const OPAQUE: &str = "Opaque";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: SecretValues,
}

pub struct SecretProvisioner {
    client: ClusterClient,
}

impl SecretProvisioner {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Decoded contents of a stored secret
    pub async fn get_data(&self, namespace: &str, name: &str) -> Result<SecretValues, Error> {
        let secret = self.get(namespace, name).await?;
        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, ByteString(bytes))| (key, String::from_utf8_lossy(&bytes).into_owned()))
            .collect())
    }
}

impl ResourceProvisioner for SecretProvisioner {
    type Spec = SecretSpec;
    type Resource = Secret;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    /// Values go into `data` as raw bytes; the wire form is base64.
    fn build(&self, spec: &SecretSpec) -> Result<Secret, Error> {
        let data = spec
            .data
            .iter()
            .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
            .collect();

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(spec.labels.clone()),
                ..ObjectMeta::default()
            },
            type_: Some(OPAQUE.to_string()),
            data: Some(data),
            ..Secret::default()
        })
    }
}
