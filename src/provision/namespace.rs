/// Namespace provisioning
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{ResourceProvisioner, MANAGED_BY_LABEL};
use crate::cluster::{ClusterClient, ListOptions};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Creates the namespace an application lives in
pub struct NamespaceProvisioner {
    client: ClusterClient,
    managed_by: String,
}

impl NamespaceProvisioner {
    pub fn new(client: ClusterClient, managed_by: impl Into<String>) -> Self {
        Self {
            client,
            managed_by: managed_by.into(),
        }
    }

    /// All namespaces carrying our `managed-by` label
    pub async fn list_managed(&self) -> Result<Vec<Namespace>, Error> {
        let selector = format!("{}={}", MANAGED_BY_LABEL, self.managed_by);
        self.client
            .list("", &ListOptions::default().labels(selector))
            .await
    }
}

impl ResourceProvisioner for NamespaceProvisioner {
    type Spec = NamespaceSpec;
    type Resource = Namespace;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    fn build(&self, spec: &NamespaceSpec) -> Result<Namespace, Error> {
        let mut labels = spec.labels.clone();
        labels.insert(MANAGED_BY_LABEL.to_string(), self.managed_by.clone());

        Ok(Namespace {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        })
    }
}
