/// Resource provisioners: one per kind, sharing a single create/get/update/delete/exists contract
pub mod config_map;
pub mod ingress;
pub mod namespace;
pub mod quantity;
pub mod secret;
pub mod service;
pub mod workload;

pub use config_map::{ConfigMapProvisioner, ConfigMapSpec};
pub use ingress::{IngressProvisioner, IngressSpec};
pub use namespace::{NamespaceProvisioner, NamespaceSpec};
pub use secret::{SecretProvisioner, SecretSpec};
pub use service::{ServiceProvisioner, ServiceSpec};
pub use workload::{WorkloadProvisioner, WorkloadSpec};

use async_trait::async_trait;
use k8s_openapi::Metadata;
use tracing::info;

use crate::cluster::client::object_key;
use crate::cluster::{ClusterClient, ClusterResource, ListOptions};
use crate::error::Error;
use crate::model::ProvisionedResourceRef;

/// Label every resource carries to tie it to its application.
pub const APP_LABEL: &str = "app";
/// Label naming the tool that owns a resource.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Create/get/update/delete/exists over one resource kind.
///
/// Implementors only describe how to turn their `Spec` into the desired
/// object; talking to the cluster is shared. `create` never masks
/// `AlreadyExists` and `get`/`delete` never mask `NotFound`: deciding what
/// those mean is the caller's business.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    type Spec: Send + Sync;
    type Resource: ClusterResource;

    fn client(&self) -> &ClusterClient;

    /// Desired object for `spec`
    fn build(&self, spec: &Self::Spec) -> Result<Self::Resource, Error>;

    /// Copy server-owned fields from the live object into the desired one
    /// before a replace. The default keeps `resourceVersion`.
    fn carry_over(&self, current: &Self::Resource, desired: &mut Self::Resource) {
        desired.metadata_mut().resource_version = current.metadata().resource_version.clone();
    }

    async fn create(&self, spec: &Self::Spec) -> Result<ProvisionedResourceRef, Error> {
        let object = self.build(spec)?;
        let created = self.client().create(&object).await?;
        let reference = reference_of(&created)?;
        info!("Created {}", reference);
        Ok(reference)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Self::Resource, Error> {
        self.client().get(namespace, name).await
    }

    /// Replace the live object with the one built from `spec`
    async fn update(&self, spec: &Self::Spec) -> Result<ProvisionedResourceRef, Error> {
        let mut desired = self.build(spec)?;
        let (namespace, name) = object_key(&desired)?;
        let current = self.get(&namespace, &name).await?;
        self.carry_over(&current, &mut desired);
        let updated = self.client().replace(&desired).await?;
        let reference = reference_of(&updated)?;
        info!("Updated {}", reference);
        Ok(reference)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.client()
            .delete::<Self::Resource>(namespace, name)
            .await?;
        info!(
            "Deleted {} {}/{}",
            <Self::Resource as ClusterResource>::RESOURCE_KIND,
            namespace,
            name
        );
        Ok(())
    }

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        match self.get(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Self::Resource>, Error> {
        self.client()
            .list(namespace, &ListOptions::default())
            .await
    }
}

/// Reference to a stored object. Namespaces reference themselves.
pub(crate) fn reference_of<K: ClusterResource>(object: &K) -> Result<ProvisionedResourceRef, Error> {
    let (namespace, name) = object_key(object)?;
    let namespace = if K::RESOURCE_KIND.is_namespaced() {
        namespace
    } else {
        name.clone()
    };
    Ok(ProvisionedResourceRef::new(K::RESOURCE_KIND, namespace, name))
}
