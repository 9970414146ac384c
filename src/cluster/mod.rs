/// Cluster API access shared by all provisioners
pub mod api;
pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod kube_api;

pub use api::{ClusterApi, ClusterResource, ListOptions, ResourceKind};
pub use client::ClusterClient;
pub use kube_api::KubeClusterApi;
