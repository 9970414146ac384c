/// Workload (Deployment) provisioning
use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde_json::json;
use tracing::info;

use super::quantity::Bounds;
use super::{ResourceProvisioner, APP_LABEL};
use crate::cluster::{ClusterClient, ResourceKind};
use crate::error::Error;
use crate::model::{
    EnvOverride, ProvisionedResourceRef, ResourceSpec, DEFAULT_CONTAINER_PORT, DEFAULT_REPLICAS,
};

const PORT_NAME: &str = "http";
const PULL_ALWAYS: &str = "Always";
const RESTART_ALWAYS: &str = "Always";

/// Desired state of an application's Deployment.
///
/// Zero replicas, a zero port and empty quantities are replaced by the
/// defaults when the object is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub namespace: String,
    pub name: String,
    /// Application name; names the container and drives the `app` selector
    pub app: String,
    /// Full image reference
    pub image: String,
    pub replicas: u32,
    pub container_port: u16,
    pub resources: ResourceSpec,
    /// ConfigMap injected in bulk through `envFrom`
    pub config_map: Option<String>,
    /// Secret injected in bulk through `envFrom`, after the ConfigMap
    pub secret: Option<String>,
    /// Explicit overrides; these win over anything injected in bulk
    pub env: Vec<EnvOverride>,
}

pub struct WorkloadProvisioner {
    client: ClusterClient,
}

impl WorkloadProvisioner {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Change the declared replica count of an existing Deployment
    pub async fn scale(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<ProvisionedResourceRef, Error> {
        let replicas = replica_count(replicas)?;
        let mut deployment = self.get(namespace, name).await?;
        deployment.spec.get_or_insert_with(DeploymentSpec::default).replicas = Some(replicas);

        self.client.replace(&deployment).await?;
        info!("Scaled deployment {}/{} to {} replicas", namespace, name, replicas);
        Ok(ProvisionedResourceRef::new(ResourceKind::Deployment, namespace, name))
    }

    /// Roll the application container onto a new image
    pub async fn set_image(
        &self,
        namespace: &str,
        name: &str,
        image: &str,
    ) -> Result<ProvisionedResourceRef, Error> {
        if image.trim().is_empty() {
            return Err(Error::InvalidSpec("image is required".to_string()));
        }

        let mut deployment = self.get(namespace, name).await?;
        let container = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|pod| pod.containers.first_mut())
            .ok_or_else(|| {
                Error::InvalidSpec(format!("deployment {}/{} has no container", namespace, name))
            })?;
        container.image = Some(image.trim().to_string());

        self.client.replace(&deployment).await?;
        info!("Set image of deployment {}/{} to {}", namespace, name, image.trim());
        Ok(ProvisionedResourceRef::new(ResourceKind::Deployment, namespace, name))
    }
}

impl ResourceProvisioner for WorkloadProvisioner {
    type Spec = WorkloadSpec;
    type Resource = Deployment;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    fn build(&self, spec: &WorkloadSpec) -> Result<Deployment, Error> {
        if spec.image.trim().is_empty() {
            return Err(Error::InvalidSpec("image is required".to_string()));
        }

        let replicas = replica_count(if spec.replicas == 0 {
            DEFAULT_REPLICAS
        } else {
            spec.replicas
        })?;
        let container_port = if spec.container_port == 0 {
            DEFAULT_CONTAINER_PORT
        } else {
            spec.container_port
        };

        let resources = spec.resources.with_defaults();
        let cpu = Bounds::parse(
            "cpu_request",
            &resources.cpu_request,
            "cpu_limit",
            &resources.cpu_limit,
        )?;
        let memory = Bounds::parse(
            "memory_request",
            &resources.memory_request,
            "memory_limit",
            &resources.memory_limit,
        )?;

        let labels: BTreeMap<String, String> =
            [(APP_LABEL.to_string(), spec.app.clone())].into_iter().collect();

        let mut env_from = Vec::new();
        if let Some(config_map) = &spec.config_map {
            env_from.push(env_source("configMapRef", config_map)?);
        }
        if let Some(secret) = &spec.secret {
            env_from.push(env_source("secretRef", secret)?);
        }

        let env = merge_overrides(&spec.env);

        let container = Container {
            name: spec.app.clone(),
            image: Some(spec.image.trim().to_string()),
            image_pull_policy: Some(PULL_ALWAYS.to_string()),
            ports: Some(vec![ContainerPort {
                name: Some(PORT_NAME.to_string()),
                container_port: i32::from(container_port),
                protocol: Some("TCP".to_string()),
                ..ContainerPort::default()
            }]),
            env_from: (!env_from.is_empty()).then_some(env_from),
            env: (!env.is_empty()).then_some(env),
            resources: Some(ResourceRequirements {
                requests: Some(
                    [
                        ("cpu".to_string(), cpu.request.to_quantity()),
                        ("memory".to_string(), memory.request.to_quantity()),
                    ]
                    .into_iter()
                    .collect(),
                ),
                limits: Some(
                    [
                        ("cpu".to_string(), cpu.limit.to_quantity()),
                        ("memory".to_string(), memory.limit.to_quantity()),
                    ]
                    .into_iter()
                    .collect(),
                ),
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        };

        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some(RESTART_ALWAYS.to_string()),
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        })
    }
}

fn replica_count(replicas: u32) -> Result<i32, Error> {
    i32::try_from(replicas)
        .map_err(|_| Error::InvalidSpec(format!("replica count {} is out of range", replicas)))
}

/// `envFrom` entry referencing a ConfigMap or Secret by name.
///
/// Built through serde because the reference's `name` field is typed
/// differently across Kubernetes API versions.
fn env_source(reference: &str, name: &str) -> Result<EnvFromSource, Error> {
    Ok(serde_json::from_value(json!({ reference: { "name": name } }))?)
}

/// Collapse overrides by name, last value wins, first position kept.
fn merge_overrides(overrides: &[EnvOverride]) -> Vec<EnvVar> {
    let mut merged: Vec<EnvVar> = Vec::with_capacity(overrides.len());
    for entry in overrides {
        match merged.iter_mut().find(|var| var.name == entry.name) {
            Some(var) => var.value = Some(entry.value.clone()),
            None => merged.push(EnvVar {
                name: entry.name.clone(),
                value: Some(entry.value.clone()),
                ..EnvVar::default()
            }),
        }
    }
    merged
}
