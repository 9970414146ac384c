/// Status and readiness: read-time projections of live cluster state
pub mod probe;

pub use probe::{probe_endpoint, ProbeOutcome};

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::networking::v1::Ingress;
use serde::Serialize;
use tracing::debug;

use crate::cluster::ClusterClient;
use crate::error::Error;
use crate::orchestrator::{CallContext, ResourceNames};
use crate::utils::polling::PollingConfig;

/// Replica counters of a Deployment at the moment it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    pub name: String,
    pub namespace: String,
    /// Currently declared replicas, which may differ from what was provisioned
    pub declared: i32,
    pub current: i32,
    pub ready: i32,
    pub available: i32,
    pub updated: i32,
    pub is_ready: bool,
    pub observed_at: DateTime<Utc>,
}

impl DeploymentStatus {
    pub fn from_deployment(deployment: &Deployment, observed_at: DateTime<Utc>) -> Self {
        let declared = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let status = deployment.status.clone().unwrap_or_default();
        let ready = status.ready_replicas.unwrap_or(0);

        Self {
            name: deployment.metadata.name.clone().unwrap_or_default(),
            namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
            declared,
            current: status.replicas.unwrap_or(0),
            ready,
            available: status.available_replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            is_ready: ready == declared,
            observed_at,
        }
    }
}

/// Externally reachable address of an ingress, from its first rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressEndpoint {
    pub scheme: String,
    pub host: String,
}

impl IngressEndpoint {
    pub fn from_ingress(ingress: &Ingress) -> Result<Self, Error> {
        let spec = ingress.spec.as_ref();
        let host = spec
            .and_then(|spec| spec.rules.as_ref())
            .and_then(|rules| rules.first())
            .and_then(|rule| rule.host.as_deref())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::NoRulesConfigured {
                namespace: ingress.metadata.namespace.clone().unwrap_or_default(),
                name: ingress.metadata.name.clone().unwrap_or_default(),
            })?;

        let has_tls = spec
            .and_then(|spec| spec.tls.as_ref())
            .is_some_and(|tls| !tls.is_empty());

        Ok(Self {
            scheme: if has_tls { "https" } else { "http" }.to_string(),
            host: host.to_string(),
        })
    }

    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// Aggregate view of one application.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatus {
    pub application: String,
    pub namespace: String,
    pub deployment: DeploymentStatus,
    /// `None` while the ingress is missing or has no host rule
    pub url: Option<String>,
    pub ready: bool,
}

/// Reads status on demand. Nothing is cached; every call hits the cluster.
#[derive(Clone)]
pub struct StatusResolver {
    client: ClusterClient,
}

impl StatusResolver {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    pub async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
        ctx: &CallContext,
    ) -> Result<DeploymentStatus, Error> {
        let deployment: Deployment = ctx.run(self.client.get(namespace, name)).await?;
        let status = DeploymentStatus::from_deployment(&deployment, Utc::now());
        debug!(
            "Deployment {}/{}: {}/{} ready",
            namespace, name, status.ready, status.declared
        );
        Ok(status)
    }

    pub async fn ingress_endpoint(
        &self,
        namespace: &str,
        name: &str,
        ctx: &CallContext,
    ) -> Result<IngressEndpoint, Error> {
        let ingress: Ingress = ctx.run(self.client.get(namespace, name)).await?;
        IngressEndpoint::from_ingress(&ingress)
    }

    /// `scheme://host` of the ingress' first rule
    pub async fn ingress_url(
        &self,
        namespace: &str,
        name: &str,
        ctx: &CallContext,
    ) -> Result<String, Error> {
        Ok(self.ingress_endpoint(namespace, name, ctx).await?.url())
    }

    /// Deployment status and URL of the application named `app`
    pub async fn application_status(
        &self,
        namespace: &str,
        app: &str,
        ctx: &CallContext,
    ) -> Result<ApplicationStatus, Error> {
        let names = ResourceNames::for_app(app);
        let deployment = self
            .deployment_status(namespace, &names.deployment, ctx)
            .await?;

        let url = match self.ingress_url(namespace, &names.ingress, ctx).await {
            Ok(url) => Some(url),
            Err(e @ (Error::NotFound { .. } | Error::NoRulesConfigured { .. })) => {
                debug!("No URL for {}: {}", app, e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(ApplicationStatus {
            application: app.to_string(),
            namespace: namespace.to_string(),
            ready: deployment.is_ready && url.is_some(),
            deployment,
            url,
        })
    }

    /// Re-read the deployment until it is ready or `polling` gives up.
    ///
    /// There is no watch: callers pick the interval.
    pub async fn wait_for_ready(
        &self,
        namespace: &str,
        name: &str,
        polling: &PollingConfig,
        ctx: &CallContext,
    ) -> Result<DeploymentStatus, Error> {
        let waiting = polling.poll(move || async move {
            let status = self.deployment_status(namespace, name, ctx).await?;
            Ok(status.is_ready.then_some(status))
        });
        ctx.run(waiting).await
    }
}
