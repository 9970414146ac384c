/// Launchpad - application provisioning for Kubernetes
///
/// Turns one `ApplicationSpec` into a namespace, ConfigMap, Secret, Deployment,
/// Service and Ingress, created in that order, and reports readiness and the
/// public URL afterwards.
pub mod cluster;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provision;
pub mod status;
pub mod utils;

pub use cluster::{ClusterApi, ClusterClient, ResourceKind};
pub use config::LaunchpadConfig;
pub use error::{Error, ErrorKind};
pub use model::{ApplicationSpec, EnvOverride, ProvisionedResourceRef, ResourceSpec, SecretValues};
pub use orchestrator::{
    CallContext, DeploymentOrchestrator, ProvisionResult, ProvisionState, ProvisionStep,
    TeardownOptions, TeardownReport,
};
pub use status::{ApplicationStatus, DeploymentStatus, IngressEndpoint, StatusResolver};
