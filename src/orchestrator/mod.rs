/// Deployment orchestration: the fixed six-step provisioning pipeline and its teardown
pub mod context;
pub mod plan;

pub use context::CallContext;
pub use plan::{ApplicationPlan, ResourceNames};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::cluster::{ClusterClient, ResourceKind};
use crate::config::ProvisioningSettings;
use crate::error::{Error, ErrorKind};
use crate::model::{ApplicationSpec, ProvisionedResourceRef};
use crate::provision::{
    ConfigMapProvisioner, IngressProvisioner, NamespaceProvisioner, ResourceProvisioner,
    SecretProvisioner, ServiceProvisioner, WorkloadProvisioner,
};

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    Namespace,
    Config,
    Secret,
    Workload,
    Service,
    Ingress,
}

impl ProvisionStep {
    /// Creation order; teardown walks it backwards.
    pub const ORDER: [ProvisionStep; 6] = [
        ProvisionStep::Namespace,
        ProvisionStep::Config,
        ProvisionStep::Secret,
        ProvisionStep::Workload,
        ProvisionStep::Service,
        ProvisionStep::Ingress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisionStep::Namespace => "namespace",
            ProvisionStep::Config => "config",
            ProvisionStep::Secret => "secret",
            ProvisionStep::Workload => "workload",
            ProvisionStep::Service => "service",
            ProvisionStep::Ingress => "ingress",
        }
    }

    /// Resource kind the step submits
    pub fn kind(self) -> ResourceKind {
        match self {
            ProvisionStep::Namespace => ResourceKind::Namespace,
            ProvisionStep::Config => ResourceKind::ConfigMap,
            ProvisionStep::Secret => ResourceKind::Secret,
            ProvisionStep::Workload => ResourceKind::Deployment,
            ProvisionStep::Service => ResourceKind::Service,
            ProvisionStep::Ingress => ResourceKind::Ingress,
        }
    }

    /// State reached once this step succeeded
    fn reached(self) -> ProvisionState {
        match self {
            ProvisionStep::Namespace => ProvisionState::NamespaceReady,
            ProvisionStep::Config => ProvisionState::ConfigReady,
            ProvisionStep::Secret => ProvisionState::SecretReady,
            ProvisionStep::Workload => ProvisionState::WorkloadCreated,
            ProvisionStep::Service => ProvisionState::ServiceReady,
            ProvisionStep::Ingress => ProvisionState::IngressReady,
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a provisioning run ended up.
///
/// `IngressReady` is the only successful terminal state. `Failed` and
/// `Cancelled` are terminal too; nothing is retried or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvisionState {
    Unprovisioned,
    NamespaceReady,
    ConfigReady,
    SecretReady,
    WorkloadCreated,
    ServiceReady,
    IngressReady,
    Failed {
        step: ProvisionStep,
        kind: ErrorKind,
    },
    Cancelled {
        after: Option<ProvisionStep>,
    },
}

/// Outcome of [`DeploymentOrchestrator::provision_application`].
#[derive(Debug, Serialize)]
pub struct ProvisionResult {
    pub application: String,
    pub namespace: String,
    pub state: ProvisionState,
    /// Resources created or reconciled, in step order
    pub resources: Vec<ProvisionedResourceRef>,
    #[serde(
        serialize_with = "serialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Error>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisionResult {
    pub fn is_success(&self) -> bool {
        self.state == ProvisionState::IngressReady
    }

    pub fn failed_step(&self) -> Option<ProvisionStep> {
        self.error.as_ref().and_then(Error::failed_step)
    }
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    kind: ErrorKind,
    cause: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<ProvisionStep>,
    message: &'a str,
}

fn serialize_error<S: Serializer>(error: &Option<Error>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => {
            let message = error.to_string();
            ErrorReport {
                kind: error.kind(),
                cause: error.root_kind(),
                step: error.failed_step(),
                message: &message,
            }
            .serialize(serializer)
        }
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownOptions {
    /// Also delete the namespace; off by default since it may be shared
    pub delete_namespace: bool,
}

/// What a teardown removed and what was already gone.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub application: String,
    pub namespace: String,
    pub deleted: Vec<ProvisionedResourceRef>,
    pub already_absent: Vec<ProvisionedResourceRef>,
    /// The context was cancelled before every deletion ran; the lists above
    /// hold what was handled up to that point.
    pub cancelled: bool,
}

/// Drives the six provisioners for one application at a time.
///
/// Holds no state between calls, so one orchestrator can serve any number of
/// concurrent provisioning runs for distinct applications.
pub struct DeploymentOrchestrator {
    settings: ProvisioningSettings,
    namespaces: NamespaceProvisioner,
    config_maps: ConfigMapProvisioner,
    secrets: SecretProvisioner,
    workloads: WorkloadProvisioner,
    services: ServiceProvisioner,
    ingresses: IngressProvisioner,
}

impl DeploymentOrchestrator {
    pub fn new(client: ClusterClient, settings: ProvisioningSettings) -> Self {
        Self {
            namespaces: NamespaceProvisioner::new(client.clone(), settings.managed_by.clone()),
            config_maps: ConfigMapProvisioner::new(client.clone()),
            secrets: SecretProvisioner::new(client.clone()),
            workloads: WorkloadProvisioner::new(client.clone()),
            services: ServiceProvisioner::new(client.clone()),
            ingresses: IngressProvisioner::new(client, &settings),
            settings,
        }
    }

    pub fn workloads(&self) -> &WorkloadProvisioner {
        &self.workloads
    }

    pub fn namespaces(&self) -> &NamespaceProvisioner {
        &self.namespaces
    }

    /// Stand up every resource of `spec`, in order, stopping at the first hard failure.
    ///
    /// Never returns early with `Err`: failures are reported through the
    /// result's `state` and `error` together with whatever was created.
    pub async fn provision_application(
        &self,
        spec: &ApplicationSpec,
        ctx: &CallContext,
    ) -> ProvisionResult {
        let mut result = ProvisionResult {
            application: spec.name.trim().to_string(),
            namespace: spec.namespace.trim().to_string(),
            state: ProvisionState::Unprovisioned,
            resources: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let plan = match ApplicationPlan::new(spec, &self.settings) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Rejected application {}: {}", result.application, e);
                result.error = Some(e);
                result.finished_at = Utc::now();
                return result;
            }
        };

        info!(
            "Provisioning application {} in namespace {}",
            plan.app,
            plan.namespace_name()
        );

        let mut completed: Option<ProvisionStep> = None;
        for step in ProvisionStep::ORDER {
            let outcome = match ctx.check() {
                Ok(()) => ctx.run(self.apply(step, &plan)).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(reference) => {
                    info!("✓ {} step: {}", step, reference);
                    result.resources.push(reference);
                    result.state = step.reached();
                    completed = Some(step);
                }
                Err(Error::Cancelled) => {
                    warn!(
                        "Provisioning of {} cancelled before the {} step",
                        plan.app, step
                    );
                    result.state = ProvisionState::Cancelled { after: completed };
                    result.error = Some(Error::Cancelled);
                    break;
                }
                Err(e) => {
                    warn!("Provisioning of {} failed at the {} step: {}", plan.app, step, e);
                    result.state = ProvisionState::Failed {
                        step,
                        kind: e.kind(),
                    };
                    result.error = Some(Error::step(step, e));
                    break;
                }
            }
        }

        if result.is_success() {
            info!("Application {} provisioned", plan.app);
        }
        result.finished_at = Utc::now();
        result
    }

    /// One step, with its conflict policy applied.
    async fn apply(
        &self,
        step: ProvisionStep,
        plan: &ApplicationPlan,
    ) -> Result<ProvisionedResourceRef, Error> {
        match step {
            ProvisionStep::Namespace => match self.namespaces.create(&plan.namespace).await {
                Err(e) if e.is_already_exists() => {
                    warn!("Namespace {} already exists, continuing", plan.namespace.name);
                    Ok(ProvisionedResourceRef::new(
                        ResourceKind::Namespace,
                        &plan.namespace.name,
                        &plan.namespace.name,
                    ))
                }
                other => other,
            },
            ProvisionStep::Config => match self.config_maps.create(&plan.config_map).await {
                Err(e) if e.is_already_exists() => {
                    info!("ConfigMap {} already exists, updating", plan.config_map.name);
                    self.config_maps.update(&plan.config_map).await
                }
                other => other,
            },
            ProvisionStep::Secret => match self.secrets.create(&plan.secret).await {
                Err(e) if e.is_already_exists() => {
                    info!("Secret {} already exists, updating", plan.secret.name);
                    self.secrets.update(&plan.secret).await
                }
                other => other,
            },
            ProvisionStep::Workload => self.workloads.create(&plan.workload).await,
            ProvisionStep::Service => self.services.create(&plan.service).await,
            ProvisionStep::Ingress => self.ingresses.create(&plan.ingress).await,
        }
    }

    /// Delete an application's resources in reverse creation order.
    ///
    /// Resources that are already gone count as removed. The namespace is only
    /// touched when `options.delete_namespace` is set, and always last.
    /// Cancellation stops the teardown and returns the partial report with
    /// `cancelled` set.
    pub async fn teardown_application(
        &self,
        namespace: &str,
        app: &str,
        options: TeardownOptions,
        ctx: &CallContext,
    ) -> Result<TeardownReport, Error> {
        let (namespace, app) = (namespace.trim(), app.trim());
        if namespace.is_empty() || app.is_empty() {
            return Err(Error::InvalidSpec(
                "namespace and application name are required for teardown".to_string(),
            ));
        }

        info!("Tearing down application {} in namespace {}", app, namespace);

        let names = ResourceNames::for_app(app);
        let mut report = TeardownReport {
            application: app.to_string(),
            namespace: namespace.to_string(),
            deleted: Vec::new(),
            already_absent: Vec::new(),
            cancelled: false,
        };

        let mut steps: Vec<ProvisionStep> = ProvisionStep::ORDER.iter().rev().copied().collect();
        if !options.delete_namespace {
            steps.retain(|step| *step != ProvisionStep::Namespace);
        }

        for step in steps {
            let (name, deletion) = match step {
                ProvisionStep::Ingress => (
                    names.ingress.as_str(),
                    self.ingresses.delete(namespace, &names.ingress),
                ),
                ProvisionStep::Service => (
                    names.service.as_str(),
                    self.services.delete(namespace, &names.service),
                ),
                ProvisionStep::Workload => (
                    names.deployment.as_str(),
                    self.workloads.delete(namespace, &names.deployment),
                ),
                ProvisionStep::Secret => (
                    names.secret.as_str(),
                    self.secrets.delete(namespace, &names.secret),
                ),
                ProvisionStep::Config => (
                    names.config_map.as_str(),
                    self.config_maps.delete(namespace, &names.config_map),
                ),
                ProvisionStep::Namespace => (namespace, self.namespaces.delete("", namespace)),
            };
            let reference = ProvisionedResourceRef::new(step.kind(), namespace, name);

            match ctx.run(deletion).await {
                Ok(()) => report.deleted.push(reference),
                Err(e) if e.is_not_found() => {
                    info!("{} already absent", reference);
                    report.already_absent.push(reference);
                }
                Err(Error::Cancelled) => {
                    warn!(
                        "Teardown of {} cancelled before deleting {}",
                        app, reference
                    );
                    report.cancelled = true;
                    return Ok(report);
                }
                Err(e) => return Err(Error::step(step, e)),
            }
        }

        info!("✓ Application {} torn down", app);
        Ok(report)
    }
}
