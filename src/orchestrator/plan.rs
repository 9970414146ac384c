/// Deterministic resource names and per-kind specs derived from an application
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ProvisioningSettings;
use crate::error::Error;
use crate::model::ApplicationSpec;
use crate::provision::{
    ConfigMapSpec, IngressSpec, NamespaceSpec, SecretSpec, ServiceSpec, WorkloadSpec, APP_LABEL,
    MANAGED_BY_LABEL,
};

/// Names of the namespaced resources belonging to one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    pub config_map: String,
    pub secret: String,
    pub deployment: String,
    pub service: String,
    pub ingress: String,
}

impl ResourceNames {
    pub fn for_app(app: &str) -> Self {
        Self {
            config_map: format!("{}-config", app),
            secret: format!("{}-secrets", app),
            deployment: format!("{}-deployment", app),
            service: format!("{}-service", app),
            ingress: format!("{}-ingress", app),
        }
    }
}

/// Everything the six provisioning steps submit, computed up front.
#[derive(Debug, Clone)]
pub struct ApplicationPlan {
    pub app: String,
    pub namespace: NamespaceSpec,
    pub config_map: ConfigMapSpec,
    pub secret: SecretSpec,
    pub workload: WorkloadSpec,
    pub service: ServiceSpec,
    pub ingress: IngressSpec,
}

impl ApplicationPlan {
    /// Validate `spec`, apply defaults and derive every resource spec.
    pub fn new(spec: &ApplicationSpec, settings: &ProvisioningSettings) -> Result<Self, Error> {
        let spec = spec.normalized(settings.base_domain.as_deref())?;
        let names = ResourceNames::for_app(&spec.name);

        let labels: BTreeMap<String, String> = [
            (APP_LABEL.to_string(), spec.name.clone()),
            (MANAGED_BY_LABEL.to_string(), settings.managed_by.clone()),
        ]
        .into_iter()
        .collect();

        let mut namespace_labels = spec.labels.clone();
        namespace_labels.extend(labels.clone());

        let service_port = spec.service_port();

        Ok(Self {
            app: spec.name.clone(),
            namespace: NamespaceSpec {
                name: spec.namespace.clone(),
                labels: namespace_labels,
            },
            config_map: ConfigMapSpec {
                namespace: spec.namespace.clone(),
                name: names.config_map.clone(),
                labels: labels.clone(),
                data: spec.config.clone(),
            },
            secret: SecretSpec {
                namespace: spec.namespace.clone(),
                name: names.secret.clone(),
                labels,
                data: spec.secrets.clone(),
            },
            workload: WorkloadSpec {
                namespace: spec.namespace.clone(),
                name: names.deployment,
                app: spec.name.clone(),
                image: spec.image.clone(),
                replicas: spec.replicas,
                container_port: spec.container_port,
                resources: spec.resources.clone(),
                config_map: Some(names.config_map),
                secret: Some(names.secret),
                env: spec.env.clone(),
            },
            service: ServiceSpec {
                namespace: spec.namespace.clone(),
                name: names.service.clone(),
                app: spec.name.clone(),
                port: service_port,
                target_port: spec.container_port,
            },
            ingress: IngressSpec {
                namespace: spec.namespace,
                name: names.ingress,
                app: spec.name,
                host: spec.hostname,
                service_name: names.service,
                service_port,
            },
        })
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace.name
    }
}
