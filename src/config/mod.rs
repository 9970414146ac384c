/// Configuration management for Launchpad
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::polling::PollingConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchpadConfig {
    /// Cluster connection settings
    #[serde(default)]
    pub cluster: ClusterSettings,

    /// Settings applied to every provisioned application
    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    /// Readiness polling
    #[serde(default)]
    pub readiness: ReadinessSettings,
}

/// How to reach and authenticate against the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Explicit kubeconfig path; when unset, in-cluster credentials are tried
    /// first and then `KUBECONFIG` / `~/.kube/config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_secs: u64,
}

/// Naming, labelling and routing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Value of the `managed-by` label put on every resource
    #[serde(default = "default_managed_by")]
    pub managed_by: String,

    /// Ingress class handling the generated routes
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,

    /// cert-manager cluster issuer for the TLS certificate
    #[serde(default = "default_cluster_issuer")]
    pub cluster_issuer: String,

    /// Base domain used to derive `<app>.<base_domain>` when a spec has no hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<String>,

    /// Extra annotations added to every ingress
    #[serde(default = "default_ingress_annotations")]
    pub ingress_annotations: BTreeMap<String, String>,
}

/// Readiness wait parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSettings {
    #[serde(default = "default_readiness_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_readiness_interval")]
    pub interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    5
}

fn default_managed_by() -> String {
    "launchpad".to_string()
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_cluster_issuer() -> String {
    "letsencrypt-prod".to_string()
}

fn default_ingress_annotations() -> BTreeMap<String, String> {
    [(
        "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
        "/".to_string(),
    )]
    .into_iter()
    .collect()
}

fn default_readiness_timeout() -> u64 {
    300
}

fn default_readiness_interval() -> u64 {
    2
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            health_check_timeout_secs: default_health_check_timeout(),
        }
    }
}

impl ClusterSettings {
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            managed_by: default_managed_by(),
            ingress_class: default_ingress_class(),
            cluster_issuer: default_cluster_issuer(),
            base_domain: None,
            ingress_annotations: default_ingress_annotations(),
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_readiness_timeout(),
            interval_secs: default_readiness_interval(),
        }
    }
}

impl ReadinessSettings {
    /// Polling schedule for a readiness wait on `what`
    pub fn polling(&self, what: impl Into<String>) -> PollingConfig {
        PollingConfig::new(self.timeout_secs, self.interval_secs, what)
    }
}

impl LaunchpadConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LaunchpadConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provisioning.managed_by.is_empty() {
            anyhow::bail!("provisioning.managed_by cannot be empty");
        }

        if self.provisioning.cluster_issuer.is_empty() {
            anyhow::bail!("provisioning.cluster_issuer cannot be empty");
        }

        if let Some(domain) = &self.provisioning.base_domain {
            self.validate_domain(domain)?;
        }

        if self.readiness.interval_secs == 0 {
            anyhow::bail!("readiness.interval_secs must be at least 1");
        }

        if self.cluster.health_check_timeout_secs == 0 {
            anyhow::bail!("cluster.health_check_timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Validate a DNS domain
    fn validate_domain(&self, domain: &str) -> anyhow::Result<()> {
        match url::Host::parse(domain) {
            Ok(url::Host::Domain(_)) => Ok(()),
            _ => anyhow::bail!("Invalid base domain: {}", domain),
        }
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            cluster: ClusterSettings::default(),
            provisioning: ProvisioningSettings {
                base_domain: Some("apps.example.com".to_string()),
                ..ProvisioningSettings::default()
            },
            readiness: ReadinessSettings::default(),
        }
    }
}
