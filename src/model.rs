/// Caller-facing data model
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::cluster::ResourceKind;
use crate::error::Error;

pub const DEFAULT_REPLICAS: u32 = 1;
pub const DEFAULT_CONTAINER_PORT: u16 = 8080;
pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_CPU_LIMIT: &str = "500m";
pub const DEFAULT_MEMORY_REQUEST: &str = "128Mi";
pub const DEFAULT_MEMORY_LIMIT: &str = "512Mi";

/// Longest application name whose derived `<name>-service` still fits a
/// 63 character DNS-1035 label.
pub const MAX_NAME_LEN: usize = 63 - "-service".len();

/// Everything needed to stand up one application.
///
/// Zero and empty fields mean "use the default"; see [`ApplicationSpec::normalized`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    /// Logical application name, also the `app` label value
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Image repository, optionally already carrying a tag
    pub image: String,

    /// Image tag appended to `image` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub replicas: u32,

    #[serde(default)]
    pub container_port: u16,

    /// Port exposed by the service; defaults to the container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,

    #[serde(default)]
    pub resources: ResourceSpec,

    /// Non-secret configuration injected through the ConfigMap
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Secret configuration injected through the Secret
    #[serde(default)]
    pub secrets: SecretValues,

    /// Explicit environment overrides, applied after bulk injection
    #[serde(default)]
    pub env: Vec<EnvOverride>,

    /// External hostname routed to the application
    #[serde(default)]
    pub hostname: String,

    /// Extra labels for the namespace
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// CPU and memory requests/limits as Kubernetes quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu_request: String,
    #[serde(default)]
    pub cpu_limit: String,
    #[serde(default)]
    pub memory_request: String,
    #[serde(default)]
    pub memory_limit: String,
}

impl ResourceSpec {
    /// Replace empty values with the defaults
    pub fn with_defaults(&self) -> Self {
        fn or(value: &str, default: &str) -> String {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value.trim().to_string()
            }
        }

        Self {
            cpu_request: or(&self.cpu_request, DEFAULT_CPU_REQUEST),
            cpu_limit: or(&self.cpu_limit, DEFAULT_CPU_LIMIT),
            memory_request: or(&self.memory_request, DEFAULT_MEMORY_REQUEST),
            memory_limit: or(&self.memory_limit, DEFAULT_MEMORY_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverride {
    pub name: String,
    pub value: String,
}

impl EnvOverride {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Secret key/value pairs whose values never show up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValues(pub BTreeMap<String, String>);

impl SecretValues {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for SecretValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SecretValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl ApplicationSpec {
    /// Load an application manifest from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: ApplicationSpec = serde_yaml::from_str(&content)?;
        Ok(spec)
    }

    /// Full image reference submitted to the cluster
    pub fn image_reference(&self) -> String {
        match self.tag.as_deref().map(str::trim) {
            Some(tag) if !tag.is_empty() => format!("{}:{}", self.image.trim(), tag),
            _ => self.image.trim().to_string(),
        }
    }

    /// Check mandatory fields and naming rules.
    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("image", &self.image),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidSpec(format!("{} is required", field)));
            }
        }

        validate_app_name(&self.name)?;
        validate_dns_label("namespace", &self.namespace)?;

        for key in self.config.keys().chain(self.secrets.0.keys()) {
            validate_data_key(key)?;
        }

        for entry in &self.env {
            if entry.name.trim().is_empty() {
                return Err(Error::InvalidSpec(
                    "environment override with empty name".to_string(),
                ));
            }
        }

        if !self.hostname.trim().is_empty() {
            validate_hostname(&self.hostname.trim().to_ascii_lowercase())?;
        }

        Ok(())
    }

    /// Copy of the spec with every default applied.
    ///
    /// `base_domain` is used to derive `<name>.<base_domain>` when no hostname
    /// is given; without either the spec is invalid.
    pub fn normalized(&self, base_domain: Option<&str>) -> Result<Self, Error> {
        self.validate()?;

        let mut spec = self.clone();
        spec.name = spec.name.trim().to_string();
        spec.namespace = spec.namespace.trim().to_string();
        spec.image = spec.image_reference();
        spec.tag = None;
        if spec.replicas == 0 {
            spec.replicas = DEFAULT_REPLICAS;
        }
        if spec.container_port == 0 {
            spec.container_port = DEFAULT_CONTAINER_PORT;
        }
        if spec.service_port.map_or(true, |port| port == 0) {
            spec.service_port = Some(spec.container_port);
        }
        spec.resources = spec.resources.with_defaults();

        let hostname = match (spec.hostname.trim(), base_domain) {
            ("", Some(domain)) => format!("{}.{}", spec.name, domain.trim_matches('.')),
            ("", None) => {
                return Err(Error::InvalidSpec(
                    "hostname is required when no base domain is configured".to_string(),
                ))
            }
            (host, _) => host.to_ascii_lowercase(),
        };
        validate_hostname(&hostname)?;
        spec.hostname = hostname;

        Ok(spec)
    }

    /// Effective service port
    pub fn service_port(&self) -> u16 {
        self.service_port
            .filter(|port| *port != 0)
            .unwrap_or(if self.container_port == 0 {
                DEFAULT_CONTAINER_PORT
            } else {
                self.container_port
            })
    }

    /// Generate an example application manifest
    pub fn example() -> Self {
        Self {
            name: "mystore".to_string(),
            namespace: "user123-mystore".to_string(),
            image: "nginx".to_string(),
            tag: Some("latest".to_string()),
            replicas: 2,
            container_port: 80,
            service_port: None,
            resources: ResourceSpec::default().with_defaults(),
            config: [("APP_ENV", "production"), ("LOG_LEVEL", "info")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            secrets: [("DATABASE_PASSWORD", "change-me")].into_iter().collect(),
            env: vec![EnvOverride::new("PORT", "80")],
            hostname: "mystore.apps.example.com".to_string(),
            labels: BTreeMap::new(),
        }
    }
}

fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

/// RFC 1123 label: lowercase alphanumerics and '-', at most 63 characters,
/// starting and ending with an alphanumeric.
fn validate_dns_label(field: &str, value: &str) -> Result<(), Error> {
    let value = value.trim();
    if is_dns_label(value) {
        Ok(())
    } else {
        Err(Error::InvalidSpec(format!(
            "{} {:?} must be a lowercase RFC 1123 label",
            field, value
        )))
    }
}

/// The name prefixes every derived object, and Services need DNS-1035
/// labels: a leading letter and room for the `-service` suffix.
fn validate_app_name(value: &str) -> Result<(), Error> {
    let value = value.trim();
    validate_dns_label("name", value)?;

    if !value.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(Error::InvalidSpec(format!(
            "name {:?} must start with a letter",
            value
        )));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(Error::InvalidSpec(format!(
            "name {:?} is longer than {} characters",
            value, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// ConfigMap and Secret keys: alphanumerics, '-', '_' and '.'.
fn validate_data_key(key: &str) -> Result<(), Error> {
    let valid = !key.is_empty()
        && key.len() <= 253
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSpec(format!("invalid data key {:?}", key)))
    }
}

/// Ingress hosts are DNS-1123 subdomains: dot-separated RFC 1123 labels,
/// at most 253 characters. IP literals are not accepted.
fn validate_hostname(host: &str) -> Result<(), Error> {
    let valid = host.len() <= 253
        && host.split('.').all(is_dns_label)
        && matches!(url::Host::parse(host), Ok(url::Host::Domain(_)));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSpec(format!("invalid hostname {:?}", host)))
    }
}

/// Handle returned by a provisioner: enough to look a resource up again or tear it down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ProvisionedResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ProvisionedResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_namespaced() {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        } else {
            write!(f, "{} {}", self.kind, self.name)
        }
    }
}
