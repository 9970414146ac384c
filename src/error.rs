/// Error kinds surfaced by the provisioning library
use serde::Serialize;
use thiserror::Error;

use crate::cluster::ResourceKind;
use crate::orchestrator::ProvisionStep;

/// Errors emitted by the cluster client, provisioners, orchestrator and status resolver.
///
/// Cluster-reported failures are classified into the variants below instead of
/// being flattened into a string, so callers can branch on "absent" versus
/// "erred" and on "already there" versus "broken".
#[derive(Debug, Error)]
pub enum Error {
    /// Neither in-cluster nor local credentials could be resolved.
    #[error("failed to initialise cluster client: {0}")]
    ClientInit(String),

    /// The cluster API did not answer a bounded health probe.
    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("invalid resource quantity for {field} ({value:?}): {reason}")]
    InvalidResourceQuantity {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid application spec: {0}")]
    InvalidSpec(String),

    #[error("ingress {namespace}/{name} has no host rules configured")]
    NoRulesConfigured { namespace: String, name: String },

    #[error("service {namespace}/{name} has no cluster address")]
    NoClusterAddress { namespace: String, name: String },

    /// A pipeline step failed; `source` is the classified cause.
    #[error("step {step} failed: {source}")]
    StepFailed {
        step: ProvisionStep,
        #[source]
        source: Box<Error>,
    },

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("operation cancelled")]
    Cancelled,

    /// A polled condition did not hold before its timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cluster API error ({code} {reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("cluster transport error: {0}")]
    Transport(String),

    #[error("failed to (de)serialize cluster object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flat, serializable discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClientInit,
    ClusterUnreachable,
    AlreadyExists,
    NotFound,
    InvalidResourceQuantity,
    InvalidSpec,
    NoRulesConfigured,
    NoClusterAddress,
    StepFailed,
    Cancelled,
    Timeout,
    Api,
    Transport,
    Serialization,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ClientInit(_) => ErrorKind::ClientInit,
            Error::ClusterUnreachable(_) => ErrorKind::ClusterUnreachable,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidResourceQuantity { .. } => ErrorKind::InvalidResourceQuantity,
            Error::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Error::NoRulesConfigured { .. } => ErrorKind::NoRulesConfigured,
            Error::NoClusterAddress { .. } => ErrorKind::NoClusterAddress,
            Error::StepFailed { .. } => ErrorKind::StepFailed,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Api { .. } => ErrorKind::Api,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Kind of the innermost cause, looking through `StepFailed`.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Error::StepFailed { source, .. } => source.root_kind(),
            other => other.kind(),
        }
    }

    /// The pipeline step this error is attached to, if any.
    pub fn failed_step(&self) -> Option<ProvisionStep> {
        match self {
            Error::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    pub(crate) fn step(step: ProvisionStep, source: Error) -> Self {
        Error::StepFailed {
            step,
            source: Box::new(source),
        }
    }
}
