/// Ingress provisioning: public host route with a cert-manager issued certificate
use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as IngressResourceSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{ResourceProvisioner, APP_LABEL};
use crate::cluster::ClusterClient;
use crate::config::ProvisioningSettings;
use crate::error::Error;

pub const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressSpec {
    pub namespace: String,
    pub name: String,
    pub app: String,
    /// External hostname routed to the service
    pub host: String,
    pub service_name: String,
    pub service_port: u16,
}

impl IngressSpec {
    /// Secret cert-manager stores the certificate in
    pub fn tls_secret_name(&self) -> String {
        format!("{}-tls", self.name)
    }
}

pub struct IngressProvisioner {
    client: ClusterClient,
    ingress_class: String,
    cluster_issuer: String,
    annotations: BTreeMap<String, String>,
}

impl IngressProvisioner {
    pub fn new(client: ClusterClient, settings: &ProvisioningSettings) -> Self {
        Self {
            client,
            ingress_class: settings.ingress_class.clone(),
            cluster_issuer: settings.cluster_issuer.clone(),
            annotations: settings.ingress_annotations.clone(),
        }
    }
}

impl ResourceProvisioner for IngressProvisioner {
    type Spec = IngressSpec;
    type Resource = Ingress;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    fn build(&self, spec: &IngressSpec) -> Result<Ingress, Error> {
        let host = spec.host.trim();
        if host.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "ingress {} needs a host",
                spec.name
            )));
        }

        let mut annotations = self.annotations.clone();
        annotations.insert(
            CLUSTER_ISSUER_ANNOTATION.to_string(),
            self.cluster_issuer.clone(),
        );

        let backend = IngressBackend {
            service: Some(IngressServiceBackend {
                name: spec.service_name.clone(),
                port: Some(ServiceBackendPort {
                    number: Some(i32::from(spec.service_port)),
                    ..ServiceBackendPort::default()
                }),
            }),
            ..IngressBackend::default()
        };

        Ok(Ingress {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(
                    [(APP_LABEL.to_string(), spec.app.clone())]
                        .into_iter()
                        .collect(),
                ),
                annotations: Some(annotations),
                ..ObjectMeta::default()
            },
            spec: Some(IngressResourceSpec {
                ingress_class_name: Some(self.ingress_class.clone()),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(spec.tls_secret_name()),
                }]),
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend,
                        }],
                    }),
                }]),
                ..IngressResourceSpec::default()
            }),
            ..Ingress::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::cluster::ResourceKind;

    fn spec() -> IngressSpec {
        IngressSpec {
            namespace: "user123-mystore".to_string(),
            name: "mystore-ingress".to_string(),
            app: "mystore".to_string(),
            host: "mystore.apps.example.com".to_string(),
            service_name: "mystore-service".to_string(),
            service_port: 80,
        }
    }

    #[test]
    fn test_build_routes_host_to_service() {
        let provisioner =
            IngressProvisioner::new(FakeCluster::new().client(), &ProvisioningSettings::default());
        let ingress = provisioner.build(&spec()).unwrap();

        let ingress_spec = ingress.spec.unwrap();
        assert_eq!(ingress_spec.ingress_class_name.as_deref(), Some("nginx"));

        let rules = ingress_spec.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host.as_deref(), Some("mystore.apps.example.com"));
        let path = &rules[0].http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/"));
        assert_eq!(path.path_type, "Prefix");
        let service = path.backend.service.as_ref().unwrap();
        assert_eq!(service.name, "mystore-service");
        assert_eq!(service.port.as_ref().unwrap().number, Some(80));

        let tls = &ingress_spec.tls.unwrap()[0];
        assert_eq!(tls.hosts, Some(vec!["mystore.apps.example.com".to_string()]));
        assert_eq!(tls.secret_name.as_deref(), Some("mystore-ingress-tls"));
    }

    #[test]
    fn test_annotations_carry_issuer_and_extras() {
        let mut settings = ProvisioningSettings::default();
        settings.cluster_issuer = "letsencrypt-staging".to_string();
        settings
            .ingress_annotations
            .insert("nginx.ingress.kubernetes.io/ssl-redirect".to_string(), "true".to_string());

        let provisioner = IngressProvisioner::new(FakeCluster::new().client(), &settings);
        let annotations = provisioner.build(&spec()).unwrap().metadata.annotations.unwrap();

        assert_eq!(annotations[CLUSTER_ISSUER_ANNOTATION], "letsencrypt-staging");
        assert_eq!(annotations["nginx.ingress.kubernetes.io/rewrite-target"], "/");
        assert_eq!(annotations["nginx.ingress.kubernetes.io/ssl-redirect"], "true");
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let provisioner =
            IngressProvisioner::new(FakeCluster::new().client(), &ProvisioningSettings::default());
        let mut spec = spec();
        spec.host = " ".to_string();

        assert!(matches!(provisioner.build(&spec), Err(Error::InvalidSpec(_))));
    }

    #[tokio::test]
    async fn test_create_stores_ingress() {
        let fake = FakeCluster::new();
        let provisioner = IngressProvisioner::new(fake.client(), &ProvisioningSettings::default());

        let reference = provisioner.create(&spec()).await.unwrap();
        assert_eq!(reference.kind, ResourceKind::Ingress);
        assert_eq!(
            fake.names(ResourceKind::Ingress),
            vec!["mystore-ingress".to_string()]
        );
    }
}
