/// Service provisioning: stable in-cluster address in front of the workload
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec as ServiceResourceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{ResourceProvisioner, APP_LABEL};
use crate::cluster::ClusterClient;
use crate::error::Error;
use crate::model::DEFAULT_CONTAINER_PORT;

const CLUSTER_IP: &str = "ClusterIP";
const PORT_NAME: &str = "http";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub namespace: String,
    pub name: String,
    /// Pods labelled `app=<app>` receive the traffic
    pub app: String,
    /// Port the service listens on; 0 means "same as the container port"
    pub port: u16,
    pub target_port: u16,
}

pub struct ServiceProvisioner {
    client: ClusterClient,
}

impl ServiceProvisioner {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// `clusterIP:port` of a stored service
    pub async fn endpoint(&self, namespace: &str, name: &str) -> Result<String, Error> {
        let service = self.get(namespace, name).await?;
        let no_address = || Error::NoClusterAddress {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        let spec = service.spec.as_ref().ok_or_else(no_address)?;
        let ip = spec
            .cluster_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != "None")
            .ok_or_else(no_address)?;
        let port = spec
            .ports
            .as_ref()
            .and_then(|ports| ports.first())
            .map(|port| port.port)
            .ok_or_else(no_address)?;

        Ok(format!("{}:{}", ip, port))
    }
}

impl ResourceProvisioner for ServiceProvisioner {
    type Spec = ServiceSpec;
    type Resource = Service;

    fn client(&self) -> &ClusterClient {
        &self.client
    }

    fn build(&self, spec: &ServiceSpec) -> Result<Service, Error> {
        let target_port = if spec.target_port == 0 {
            DEFAULT_CONTAINER_PORT
        } else {
            spec.target_port
        };
        let port = if spec.port == 0 { target_port } else { spec.port };

        let labels: BTreeMap<String, String> =
            [(APP_LABEL.to_string(), spec.app.clone())].into_iter().collect();

        Ok(Service {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceResourceSpec {
                type_: Some(CLUSTER_IP.to_string()),
                selector: Some(labels),
                ports: Some(vec![ServicePort {
                    name: Some(PORT_NAME.to_string()),
                    protocol: Some("TCP".to_string()),
                    port: i32::from(port),
                    target_port: Some(IntOrString::Int(i32::from(target_port))),
                    ..ServicePort::default()
                }]),
                ..ServiceResourceSpec::default()
            }),
            ..Service::default()
        })
    }

    /// The cluster IP is allocated by the API server and immutable.
    fn carry_over(&self, current: &Service, desired: &mut Service) {
        desired.metadata.resource_version = current.metadata.resource_version.clone();
        if let (Some(current), Some(desired)) = (current.spec.as_ref(), desired.spec.as_mut()) {
            desired.cluster_ip = current.cluster_ip.clone();
            desired.cluster_ips = current.cluster_ips.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::cluster::ResourceKind;
    use serde_json::json;

    fn spec(port: u16, target_port: u16) -> ServiceSpec {
        ServiceSpec {
            namespace: "team-shop".to_string(),
            name: "shop-service".to_string(),
            app: "shop".to_string(),
            port,
            target_port,
        }
    }

    #[test]
    fn test_build_exposes_single_http_port() {
        let provisioner = ServiceProvisioner::new(FakeCluster::new().client());
        let service = provisioner.build(&spec(80, 3000)).unwrap();

        let service_spec = service.spec.unwrap();
        assert_eq!(service_spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(service_spec.selector.unwrap()["app"], "shop");

        let ports = service_spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("http"));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(3000)));
    }

    #[test]
    fn test_port_defaults_to_target_port() {
        let provisioner = ServiceProvisioner::new(FakeCluster::new().client());
        let service = provisioner.build(&spec(0, 0)).unwrap();

        let port = &service.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
    }

    #[tokio::test]
    async fn test_endpoint_reports_cluster_address() {
        let fake = FakeCluster::new();
        let provisioner = ServiceProvisioner::new(fake.client());
        provisioner.create(&spec(80, 3000)).await.unwrap();

        let endpoint = provisioner.endpoint("team-shop", "shop-service").await.unwrap();
        assert_eq!(endpoint, "10.96.0.1:80");
    }

    #[tokio::test]
    async fn test_update_keeps_allocated_cluster_ip() {
        let fake = FakeCluster::new();
        let provisioner = ServiceProvisioner::new(fake.client());
        provisioner.create(&spec(80, 3000)).await.unwrap();

        provisioner.update(&spec(8080, 3000)).await.unwrap();

        let stored = fake
            .object(ResourceKind::Service, "team-shop", "shop-service")
            .unwrap();
        assert_eq!(stored["spec"]["clusterIP"], "10.96.0.1");
        assert_eq!(stored["spec"]["ports"][0]["port"], 8080);
    }

    #[tokio::test]
    async fn test_headless_service_has_no_cluster_address() {
        let fake = FakeCluster::new();
        fake.insert(
            ResourceKind::Service,
            "team-shop",
            "headless",
            json!({
                "metadata": {"name": "headless", "namespace": "team-shop"},
                "spec": {"clusterIP": "None", "ports": [{"port": 80}]}
            }),
        );

        let err = ServiceProvisioner::new(fake.client())
            .endpoint("team-shop", "headless")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoClusterAddress { .. }));
    }
}
