//! Compose project model
//!
//! A `Project` is the desired state handed to the reconciler: ordered services
//! and the networks they attach to. Loading one from a file is the job of the
//! command-line layer; everything here is read-only to the engines except
//! address assignment, which runs once before any resource is touched.

use crate::error::{Result, TypesError};
use crate::image::ImageRef;
use crate::ipam::Subnet;
use crate::machine::NetworkAttachment;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// A compose project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    /// Project name, also the key of its persisted composite state
    pub name: String,

    /// Services in declaration order
    pub services: Vec<Service>,

    /// Networks in declaration order
    pub networks: Vec<NetworkSpec>,

    /// Files the project was loaded from
    pub compose_files: Vec<PathBuf>,

    /// Directory relative paths are resolved against
    pub working_dir: PathBuf,
}

/// A single service definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub name: String,

    /// Image reference; `None` means build from source
    pub image: Option<String>,

    pub build: Option<BuildConfig>,

    /// `<platform>/<architecture>`
    pub platform: String,

    /// Network attachments in declaration order
    pub networks: Vec<ServiceNetwork>,
}

/// Build settings for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub context: PathBuf,
}

/// A service's attachment to a project network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNetwork {
    /// Key of the network in the project
    pub network: String,

    /// Requested or assigned address
    pub ipv4_address: Option<Ipv4Addr>,
}

/// A network declared by the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Key services use to refer to the network
    pub key: String,

    /// Name of the network resource
    pub name: String,

    pub driver: Option<String>,

    /// IPAM subnet in CIDR notation
    pub subnet: Option<String>,
}

impl NetworkSpec {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            driver: None,
            subnet: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    pub fn has_subnet(&self) -> bool {
        self.subnet.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Driver to create the network with; an empty declaration counts as none.
    pub fn driver_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.driver.as_deref().map(str::trim) {
            Some(driver) if !driver.is_empty() => driver,
            _ => fallback,
        }
    }

    pub fn parsed_subnet(&self) -> Result<Option<Subnet>> {
        match self.subnet.as_deref() {
            Some(subnet) if !subnet.trim().is_empty() => {
                Subnet::parse(&self.key, subnet).map(Some)
            }
            _ => Ok(None),
        }
    }
}

impl Service {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_build(mut self, context: impl Into<PathBuf>) -> Self {
        self.build = Some(BuildConfig {
            context: context.into(),
        });
        self
    }

    pub fn with_network(mut self, network: impl Into<String>, address: Option<Ipv4Addr>) -> Self {
        self.networks.push(ServiceNetwork {
            network: network.into(),
            ipv4_address: address,
        });
        self
    }

    pub fn target(&self) -> Result<Target> {
        Target::parse(&self.name, &self.platform)
    }

    /// The declared image, or `None` when the service builds from source.
    pub fn image_ref(&self) -> Result<Option<ImageRef>> {
        match self.image.as_deref() {
            Some(image) if !image.trim().is_empty() => ImageRef::parse(image).map(Some),
            _ => Ok(None),
        }
    }

    pub fn build_context(&self) -> Option<&Path> {
        self.build.as_ref().map(|b| b.context.as_path())
    }
}

impl Project {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_network(mut self, network: NetworkSpec) -> Self {
        self.networks.push(network);
        self
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn network(&self, key: &str) -> Option<&NetworkSpec> {
        self.networks.iter().find(|n| n.key == key)
    }

    pub fn primary_compose_file(&self) -> Option<&Path> {
        self.compose_files.first().map(PathBuf::as_path)
    }

    /// Structural checks; nothing is created when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TypesError::MissingProjectName);
        }

        let mut networks = HashSet::new();
        for network in &self.networks {
            if !networks.insert(network.key.as_str()) {
                return Err(TypesError::DuplicateNetwork(network.key.clone()));
            }
            network.parsed_subnet()?;
        }

        let mut services = HashSet::new();
        for service in &self.services {
            if !services.insert(service.name.as_str()) {
                return Err(TypesError::DuplicateService(service.name.clone()));
            }

            service.target()?;

            // A service with no source fails on its own when resolved.
            service.image_ref()?;

            for attachment in &service.networks {
                if !networks.contains(attachment.network.as_str()) {
                    return Err(TypesError::UnknownNetwork {
                        service: service.name.clone(),
                        network: attachment.network.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Give every unaddressed attachment on a subnet-bearing network the
    /// lowest free host address.
    ///
    /// Requested addresses are checked first so that assignment never hands
    /// out an address a later service asked for. Attachments on subnet-less
    /// networks are left unaddressed.
    pub fn assign_ips(&mut self) -> Result<()> {
        for network in &self.networks {
            let Some(subnet) = network.parsed_subnet()? else {
                continue;
            };

            let mut used = HashSet::new();
            for service in &self.services {
                for attachment in service.networks.iter().filter(|a| a.network == network.key) {
                    let Some(address) = attachment.ipv4_address else {
                        continue;
                    };
                    if !subnet.is_assignable(address) {
                        return Err(TypesError::AddressOutsideSubnet {
                            service: service.name.clone(),
                            address: address.to_string(),
                            subnet: subnet.to_string(),
                        });
                    }
                    if !used.insert(address) {
                        return Err(TypesError::DuplicateAddress {
                            network: network.key.clone(),
                            address: address.to_string(),
                        });
                    }
                }
            }

            for service in &mut self.services {
                for attachment in service
                    .networks
                    .iter_mut()
                    .filter(|a| a.network == network.key && a.ipv4_address.is_none())
                {
                    let address =
                        subnet
                            .first_free(&used)
                            .ok_or_else(|| TypesError::AddressExhausted {
                                network: network.key.clone(),
                                subnet: subnet.to_string(),
                            })?;
                    used.insert(address);
                    attachment.ipv4_address = Some(address);
                }
            }
        }

        Ok(())
    }

    /// Networks in creation order: subnet-bearing first, then the rest, each
    /// group in declaration order.
    pub fn ordered_networks(&self) -> Vec<&NetworkSpec> {
        let (with_subnet, without): (Vec<_>, Vec<_>) =
            self.networks.iter().partition(|n| n.has_subnet());
        with_subnet.into_iter().chain(without).collect()
    }

    /// Launch-time attachments for `service`, using network resource names.
    pub fn attachments(&self, service: &Service) -> Vec<NetworkAttachment> {
        service
            .networks
            .iter()
            .map(|attachment| {
                let name = self
                    .network(&attachment.network)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| attachment.network.clone());
                NetworkAttachment {
                    network: name,
                    ipv4_address: attachment.ipv4_address,
                }
            })
            .collect()
    }

    /// Length of the longest service name, used to align log prefixes.
    pub fn longest_service_name(&self) -> usize {
        self.services.iter().map(|s| s.name.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_project() -> Project {
        Project::new("demo", "/srv/demo")
            .with_network(NetworkSpec::new("net0").with_subnet("10.0.0.0/24"))
            .with_service(
                Service::new("web", "qemu/x86_64")
                    .with_image("org/app:latest")
                    .with_network("net0", Some(Ipv4Addr::new(10, 0, 0, 2))),
            )
    }

    #[test]
    fn test_validate_accepts_well_formed_project() {
        web_project().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_services() {
        let project = web_project().with_service(Service::new("web", "qemu/x86_64").with_image("a"));
        assert_eq!(
            project.validate().unwrap_err(),
            TypesError::DuplicateService("web".into())
        );
    }

    #[test]
    fn test_validate_rejects_bad_platform() {
        let project = Project::new("demo", "/srv")
            .with_service(Service::new("api", "qemu").with_image("org/api"));
        assert!(matches!(
            project.validate().unwrap_err(),
            TypesError::InvalidPlatform { .. }
        ));
    }

    #[test]
    fn test_validate_leaves_sourceless_service_to_resolution() {
        let project = Project::new("demo", "/srv")
            .with_service(Service::new("api", "qemu/x86_64"))
            .with_service(Service::new("web", "qemu/x86_64").with_image("org/web"));
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_network() {
        let project = Project::new("demo", "/srv").with_service(
            Service::new("api", "qemu/x86_64")
                .with_image("org/api")
                .with_network("missing", None),
        );
        assert!(matches!(
            project.validate().unwrap_err(),
            TypesError::UnknownNetwork { .. }
        ));
    }

    #[test]
    fn test_ordered_networks_puts_subnets_first() {
        let project = Project::new("demo", "/srv")
            .with_network(NetworkSpec::new("b"))
            .with_network(NetworkSpec::new("a").with_subnet("10.0.0.0/24"))
            .with_network(NetworkSpec::new("c"))
            .with_network(NetworkSpec::new("d").with_subnet("10.1.0.0/24"));

        let order: Vec<_> = project
            .ordered_networks()
            .into_iter()
            .map(|n| n.key.as_str())
            .collect();
        assert_eq!(order, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_assign_ips_fills_gaps_without_stealing_requests() {
        let mut project = Project::new("demo", "/srv")
            .with_network(NetworkSpec::new("net0").with_subnet("10.0.0.0/24"))
            .with_service(
                Service::new("a", "qemu/x86_64")
                    .with_image("org/a")
                    .with_network("net0", None),
            )
            .with_service(
                Service::new("b", "qemu/x86_64")
                    .with_image("org/b")
                    .with_network("net0", Some(Ipv4Addr::new(10, 0, 0, 2))),
            );

        project.assign_ips().unwrap();

        assert_eq!(
            project.service("a").unwrap().networks[0].ipv4_address,
            Some(Ipv4Addr::new(10, 0, 0, 3))
        );
        assert_eq!(
            project.service("b").unwrap().networks[0].ipv4_address,
            Some(Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test]
    fn test_assign_ips_leaves_subnetless_networks_alone() {
        let mut project = Project::new("demo", "/srv")
            .with_network(NetworkSpec::new("plain"))
            .with_service(
                Service::new("a", "qemu/x86_64")
                    .with_image("org/a")
                    .with_network("plain", None),
            );

        project.assign_ips().unwrap();
        assert_eq!(project.services[0].networks[0].ipv4_address, None);
    }

    #[test]
    fn test_assign_ips_rejects_out_of_subnet_request() {
        let mut project = Project::new("demo", "/srv")
            .with_network(NetworkSpec::new("net0").with_subnet("10.0.0.0/24"))
            .with_service(
                Service::new("a", "qemu/x86_64")
                    .with_image("org/a")
                    .with_network("net0", Some(Ipv4Addr::new(10, 9, 0, 2))),
            );

        assert!(matches!(
            project.assign_ips().unwrap_err(),
            TypesError::AddressOutsideSubnet { .. }
        ));
    }

    #[test]
    fn test_attachments_render_resource_names() {
        let project = Project::new("demo", "/srv")
            .with_network(
                NetworkSpec::new("net0")
                    .with_name("demo_net0")
                    .with_subnet("10.0.0.0/24"),
            )
            .with_service(
                Service::new("web", "qemu/x86_64")
                    .with_image("org/app")
                    .with_network("net0", Some(Ipv4Addr::new(10, 0, 0, 2))),
            );

        let attachments = project.attachments(&project.services[0]);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].to_string(), "demo_net0:10.0.0.2");
    }

    #[test]
    fn test_longest_service_name() {
        let project = web_project()
            .with_service(Service::new("database", "qemu/x86_64").with_image("org/db"));
        assert_eq!(project.longest_service_name(), 8);
        assert_eq!(Project::default().longest_service_name(), 0);
    }

    #[test]
    fn test_network_driver_fallback() {
        use crate::network::DEFAULT_NETWORK_DRIVER;

        assert_eq!(NetworkSpec::new("n").driver_or(DEFAULT_NETWORK_DRIVER), "bridge");
        assert_eq!(
            NetworkSpec::new("n").with_driver("").driver_or(DEFAULT_NETWORK_DRIVER),
            "bridge"
        );
        assert_eq!(
            NetworkSpec::new("n").with_driver("macvlan").driver_or(DEFAULT_NETWORK_DRIVER),
            "macvlan"
        );
    }
}
