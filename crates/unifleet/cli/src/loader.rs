//! Compose file loading
//!
//! Maps a compose YAML document onto a `Project`. Service and network order
//! follow the document.

use crate::error::{CliError, CliResult};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::debug;
use unifleet_types::{NetworkSpec, Project, Service};

/// File names probed in the working directory, in order
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

#[derive(Debug, Deserialize)]
struct ComposeFile {
    name: Option<String>,
    #[serde(default)]
    services: Mapping,
    #[serde(default)]
    networks: Mapping,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceDef {
    image: Option<String>,
    build: Option<BuildDef>,
    platform: Option<String>,
    networks: Option<ServiceNetworksDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildDef {
    Context(PathBuf),
    Detailed { context: PathBuf },
}

impl BuildDef {
    fn context(&self) -> &Path {
        match self {
            BuildDef::Context(context) | BuildDef::Detailed { context } => context,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceNetworksDef {
    List(Vec<String>),
    Map(Mapping),
}

#[derive(Debug, Default, Deserialize)]
struct AttachmentDef {
    ipv4_address: Option<Ipv4Addr>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkDef {
    name: Option<String>,
    driver: Option<String>,
    ipam: Option<IpamDef>,
}

#[derive(Debug, Default, Deserialize)]
struct IpamDef {
    #[serde(default)]
    config: Vec<IpamConfigDef>,
}

#[derive(Debug, Default, Deserialize)]
struct IpamConfigDef {
    subnet: Option<String>,
}

/// Find the compose file of `workdir`.
pub fn find_compose_file(workdir: &Path) -> CliResult<PathBuf> {
    COMPOSE_FILE_NAMES
        .iter()
        .map(|name| workdir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| CliError::ComposeFileNotFound(workdir.to_path_buf()))
}

/// Load the project of `workdir`, from `file` when given.
///
/// Services without a `platform` get `default_target`.
pub fn load_project(workdir: &Path, file: Option<&Path>, default_target: &str) -> CliResult<Project> {
    let path = match file {
        Some(file) if file.is_absolute() => file.to_path_buf(),
        Some(file) => workdir.join(file),
        None => find_compose_file(workdir)?,
    };
    let contents = std::fs::read_to_string(&path)?;
    let document: ComposeFile = serde_yaml::from_str(&contents)?;

    let base = path.parent().unwrap_or(workdir).to_path_buf();
    let name = match document.name {
        Some(name) => name,
        None => directory_name(workdir)?,
    };
    debug!(project = %name, path = %path.display(), "Loading compose file");

    let mut project = Project::new(&name, workdir);
    project.compose_files.push(path.clone());

    for (key, value) in &document.networks {
        let key = key_str(&path, key)?;
        let def: NetworkDef = from_value(&path, value, &format!("network {key}"))?;

        let mut spec = NetworkSpec::new(key).with_name(
            def.name
                .clone()
                .unwrap_or_else(|| format!("{name}_{key}")),
        );
        if let Some(driver) = def.driver {
            spec = spec.with_driver(driver);
        }
        if let Some(subnet) = def
            .ipam
            .and_then(|ipam| ipam.config.into_iter().next())
            .and_then(|config| config.subnet)
        {
            spec = spec.with_subnet(subnet);
        }
        project = project.with_network(spec);
    }

    for (key, value) in &document.services {
        let key = key_str(&path, key)?;
        let def: ServiceDef = from_value(&path, value, &format!("service {key}"))?;

        let platform = def.platform.unwrap_or_else(|| default_target.to_string());
        let mut service = Service::new(key, platform);
        if let Some(image) = def.image {
            service = service.with_image(image);
        }
        if let Some(build) = &def.build {
            service = service.with_build(base.join(build.context()));
        }
        match def.networks {
            Some(ServiceNetworksDef::List(networks)) => {
                for network in networks {
                    service = service.with_network(network, None);
                }
            }
            Some(ServiceNetworksDef::Map(networks)) => {
                for (network, attachment) in &networks {
                    let network = key_str(&path, network)?;
                    let attachment: AttachmentDef = if attachment.is_null() {
                        AttachmentDef::default()
                    } else {
                        from_value(&path, attachment, &format!("service {key} network {network}"))?
                    };
                    service = service.with_network(network, attachment.ipv4_address);
                }
            }
            None => {}
        }
        project = project.with_service(service);
    }

    Ok(project)
}

fn key_str<'a>(path: &Path, key: &'a Value) -> CliResult<&'a str> {
    key.as_str().ok_or_else(|| CliError::ComposeFile {
        path: path.to_path_buf(),
        message: format!("expected a string key, found {key:?}"),
    })
}

fn from_value<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
    value: &Value,
    what: &str,
) -> CliResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(value.clone()).map_err(|e| CliError::ComposeFile {
        path: path.to_path_buf(),
        message: format!("{what}: {e}"),
    })
}

fn directory_name(workdir: &Path) -> CliResult<String> {
    workdir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            CliError::InvalidInput(format!(
                "cannot derive a project name from {}",
                workdir.display()
            ))
        })
}
