//! Consul-style directory records
//!
//! Wire shapes of the health query response and of the agent registration
//! payload, and their translation to and from [`ServiceInstance`].

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::DirectoryConfig;
use crate::DirectoryError;
use crate::Result;
use crate::ServiceInstance;

/// One element of a health service query response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthEntry {
    pub service: AgentService,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub tagged_addresses: BTreeMap<String, ServiceAddress>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceAddress {
    pub address: String,
    pub port: u16,
}

/// Agent registration payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
    pub tagged_addresses: BTreeMap<String, ServiceAddress>,
    pub address: String,
    pub port: u16,
    pub checks: Vec<AgentServiceCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceCheck {
    #[serde(rename = "TCP")]
    pub tcp: String,
    pub interval: String,
}

impl HealthEntry {
    /// Translates the record into an instance.
    ///
    /// The version comes from the `<version_tag>=<v>` tag (the last one wins,
    /// empty when absent). Endpoints are the tagged addresses ordered by scheme.
    pub fn into_instance(
        self,
        version_tag: &str,
    ) -> ServiceInstance {
        let service = self.service;
        let version = version_from_tags(&service.tags, version_tag);

        ServiceInstance::builder(service.service)
            .id(service.id)
            .version(version)
            .metadata(service.meta)
            .endpoints(service.tagged_addresses.into_values().map(|addr| addr.address))
            .build()
    }
}

pub(crate) fn version_from_tags(
    tags: &[String],
    version_tag: &str,
) -> String {
    tags.iter()
        .filter_map(|tag| tag.split_once('='))
        .filter(|(key, _)| *key == version_tag)
        .map(|(_, value)| value.to_string())
        .last()
        .unwrap_or_default()
}

impl AgentServiceRegistration {
    /// Builds the registration payload of `instance`.
    ///
    /// Every endpoint becomes a tagged address keyed by its scheme. The last
    /// endpoint's host and port are the primary address, which also receives
    /// a TCP health check.
    pub fn from_instance(
        instance: &ServiceInstance,
        config: &DirectoryConfig,
    ) -> Result<Self> {
        let mut tagged_addresses = BTreeMap::new();
        let mut primary: Option<(String, u16)> = None;

        for endpoint in instance.endpoints() {
            let raw = Url::parse(endpoint).map_err(|source| DirectoryError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                source,
            })?;
            let host = raw
                .host_str()
                .ok_or_else(|| DirectoryError::MissingHost(endpoint.clone()))?
                .to_string();
            let port = raw.port().unwrap_or(0);

            tagged_addresses.insert(
                raw.scheme().to_string(),
                ServiceAddress {
                    address: endpoint.clone(),
                    port,
                },
            );
            primary = Some((host, port));
        }

        let (address, port) = primary.unwrap_or_default();
        let checks = if address.is_empty() {
            vec![]
        } else {
            vec![AgentServiceCheck {
                tcp: format!("{address}:{port}"),
                interval: config.health_check_interval(),
            }]
        };

        Ok(Self {
            id: instance.id().to_string(),
            name: instance.name().to_string(),
            tags: vec![format!("{}={}", config.version_tag, instance.version())],
            meta: instance.metadata().clone(),
            tagged_addresses,
            address,
            port,
            checks,
        })
    }
}
