use std::collections::HashMap;

/// One live instance of a named service
///
/// Immutable once built: snapshots share instances and readers holding an old
/// snapshot must keep seeing the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    id: String,
    name: String,
    version: String,
    metadata: HashMap<String, String>,
    endpoints: Vec<String>,
}

impl ServiceInstance {
    /// Starts a builder for an instance of `name` with a generated id.
    pub fn builder(name: impl Into<String>) -> ServiceInstanceBuilder {
        ServiceInstanceBuilder {
            instance: ServiceInstance {
                id: nanoid::nanoid!(),
                name: name.into(),
                version: String::new(),
                metadata: HashMap::new(),
                endpoints: Vec::new(),
            },
        }
    }

    /// Instance identity, unique per registration
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Logical service name used as the discovery key
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Connection URIs, one per exposed scheme
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

#[derive(Debug, Clone)]
pub struct ServiceInstanceBuilder {
    instance: ServiceInstance,
}

impl ServiceInstanceBuilder {
    pub fn id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.instance.id = id.into();
        self
    }

    pub fn version(
        mut self,
        version: impl Into<String>,
    ) -> Self {
        self.instance.version = version.into();
        self
    }

    pub fn metadata(
        mut self,
        metadata: HashMap<String, String>,
    ) -> Self {
        self.instance.metadata = metadata;
        self
    }

    pub fn meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.instance.metadata.insert(key.into(), value.into());
        self
    }

    pub fn endpoint(
        mut self,
        endpoint: impl Into<String>,
    ) -> Self {
        self.instance.endpoints.push(endpoint.into());
        self
    }

    pub fn endpoints<I, S>(
        mut self,
        endpoints: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instance.endpoints.extend(endpoints.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> ServiceInstance {
        self.instance
    }
}
