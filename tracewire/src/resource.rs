//! Immutable description of the entity producing telemetry.

use crate::{Key, KeyValue, Value};
use std::sync::Arc;

/// Well-known resource attribute key for the logical service name.
pub const SERVICE_NAME: &str = "service.name";
/// Well-known resource attribute key for the service version.
pub const SERVICE_VERSION: &str = "service.version";
/// Well-known resource attribute key for the host name.
pub const HOST_NAME: &str = "host.name";
/// Resource attribute key naming this SDK.
pub const SDK_NAME: &str = "telemetry.sdk.name";
/// Resource attribute key carrying this SDK's version.
pub const SDK_VERSION: &str = "telemetry.sdk.version";

/// An immutable set of attributes describing the process that emits spans.
///
/// Built once at startup and shared by reference with every exported span.
/// Cloning is cheap: the attribute set lives behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: Vec<KeyValue>,
}

impl Resource {
    /// Start building a `Resource`.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// A resource with no attributes at all, not even the SDK identity.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner { attrs: Vec::new() }),
        }
    }

    /// Returns the value of the attribute with the given key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.inner
            .attrs
            .iter()
            .find(|kv| &kv.key == key)
            .map(|kv| &kv.value)
    }

    /// Iterate over all attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.inner.attrs.iter()
    }

    /// Number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Whether this resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }
}

/// Builder for [`Resource`].
///
/// Later writes to the same key win; the SDK identity attributes are always
/// present in the built resource.
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attrs: Vec<KeyValue>,
}

impl ResourceBuilder {
    /// Set the `service.name` attribute.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name))
    }

    /// Set the `service.version` attribute.
    pub fn with_service_version(self, version: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_VERSION, version))
    }

    /// Set the `host.name` attribute.
    pub fn with_host_name(self, host: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(HOST_NAME, host))
    }

    /// Add a single attribute.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.push(kv);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attrs: T) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Build the `Resource`, deduplicating keys with last-write-wins.
    pub fn build(self) -> Resource {
        let mut attrs: Vec<KeyValue> = vec![
            KeyValue::new(SDK_NAME, "tracewire"),
            KeyValue::new(SDK_VERSION, env!("CARGO_PKG_VERSION")),
        ];
        for kv in self.attrs {
            match attrs.iter_mut().find(|existing| existing.key == kv.key) {
                Some(existing) => existing.value = kv.value,
                None => attrs.push(kv),
            }
        }
        Resource {
            inner: Arc::new(ResourceInner { attrs }),
        }
    }
}
