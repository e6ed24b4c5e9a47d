use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Proxy endpoints handed to addon agents on the managed cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub no_proxy: String,
}

impl ProxyConfig {
    pub fn is_empty(&self) -> bool {
        self.http_proxy.is_empty() && self.https_proxy.is_empty() && self.no_proxy.is_empty()
    }
}

/// How an addon agent reaches out of the managed cluster.
///
/// - `Disabled` (serialized as the empty string): no proxy settings injected.
/// - `OCPGlobalProxy`: use the platform proxy detected into
///   `status.ocpGlobalProxy`.
/// - `CustomProxy`: use `spec.proxyConfig` as given by the administrator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ProxyPolicy {
    #[default]
    #[serde(rename = "")]
    Disabled,
    OCPGlobalProxy,
    CustomProxy,
}

/// Per-addon block of the configuration object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonAgentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_policy: ProxyPolicy,
}

impl AddonAgentConfig {
    pub fn on() -> Self {
        Self {
            enabled: true,
            proxy_policy: ProxyPolicy::Disabled,
        }
    }
}
