use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ProxyConfig;

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletAddonConfigStatus {
    /// Platform proxy endpoints detected for the managed cluster. Consumed
    /// when an addon selects the `OCPGlobalProxy` policy.
    #[serde(default)]
    pub ocp_global_proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl KlusterletAddonConfigStatus {
    /// Set or update a condition by type. If a condition with the same type
    /// already exists, update it in place; otherwise append it.
    pub fn set_condition(&mut self, cond: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == cond.condition_type)
        {
            *existing = cond;
        } else {
            self.conditions.push(cond);
        }
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_transition_time: String,
}

/// Well-known condition types for KlusterletAddonConfig status.
pub mod condition_types {
    pub const PROGRESSING: &str = "Progressing";
    pub const COMPLETE: &str = "Complete";
    pub const OCP_GLOBAL_PROXY_DETECTED: &str = "OCPGlobalProxyDetected";
}

impl Condition {
    /// Create a True condition.
    pub fn ok(condition_type: &str, reason: &str, message: &str, now: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: "True".to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: now.to_string(),
        }
    }

    /// Create a False condition.
    pub fn fail(condition_type: &str, reason: &str, message: &str, now: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: "False".to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: now.to_string(),
        }
    }

    /// Equality that disregards the transition timestamp, used to decide
    /// whether a status write is warranted at all.
    pub fn same_as(&self, other: &Condition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
