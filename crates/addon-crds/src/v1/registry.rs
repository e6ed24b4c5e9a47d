use super::config::KlusterletAddonConfigSpec;
use super::types::ProxyPolicy;

/// Capability record for one addon: everything the reconcilers need to treat
/// addons generically instead of branching per name.
#[derive(Clone, Copy)]
pub struct AddonCapability {
    /// Registration-record name, also the work-name suffix.
    pub name: &'static str,
    pub display_name: &'static str,
    /// Kind of the custom resource dispatched to the managed cluster.
    pub crd_kind: &'static str,
    pub crd_plural: &'static str,
    /// Whether the agent authenticates back to the hub, which in turn gates
    /// certificate auto-approval.
    pub requires_hub_kubeconfig: bool,
    /// Image-manifest keys the agent needs resolved for its version.
    pub image_keys: &'static [&'static str],
    pub enabled: fn(&KlusterletAddonConfigSpec) -> bool,
    pub proxy_policy: fn(&KlusterletAddonConfigSpec) -> ProxyPolicy,
}

impl std::fmt::Debug for AddonCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonCapability")
            .field("name", &self.name)
            .field("crd_kind", &self.crd_kind)
            .field("requires_hub_kubeconfig", &self.requires_hub_kubeconfig)
            .finish()
    }
}

const ADDONS: &[AddonCapability] = &[
    AddonCapability {
        name: "application-manager",
        display_name: "Application Manager",
        crd_kind: "ApplicationManager",
        crd_plural: "applicationmanagers",
        requires_hub_kubeconfig: true,
        image_keys: &["multicluster_operators_subscription"],
        enabled: |spec| spec.application_manager.enabled,
        proxy_policy: |spec| spec.application_manager.proxy_policy,
    },
    AddonCapability {
        name: "cert-policy-controller",
        display_name: "Certificate Policy Controller",
        crd_kind: "CertPolicyController",
        crd_plural: "certpolicycontrollers",
        requires_hub_kubeconfig: false,
        image_keys: &["cert_policy_controller"],
        enabled: |spec| spec.cert_policy_controller.enabled,
        proxy_policy: |spec| spec.cert_policy_controller.proxy_policy,
    },
    AddonCapability {
        name: "iam-policy-controller",
        display_name: "IAM Policy Controller",
        crd_kind: "IAMPolicyController",
        crd_plural: "iampolicycontrollers",
        requires_hub_kubeconfig: false,
        image_keys: &["iam_policy_controller"],
        enabled: |spec| spec.iam_policy_controller.enabled,
        proxy_policy: |spec| spec.iam_policy_controller.proxy_policy,
    },
    AddonCapability {
        name: "policy-controller",
        display_name: "Policy Controller",
        crd_kind: "PolicyController",
        crd_plural: "policycontrollers",
        requires_hub_kubeconfig: true,
        image_keys: &["config_policy_controller", "governance_policy_framework_addon"],
        enabled: |spec| spec.policy_controller.enabled,
        proxy_policy: |spec| spec.policy_controller.proxy_policy,
    },
    AddonCapability {
        name: "search-collector",
        display_name: "Search Collector",
        crd_kind: "SearchCollector",
        crd_plural: "searchcollectors",
        requires_hub_kubeconfig: true,
        image_keys: &["search_collector"],
        enabled: |spec| spec.search_collector.enabled,
        proxy_policy: |spec| spec.search_collector.proxy_policy,
    },
    AddonCapability {
        name: "work-manager",
        display_name: "Work Manager",
        crd_kind: "WorkManager",
        crd_plural: "workmanagers",
        requires_hub_kubeconfig: true,
        image_keys: &["multicloud_manager"],
        // The work manager is the delivery channel's own agent and cannot be
        // switched off through the configuration object.
        enabled: |_| true,
        proxy_policy: |_| ProxyPolicy::Disabled,
    },
];

/// Immutable table of known addons, constructed once at startup and carried
/// by reference in the controller context.
#[derive(Clone, Debug)]
pub struct AddonRegistry {
    addons: Vec<AddonCapability>,
}

impl Default for AddonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self {
            addons: ADDONS.to_vec(),
        }
    }

    pub fn addons(&self) -> impl Iterator<Item = &AddonCapability> {
        self.addons.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AddonCapability> {
        self.addons.iter().find(|cap| cap.name == name)
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}
