// Capture limits
/// If a status document is bigger than this, there's probably something bad happening.
pub const DEFAULT_CAPTURE_CAPACITY: usize = 16 * 1024;

// Phases
pub const PHASE_COMPLETED: &str = "Completed";

// Component names
pub const VELERO_DEPLOYMENT: &str = "velero";
pub const NODE_AGENT_DAEMON_SET: &str = "restic";
pub const VELERO_CLUSTER_ROLE_BINDING: &str = "velero";
pub const FIELD_MANAGER: &str = "velero-e2e";

// Label selectors
pub const VELERO_COMPONENT_SELECTOR: &str = "component=velero";

// Defaults
pub const DEFAULT_VELERO_CLI: &str = "velero";
pub const DEFAULT_VELERO_NAMESPACE: &str = "velero";
pub const DEFAULT_VELERO_IMAGE: &str = "velero/velero:main";

/// The cloud provider name used when the cluster is a local `kind` cluster.
pub const KIND_PROVIDER: &str = "kind";

// Environment variables
pub const ENV_PREFIX: &str = "VELERO_E2E_";
