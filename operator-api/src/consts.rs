/// API group of the custom cluster resource.
pub const API_GROUP: &str = "mongodb.com";
/// API version of the custom cluster resource.
pub const API_VERSION: &str = "v1alpha1";
/// Plural resource name, used in labels and the CRD definition.
pub const RESOURCE_PLURAL: &str = "mongoclusterconfigurations";

/// MongoDB wire port exposed by every replica-set member.
pub const MONGO_PORT: i32 = 27017;
/// Default container image run by each pod in the stateful workload.
pub const MONGO_IMAGE: &str = "mongo:3.6.4";

/// Default values applied when the cluster resource omits them.
pub const DEFAULT_CPU_LIMIT: &str = "100m";
pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_MEMORY_LIMIT: &str = "64Mi";
pub const DEFAULT_MEMORY_REQUEST: &str = "64Mi";
pub const DEFAULT_STORAGE_NAME: &str = "mongo-storage";
pub const DEFAULT_STORAGE_SIZE: &str = "30Gi";
pub const DEFAULT_STORAGE_DATA_PATH: &str = "/data/db";
pub const DEFAULT_BACKUP_PREFIX: &str = "backups";

/// Suffix appended to a cluster's name to derive its admin-credentials secret name.
pub const ADMIN_SECRET_SUFFIX: &str = "-admin-credentials";

/// Sentinel value for `backups.restore_from` meaning "pick the newest object".
pub const RESTORE_FROM_LATEST: &str = "latest";

/// Lower/upper bounds on `mongodb.replicas`.
pub const MIN_REPLICAS: i32 = 3;
pub const MAX_REPLICAS: i32 = 50;
