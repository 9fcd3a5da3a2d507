//! Tagged error values, replacing the exception-based / message-string
//! discriminated control flow of the source implementation.

use std::fmt;

/// Errors surfaced by the Kubernetes gateway (C2).
///
/// `NotFound` is deliberately not a variant here: the gateway returns it as
/// an `Option`/`Result<T, NotFound>` at each call site instead, since the
/// source treats a missing object as a first-class value, not an error.
#[derive(thiserror::Error, Debug)]
pub enum K8sGatewayError {
    #[error("kubernetes api error")]
    Api(#[from] kube::Error),
    #[error("missing required field {0} on object")]
    MissingField(&'static str),
}

/// Tagged replacement for the source's message-string discriminators on
/// Mongo admin-command failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MongoStatusError {
    /// `Status()` failed because the replica set has not been initiated yet.
    NoReplsetConfigReceived,
    /// A write was attempted against a non-primary member.
    NotMaster,
    /// `createUser` failed because the user already exists (treated as success).
    UserAlreadyExists,
    /// Any other driver error, kept verbatim for logging.
    Other(String),
}

impl fmt::Display for MongoStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReplsetConfigReceived => write!(f, "no replset config has been received"),
            Self::NotMaster => write!(f, "couldn't add user: not master"),
            Self::UserAlreadyExists => write!(f, "user already exists"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl MongoStatusError {
    /// Classifies a raw driver error message the way the source matches on
    /// exact substrings, but as a single decision point instead of scattered
    /// string comparisons.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if raw.contains("no replset config has been received") {
            Self::NoReplsetConfigReceived
        } else if raw.contains("not master") {
            Self::NotMaster
        } else if raw.contains("already exists") {
            Self::UserAlreadyExists
        } else {
            Self::Other(raw.to_owned())
        }
    }

    /// Whether this error is expected to resolve itself if retried after a
    /// brief wait (a transient topology condition), as opposed to a fatal
    /// misconfiguration.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotMaster)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MongoError {
    #[error("mongo driver error: {0}")]
    Driver(#[from] mongodb::error::Error),
    #[error("mongo status error: {0}")]
    Status(MongoStatusError),
    #[error("mongo command did not complete after {0} retries")]
    RetriesExhausted(u32),
    #[error("unexpected replica-set status response: {0}")]
    UnexpectedResponse(String),
    #[error("bson serialization error: {0}")]
    Bson(#[from] bson::ser::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("no backup objects found under prefix")]
    NoObjectsFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum InvalidSpecError {
    #[error("cluster spec validation failed: {0}")]
    Validation(#[from] garde::Report),
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
}

/// Error from reconciling a single sub-resource (C5). Any variant other than
/// a transport 404 aborts reconciliation of *this* cluster only.
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    K8s(#[from] K8sGatewayError),
    #[error(transparent)]
    Mongo(#[from] MongoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpecError),
    #[error("subprocess {0} failed with status {1}")]
    SubprocessFailure(&'static str, std::process::ExitStatus),
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
