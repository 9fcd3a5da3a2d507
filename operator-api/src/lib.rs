//! Shared constants and small wire types for the MongoDB cluster operator.
//!
//! Kept as its own crate so that future satellite binaries (e.g. a
//! backup-verification CLI) can depend on the operator's vocabulary
//! without pulling in `kube`/`mongodb` client code.

pub mod consts;
pub mod labels;

pub use labels::OwnerLabels;
