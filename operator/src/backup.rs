//! C7: cron-scheduled `mongodump` backups, uploaded to the cluster's
//! configured bucket (spec.md §4.7).

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tracing::{info, warn};

use crate::error::{ReconcileError, StorageError};
use crate::model::{ClusterSpec, SecretRef};
use crate::state::BackupBookkeeping;
use crate::storage_gateway::StorageGateway;

/// The `cron` crate parses 6-field expressions (leading seconds field), but
/// spec.md §6 / the Glossary define `backups.cron` as a standard 5-field
/// expression, and both never carry a seconds field. Prepend `"0 "` so a
/// 5-field expression fires on the minute, the way a 5-field cron always
/// would; an expression that already has 6 fields is passed through as-is.
fn six_field_cron(cron: &str) -> String {
    if cron.split_whitespace().count() == 5 {
        format!("0 {cron}")
    } else {
        cron.to_owned()
    }
}

fn backup_filename(namespace: &str, name: &str, now: chrono::DateTime<Utc>) -> String {
    format!(
        "mongodb-backup-{namespace}-{name}-{timestamp}.archive.gz",
        timestamp = now.format("%Y-%m-%d_%H%M%S")
    )
}

pub struct BackupCoordinator {
    storage: StorageGateway,
}

impl BackupCoordinator {
    #[must_use]
    pub fn new(storage: StorageGateway) -> Self {
        Self { storage }
    }

    /// `BackupIfNeeded(spec)`: compares the cron schedule's next fire time
    /// against the last recorded backup and runs one if due.
    pub async fn backup_if_needed(&self, spec: &ClusterSpec, bookkeeping: &BackupBookkeeping) -> Result<(), ReconcileError> {
        let Some(policy) = &spec.backup else {
            return Ok(());
        };
        let schedule = Schedule::from_str(&six_field_cron(&policy.cron))
            .map_err(|err| ReconcileError::InvalidSpec(crate::error::InvalidSpecError::InvalidCron(err.to_string())))?;

        let key = spec.key();
        let last = bookkeeping.last(&key).unwrap_or_else(|| Utc::now() - chrono::Duration::days(365));
        let due = schedule.after(&last).next().is_some_and(|next_fire| next_fire <= Utc::now());
        if !due {
            return Ok(());
        }

        self.backup(spec, &policy.bucket, &policy.prefix, &policy.credentials).await?;
        bookkeeping.record(key, Utc::now());
        Ok(())
    }

    /// `Backup(spec)`: dumps the last-ordinal member (open question, kept as
    /// the source heuristic) and uploads the archive.
    async fn backup(&self, spec: &ClusterSpec, bucket: &str, prefix: &str, credentials: &SecretRef) -> Result<(), ReconcileError> {
        // TODO: the source always backs up the highest-ordinal member; this
        // does not account for that member being the current primary or even
        // reachable. Left as-is per the open question in SPEC_FULL.md §4.
        let source_ordinal = spec.replicas - 1;
        let host = spec.member_hostname(source_ordinal);

        let now = Utc::now();
        let filename = backup_filename(&spec.namespace, &spec.name, now);
        let local_path = std::env::temp_dir().join(&filename);

        info!(cluster = %spec.name, namespace = %spec.namespace, %host, %filename, "starting mongodump");
        let status = tokio::process::Command::new("mongodump")
            .arg("--host")
            .arg(&host)
            .arg("--gzip")
            .arg(format!("--archive={}", local_path.display()))
            .status()
            .await
            .map_err(StorageError::Io)?;
        if !status.success() {
            return Err(ReconcileError::SubprocessFailure("mongodump", status));
        }

        let result = self.storage.upload(bucket, prefix, credentials, &local_path).await;
        if let Err(err) = tokio::fs::remove_file(&local_path).await {
            warn!(path = %local_path.display(), %err, "failed to remove local backup file after upload");
        }
        result?;
        info!(cluster = %spec.name, namespace = %spec.namespace, %filename, "backup uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_field_cron_prepends_seconds_to_a_5_field_expression() {
        assert_eq!(six_field_cron("0 * * * *"), "0 0 * * * *");
        assert_eq!(six_field_cron("0 0 * * * *"), "0 0 * * * *");
    }

    #[test]
    fn backup_filename_matches_expected_format() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-07-28T10:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(
            backup_filename("default", "mongo-cluster", now),
            "mongodb-backup-default-mongo-cluster-2026-07-28_103000.archive.gz"
        );
    }
}
