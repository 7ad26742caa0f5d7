//! Persisted-output writer (component M, §4.M, §6.5): the two JSON reports
//! written at the end of a run.

use std::path::Path;

use serde::Serialize;

use crate::error::HarnessError;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTimesReport {
    pub experiment: u32,
    pub service_times: Vec<i64>,
    pub server_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_request_after_migration_triggered: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_timestamps: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_methods: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_body_sizes: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_body_sizes: Vec<usize>,
    pub connection_ended_due_to_timeout: bool,
    pub seed: u64,
}

impl ServiceTimesReport {
    /// Writes this report as pretty JSON to `path`.
    ///
    /// # Errors
    /// On an I/O or serialization failure.
    pub async fn write_to_path(&self, path: &Path) -> Result<(), HarnessError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| HarnessError::internal(format!("failed to serialize report: {e}")))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| HarnessError::internal(format!("failed to write {path:?}: {e}")))
    }

    /// The file name for a single-client run, or `service_times_{seed}.json`
    /// for multi-client variants (§6.5).
    #[must_use]
    pub fn file_name(seed: Option<u64>) -> String {
        match seed {
            Some(seed) => format!("service_times_{seed}.json"),
            None => "service_times.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationNotificationReport {
    pub migration_notification_time: Option<u64>,
}

impl MigrationNotificationReport {
    #[must_use]
    pub fn from_duration(duration: Option<std::time::Duration>) -> Self {
        Self {
            migration_notification_time: duration.map(|d| d.as_micros() as u64),
        }
    }

    /// Writes this report as pretty JSON to `path`.
    ///
    /// # Errors
    /// On an I/O or serialization failure.
    pub async fn write_to_path(&self, path: &Path) -> Result<(), HarnessError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| HarnessError::internal(format!("failed to serialize report: {e}")))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| HarnessError::internal(format!("failed to write {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_times_report_round_trips_through_json() {
        let report = ServiceTimesReport {
            experiment: 2,
            service_times: vec![100, 200, 300],
            server_addresses: vec!["127.0.0.1:9000".to_string()],
            seed: 42,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service_times.json");
        report.write_to_path(&path).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["experiment"], 2);
        assert_eq!(value["seed"], 42);
        assert!(value.get("requestTimestamps").is_none());
    }

    #[test]
    fn file_name_tags_multi_client_runs_with_the_seed() {
        assert_eq!(ServiceTimesReport::file_name(None), "service_times.json");
        assert_eq!(
            ServiceTimesReport::file_name(Some(7)),
            "service_times_7.json"
        );
    }

    #[tokio::test]
    async fn migration_notification_report_serializes_null_when_never_reached() {
        let report = MigrationNotificationReport::from_duration(None);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration_notification_time.json");
        report.write_to_path(&path).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(value["migrationNotificationTime"].is_null());
    }
}
