use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use sqlx::{PgPool, Row};

use crate::models::Sample;

/// Anything that can hand over the full sample set in one go.
pub trait SampleSource {
    fn fetch_samples(&self) -> impl Future<Output = anyhow::Result<Vec<Sample>>> + Send;
}

/// Samples exported to disk, either as a JSON array or as CSV with a header row.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_csv(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }
}

impl SampleSource for FileSource {
    async fn fetch_samples(&self) -> anyhow::Result<Vec<Sample>> {
        let contents = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read samples from {}", self.path.display()))?;

        let samples = if self.is_csv() {
            parse_csv(&contents)
        } else {
            serde_json::from_slice::<Vec<Sample>>(&contents).map_err(anyhow::Error::from)
        }
        .with_context(|| format!("failed to parse samples in {}", self.path.display()))?;

        info!(
            "Loaded {} samples from {}",
            samples.len(),
            self.path.display()
        );
        Ok(samples)
    }
}

fn parse_csv(contents: &[u8]) -> anyhow::Result<Vec<Sample>> {
    let mut reader = csv::Reader::from_reader(contents);
    let mut samples = Vec::new();

    for result in reader.deserialize::<Sample>() {
        samples.push(result?);
    }

    Ok(samples)
}

/// Reads the `battery_samples` table. The table is owned by the ingest side;
/// this source only selects from it.
pub struct PgSampleSource {
    pool: PgPool,
}

impl PgSampleSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SampleSource for PgSampleSource {
    async fn fetch_samples(&self) -> anyhow::Result<Vec<Sample>> {
        let rows = sqlx::query(
            r#"
            SELECT serial_number, academy_id, battery_level, employee_id, recorded_at
            FROM battery_samples
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch battery samples from Postgres")?;

        let mut samples = Vec::with_capacity(rows.len());

        for row in rows {
            let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
            let employee_id: Option<String> = row.try_get("employee_id")?;

            samples.push(Sample {
                serial_number: row.try_get("serial_number")?,
                academy_id: row.try_get("academy_id")?,
                battery_level: row.try_get("battery_level")?,
                employee_id: employee_id.unwrap_or_default(),
                timestamp: recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            });
        }

        info!("Loaded {} samples from Postgres", samples.len());
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_fixture(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("create fixture");
        file.write_all(contents.as_bytes()).expect("write fixture");
        file
    }

    #[tokio::test]
    async fn reads_json_array() {
        let file = write_fixture(
            ".json",
            r#"[
                {"academyId": 10, "batteryLevel": 1, "employeeId": "E1",
                 "serialNumber": "DEV1", "timestamp": "2024-01-01T00:00:00Z"},
                {"academyId": 10, "batteryLevel": 0.9, "employeeId": "E1",
                 "serialNumber": "DEV1", "timestamp": "2024-01-01T12:00:00Z"}
            ]"#,
        );

        let samples = FileSource::new(file.path())
            .fetch_samples()
            .await
            .expect("samples");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].serial_number, "DEV1");
        assert_eq!(samples[0].academy_id, 10);
        assert_eq!(samples[1].battery_level, 0.9);
        assert_eq!(samples[1].employee_id, "E1");
    }

    #[tokio::test]
    async fn accepts_school_id_alias_and_missing_reporter() {
        let file = write_fixture(
            ".json",
            r#"[{"schoolId": 7, "batteryLevel": 0.5,
                 "serialNumber": "DEV2", "timestamp": "2024-01-01T00:00:00Z"}]"#,
        );

        let samples = FileSource::new(file.path())
            .fetch_samples()
            .await
            .expect("samples");
        assert_eq!(samples[0].academy_id, 7);
        assert_eq!(samples[0].employee_id, "");
    }

    #[tokio::test]
    async fn reads_csv_with_header() {
        let file = write_fixture(
            ".csv",
            "serialNumber,academyId,batteryLevel,employeeId,timestamp\n\
             DEV1,3,0.8,E9,2024-01-01T00:00:00Z\n\
             DEV2,4,0.6,E9,2024-01-01T06:00:00Z\n",
        );

        let samples = FileSource::new(file.path())
            .fetch_samples()
            .await
            .expect("samples");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].serial_number, "DEV2");
        assert_eq!(samples[1].academy_id, 4);
        assert_eq!(samples[1].timestamp, "2024-01-01T06:00:00Z");
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let source = FileSource::new("/nonexistent/battery-samples.json");
        let err = source.fetch_samples().await.expect_err("should fail");
        assert!(err.to_string().contains("battery-samples.json"));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let file = write_fixture(".json", r#"{"not": "an array"}"#);
        let err = FileSource::new(file.path())
            .fetch_samples()
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("failed to parse samples"));
    }
}
