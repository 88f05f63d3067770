use crate::config::InfluxDb;
use crate::error::WriteError;
use crate::line_protocol::Point;
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, info};

const DEFAULT_HOST: &str = "localhost:8086";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Destination for transcoded points. Each call completes before the next record is handled.
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<(), WriteError>;
}

/// Writes points to the InfluxDB v2 `/api/v2/write` endpoint, one request per point.
pub struct InfluxWriter {
    client: Client,
    write_url: Url,
    token: String,
}

impl InfluxWriter {
    pub fn from_config(cfg: &InfluxDb) -> anyhow::Result<Self> {
        let timeout =
            std::time::Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder().timeout(timeout).build()?;
        debug!("InfluxDB client created with timeout: {:?}", timeout);

        let host = cfg.host.as_deref().unwrap_or(DEFAULT_HOST);
        let write_url = write_url(host, &cfg.org, &cfg.bucket)?;
        info!(org = %cfg.org, bucket = %cfg.bucket, "Using InfluxDB server at {}", host);

        Ok(InfluxWriter {
            client,
            write_url,
            token: cfg.token.clone(),
        })
    }
}

fn write_url(host: &str, org: &str, bucket: &str) -> anyhow::Result<Url> {
    let base = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    // Url::join drops the last path segment unless it ends with a slash
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
        .map_err(|e| anyhow::anyhow!("Invalid InfluxDB host '{}': {}", host, e))?;
    let mut url = base.join("api/v2/write")?;
    url.query_pairs_mut()
        .append_pair("org", org)
        .append_pair("bucket", bucket)
        .append_pair("precision", "s");
    Ok(url)
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write_point(&self, point: &Point) -> Result<(), WriteError> {
        let line = point.to_line_protocol();
        debug!(measurement = %point.measurement, "Writing point");

        let resp = self
            .client
            .post(self.write_url.clone())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WriteError::Rejected { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every written point; fails writes for the listed measurements.
    #[derive(Default)]
    pub struct RecordingWriter {
        pub points: Mutex<Vec<Point>>,
        pub failing_measurements: Vec<String>,
    }

    impl RecordingWriter {
        pub fn failing(measurements: &[&str]) -> Self {
            RecordingWriter {
                points: Mutex::new(Vec::new()),
                failing_measurements: measurements.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub fn written(&self) -> Vec<Point> {
            self.points.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PointWriter for RecordingWriter {
        async fn write_point(&self, point: &Point) -> Result<(), WriteError> {
            if self.failing_measurements.contains(&point.measurement) {
                return Err(WriteError::Rejected {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "unavailable".to_string(),
                });
            }
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }
    }
}
