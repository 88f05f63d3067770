use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxDb {
    // Host and port, optionally with a scheme. Defaults to localhost:8086.
    pub host: Option<String>,
    pub token: String,
    pub org: String,
    pub bucket: String,
    // Request timeout in seconds for writes. Defaults to 10.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listen: Option<String>,
    // Shared secret expected verbatim in the Authorization header.
    pub auth_token: String,
    pub influxdb: InfluxDb,
    // Maximum request body size in bytes. Requests exceeding this will return 413 Payload Too Large.
    // If not set, defaults to 50 MB since exports carrying many days of samples get large.
    pub max_request_body_bytes: Option<usize>,
    // Where the last accepted raw body is written. Empty string disables the dump.
    // If not set, defaults to `payload.json` in the working directory.
    pub payload_dump_path: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let cfg_str = fs::read_to_string(path)?;
        Self::from_toml(&cfg_str)
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("auth_token", &self.auth_token),
            ("influxdb.token", &self.influxdb.token),
            ("influxdb.org", &self.influxdb.org),
            ("influxdb.bucket", &self.influxdb.bucket),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("configuration value '{}' must not be empty", key);
            }
        }
        Ok(())
    }
}
