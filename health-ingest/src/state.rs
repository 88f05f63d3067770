use crate::config::Config;
use crate::influx::{InfluxWriter, PointWriter};
use crate::transcode::Transcoder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

// Default to 50 MB if not specified
const DEFAULT_MAX_BODY_BYTES: usize = 52_428_800;
const BYTES_PER_MB: usize = 1_048_576;
const DEFAULT_DUMP_PATH: &str = "payload.json";

pub struct AppState {
    pub auth_token: String,
    pub transcoder: Transcoder,
    pub max_request_body_bytes: usize,
    // Last accepted raw body is written here; None disables the dump
    pub payload_dump_path: Option<PathBuf>,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let writer = InfluxWriter::from_config(&cfg.influxdb)?;
        let mut state = AppState::new(cfg.auth_token.clone(), Arc::new(writer));

        if let Some(max) = cfg.max_request_body_bytes {
            state.max_request_body_bytes = max;
        }
        debug!(
            "Maximum request body size: {} bytes ({} MB)",
            state.max_request_body_bytes,
            state.max_request_body_bytes / BYTES_PER_MB
        );

        state.payload_dump_path = match cfg.payload_dump_path.as_deref() {
            Some("") => {
                info!("Payload dump disabled");
                None
            }
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_DUMP_PATH)),
        };
        if let Some(path) = &state.payload_dump_path {
            debug!("Last payload will be written to {}", path.display());
        }

        Ok(state)
    }

    /// State with defaults and the given writer; no payload dump.
    pub fn new(auth_token: String, writer: Arc<dyn PointWriter>) -> Self {
        AppState {
            auth_token,
            transcoder: Transcoder::new(writer),
            max_request_body_bytes: DEFAULT_MAX_BODY_BYTES,
            payload_dump_path: None,
        }
    }
}
