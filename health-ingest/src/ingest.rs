use crate::payload::Payload;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const FORBIDDEN_BODY: &str = "missing or invalid Authorization header";

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, StatusCode> {
    debug!("Received data request");

    // Only POST is allowed for this endpoint
    if req.method() != Method::POST {
        warn!("Method not allowed: {}", req.method());
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }

    let supplied = req.headers().get(AUTHORIZATION);
    let authorized = supplied
        .map(|v| v.as_bytes() == state.auth_token.as_bytes())
        .unwrap_or(false);
    if !authorized {
        // Never log the supplied or expected secret
        warn!(
            header_present = supplied.is_some(),
            "Rejected request with invalid Authorization header"
        );
        return Ok((StatusCode::FORBIDDEN, FORBIDDEN_BODY).into_response());
    }

    let mut req = req;
    let body_bytes = match to_bytes(req.body_mut(), state.max_request_body_bytes).await {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read request body: {:?}", e);
            return Err(e);
        }
    };

    let payload: Payload = match serde_json::from_slice(&body_bytes) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to parse payload: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    if let Some(path) = &state.payload_dump_path {
        if let Err(e) = tokio::fs::write(path, &body_bytes).await {
            warn!("Failed to write payload dump to {}: {}", path.display(), e);
        }
    }

    info!(
        metrics = payload.data.metrics.len(),
        workouts = payload.data.workouts.len(),
        "Decoded payload"
    );

    // Every metric is attempted even after a failure; the response reports any of them
    let mut has_errors = false;
    for metric in &payload.data.metrics {
        match state.transcoder.process(metric).await {
            Ok(written) => {
                debug!(metric = %metric.name, written, "Metric processed");
            }
            Err(e) if e.is_validation() => {
                warn!(metric = %metric.name, "Rejected record in incoming metric: {}", e);
                has_errors = true;
            }
            Err(e) => {
                error!(metric = %metric.name, "Failed to handle incoming metric: {}", e);
                has_errors = true;
            }
        }
    }

    if has_errors {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(StatusCode::OK.into_response())
}

// Helper to read the full body with size limit
async fn to_bytes(body: &mut Body, max_size: usize) -> Result<Bytes, StatusCode> {
    use axum::body::HttpBody;
    use bytes::BytesMut;

    let mut buf = BytesMut::new();
    let mut total_size: usize = 0;

    while let Some(chunk_res) = body.data().await {
        let chunk = match chunk_res {
            Ok(chunk) => chunk,
            Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        };

        // Check for overflow and size limit
        total_size = match total_size.checked_add(chunk.len()) {
            Some(new_size) if new_size <= max_size => new_size,
            _ => return Err(StatusCode::PAYLOAD_TOO_LARGE),
        };

        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influx::testing::RecordingWriter;
    use crate::line_protocol::FieldValue;
    use serde_json::json;

    const TOKEN: &str = "s3cret";

    fn state_with(writer: Arc<RecordingWriter>) -> Arc<AppState> {
        Arc::new(AppState::new(TOKEN.to_string(), writer))
    }

    fn post(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/data")
            .header("content-type", "application/json");
        if let Some(t) = token {
            builder = builder.header("Authorization", t);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn heart_rate_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "data": {
                "workouts": [],
                "metrics": [{
                    "name": "heart_rate",
                    "units": "count/min",
                    "data": [{ "date": "2024-01-01 08:00:00 +0000", "value": 72 }]
                }]
            }
        }))
        .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.expect("bytes");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn valid_request_writes_points_and_returns_empty_ok() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        let resp = ingest_handler(State(state), post(heart_rate_payload(), Some(TOKEN)))
            .await
            .expect("resp");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "");

        let points = writer.written();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].measurement, "apple_health_heart_rate");
        assert_eq!(points[0].field("value"), Some(&FieldValue::Float(72.0)));
    }

    #[tokio::test]
    async fn wrong_token_is_forbidden_and_writes_nothing() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        for token in [Some("wrong"), None] {
            let resp = ingest_handler(State(state.clone()), post(heart_rate_payload(), token))
                .await
                .expect("resp");
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_string(resp).await, FORBIDDEN_BODY);
        }
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn forbidden_even_when_body_is_garbage() {
        let state = state_with(Arc::new(RecordingWriter::default()));
        let resp = ingest_handler(State(state), post(b"not json".to_vec(), Some("nope")))
            .await
            .expect("resp");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        let state = state_with(Arc::new(RecordingWriter::default()));
        let req = Request::builder()
            .method(Method::GET)
            .uri("/data")
            .header("Authorization", TOKEN)
            .body(Body::empty())
            .unwrap();

        let result = ingest_handler(State(state), req).await;
        assert_eq!(result.unwrap_err(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        let result = ingest_handler(State(state), post(b"{\"data\": [".to_vec(), Some(TOKEN))).await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn failing_metric_does_not_stop_the_others() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        let body = serde_json::to_vec(&json!({
            "data": {
                "metrics": [
                    {
                        "name": "step_count",
                        "units": "count",
                        "data": [{ "date": 12345, "qty": 10 }]
                    },
                    {
                        "name": "heart_rate",
                        "units": "count/min",
                        "data": [
                            { "date": "2024-01-01 08:00:00 +0000", "value": 72 },
                            { "date": "2024-01-01 08:01:00 +0000", "value": 75 }
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        let result = ingest_handler(State(state), post(body, Some(TOKEN))).await;
        assert_eq!(result.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);

        let points = writer.written();
        assert_eq!(points.len(), 2, "the healthy metric is still written");
        assert!(points
            .iter()
            .all(|p| p.measurement == "apple_health_heart_rate"));
    }

    #[tokio::test]
    async fn store_failure_is_internal_error() {
        let writer = Arc::new(RecordingWriter::failing(&["apple_health_heart_rate"]));
        let state = state_with(writer.clone());

        let result = ingest_handler(State(state), post(heart_rate_payload(), Some(TOKEN))).await;
        assert_eq!(result.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn aborted_body_is_internal_error() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        let (sender, body) = Body::channel();
        sender.abort();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/data")
            .header("Authorization", TOKEN)
            .body(body)
            .unwrap();

        let result = ingest_handler(State(state), req).await;
        assert_eq!(result.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn request_body_size_limit_enforced() {
        let mut state = AppState::new(TOKEN.to_string(), Arc::new(RecordingWriter::default()));
        state.max_request_body_bytes = 16;
        let state = Arc::new(state);

        let body = heart_rate_payload();
        assert!(body.len() > 16, "test body should exceed size limit");

        let result = ingest_handler(State(state), post(body, Some(TOKEN))).await;
        assert_eq!(result.unwrap_err(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn accepted_body_is_dumped_to_file() {
        let path = std::env::temp_dir().join(format!(
            "health-ingest-dump-{}.json",
            std::process::id()
        ));
        let mut state = AppState::new(TOKEN.to_string(), Arc::new(RecordingWriter::default()));
        state.payload_dump_path = Some(path.clone());
        let state = Arc::new(state);

        let body = heart_rate_payload();
        let resp = ingest_handler(State(state.clone()), post(body.clone(), Some(TOKEN)))
            .await
            .expect("resp");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(std::fs::read(&path).expect("dump file"), body);

        // A rejected body leaves the previous dump in place
        let result = ingest_handler(State(state), post(b"oops".to_vec(), Some(TOKEN))).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).expect("dump file"), body);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_payload_is_ok() {
        let writer = Arc::new(RecordingWriter::default());
        let state = state_with(writer.clone());

        let resp = ingest_handler(State(state), post(b"{}".to_vec(), Some(TOKEN)))
            .await
            .expect("resp");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(writer.written().is_empty());
    }
}
