//! HTTP client for the central datalink.
//!
//! Two calls: a multipart file upload and a lightweight verify ping.
//! Both carry the station id and, when configured, the shared-secret
//! headers. The server replies 2xx for accepted work; any other status
//! is surfaced with the response body intact so the transfer log can
//! record the server's own wording.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder};
use tokio_util::io::ReaderStream;

use forecourt_core::types::AgentConfig;

use crate::error::{io_err, SyncError};

const HEADER_API_KEY: &str = "X-Api-Key";
const HEADER_CLIENT_ID: &str = "X-Client-Id";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Loose enough for a large archive on a slow uplink, but a stalled server
// must not hold an upload worker open forever.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the agent-facing endpoints of the central server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    station_id: i64,
    api_key: Option<String>,
    client_id: Option<String>,
    upload_timeout: Duration,
}

impl ApiClient {
    /// Build a client from the agent configuration.
    pub fn from_config(config: &AgentConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            station_id: config.station.id,
            api_key: config.api.api_key.clone(),
            client_id: config.api.client_id.clone(),
            upload_timeout: UPLOAD_TIMEOUT,
        })
    }

    /// Stream one file to the upload endpoint.
    ///
    /// The multipart form carries the file under its original name plus
    /// the content digest and the station id, so the server can verify
    /// integrity and attribute the export without trusting the path.
    pub async fn upload(
        &self,
        path: &Path,
        file_name: &str,
        digest: &str,
    ) -> Result<(), SyncError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| io_err(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| io_err(path, e))?
            .len();

        let stream = ReaderStream::new(file);
        let part = Part::stream_with_length(Body::wrap_stream(stream), len)
            .file_name(file_name.to_string());
        let form = Form::new()
            .part("file", part)
            .text("originalHash", digest.to_string())
            .text("istasyonId", self.station_id.to_string());

        let url = format!("{}/api/agent/upload", self.base_url);
        let request = self
            .with_headers(self.http.post(&url))
            .multipart(form)
            .timeout(self.upload_timeout);

        check_status(request.send().await?).await
    }

    /// Ping the verify endpoint. The server learns the station is alive;
    /// the agent learns the credentials still work.
    pub async fn verify(&self) -> Result<(), SyncError> {
        let url = format!("{}/api/agent/verify", self.base_url);
        let request = self
            .with_headers(self.http.get(&url))
            .query(&[("istasyonId", self.station_id)])
            .timeout(VERIFY_TIMEOUT);

        check_status(request.send().await?).await
    }

    fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.api_key {
            request = request.header(HEADER_API_KEY, key);
        }
        if let Some(id) = &self.client_id {
            request = request.header(HEADER_CLIENT_ID, id);
        }
        request
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Api { status, body })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::extract::{Multipart, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use forecourt_core::types::{ApiConfig, ExportFilter, StationConfig};

    #[derive(Default)]
    struct Captured {
        fields: HashMap<String, String>,
        file_name: Option<String>,
        file_bytes: Vec<u8>,
        headers: HashMap<String, String>,
        verify_station: Option<String>,
    }

    type Shared = Arc<Mutex<Captured>>;

    async fn upload_handler(
        State(state): State<Shared>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> StatusCode {
        let mut cap = state.lock().await;
        for (name, value) in &headers {
            cap.headers.insert(
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }
        while let Some(field) = multipart.next_field().await.expect("next field") {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                cap.file_name = field.file_name().map(str::to_string);
                cap.file_bytes = field.bytes().await.expect("file bytes").to_vec();
            } else {
                let value = field.text().await.expect("field text");
                cap.fields.insert(name, value);
            }
        }
        StatusCode::OK
    }

    async fn verify_handler(
        State(state): State<Shared>,
        Query(params): Query<HashMap<String, String>>,
    ) -> StatusCode {
        let mut cap = state.lock().await;
        cap.verify_station = params.get("istasyonId").cloned();
        StatusCode::OK
    }

    async fn failing_upload_handler() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "db unavailable")
    }

    async fn stalled_upload_handler() -> StatusCode {
        std::future::pending::<()>().await;
        StatusCode::OK
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        addr
    }

    fn config_for(addr: SocketAddr, api_key: Option<&str>, client_id: Option<&str>) -> AgentConfig {
        AgentConfig {
            watch_dir: "/tmp/unused".into(),
            api: ApiConfig {
                base_url: format!("http://{addr}"),
                api_key: api_key.map(str::to_string),
                client_id: client_id.map(str::to_string),
            },
            station: StationConfig {
                id: 17,
                expected_code: None,
            },
            exports: ExportFilter::default(),
            heartbeat_interval_secs: 300,
            upload_concurrency: 4,
        }
    }

    #[tokio::test]
    async fn upload_sends_file_digest_station_and_headers() {
        let state: Shared = Shared::default();
        let router = Router::new()
            .route("/api/agent/upload", post(upload_handler))
            .with_state(state.clone());
        let addr = serve(router).await;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("20260825_shift.zip");
        std::fs::write(&path, b"zip bytes").expect("write fixture");

        let client =
            ApiClient::from_config(&config_for(addr, Some("k-123"), Some("station-17")))
                .expect("client");
        client
            .upload(&path, "20260825_shift.zip", "cafe")
            .await
            .expect("upload");

        let cap = state.lock().await;
        assert_eq!(cap.file_name.as_deref(), Some("20260825_shift.zip"));
        assert_eq!(cap.file_bytes, b"zip bytes");
        assert_eq!(cap.fields.get("originalHash").map(String::as_str), Some("cafe"));
        assert_eq!(cap.fields.get("istasyonId").map(String::as_str), Some("17"));
        assert_eq!(cap.headers.get("x-api-key").map(String::as_str), Some("k-123"));
        assert_eq!(
            cap.headers.get("x-client-id").map(String::as_str),
            Some("station-17")
        );
    }

    #[tokio::test]
    async fn secret_headers_are_omitted_when_unconfigured() {
        let state: Shared = Shared::default();
        let router = Router::new()
            .route("/api/agent/upload", post(upload_handler))
            .with_state(state.clone());
        let addr = serve(router).await;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a.xml");
        std::fs::write(&path, b"<x/>").expect("write fixture");

        let client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        client.upload(&path, "a.xml", "00").await.expect("upload");

        let cap = state.lock().await;
        assert!(!cap.headers.contains_key("x-api-key"));
        assert!(!cap.headers.contains_key("x-client-id"));
    }

    #[tokio::test]
    async fn upload_failure_carries_status_and_server_body() {
        let router = Router::new().route("/api/agent/upload", post(failing_upload_handler));
        let addr = serve(router).await;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a.xml");
        std::fs::write(&path, b"<x/>").expect("write fixture");

        let client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        let err = client
            .upload(&path, "a.xml", "00")
            .await
            .expect_err("server rejects");

        match &err {
            SyncError::Api { status, body } => {
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "db unavailable");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(err.upload_message(), "db unavailable");
    }

    #[tokio::test]
    async fn stalled_upload_times_out_instead_of_hanging() {
        let router = Router::new().route("/api/agent/upload", post(stalled_upload_handler));
        let addr = serve(router).await;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a.xml");
        std::fs::write(&path, b"<x/>").expect("write fixture");

        let mut client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        client.upload_timeout = Duration::from_millis(200);

        let err = client
            .upload(&path, "a.xml", "00")
            .await
            .expect_err("stalled server");
        match err {
            SyncError::Http(e) => assert!(e.is_timeout(), "expected a timeout, got {e}"),
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_of_missing_file_reports_the_path() {
        let state: Shared = Shared::default();
        let router = Router::new()
            .route("/api/agent/upload", post(upload_handler))
            .with_state(state.clone());
        let addr = serve(router).await;

        let client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        let err = client
            .upload(Path::new("/nonexistent/gone.xml"), "gone.xml", "00")
            .await
            .expect_err("missing file");
        assert!(matches!(err, SyncError::Io { .. }));
    }

    #[tokio::test]
    async fn verify_passes_the_station_id_as_query() {
        let state: Shared = Shared::default();
        let router = Router::new()
            .route("/api/agent/verify", get(verify_handler))
            .with_state(state.clone());
        let addr = serve(router).await;

        let client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        client.verify().await.expect("verify");

        let cap = state.lock().await;
        assert_eq!(cap.verify_station.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn verify_failure_is_an_api_error() {
        let router = Router::new().route(
            "/api/agent/verify",
            get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let addr = serve(router).await;

        let client = ApiClient::from_config(&config_for(addr, None, None)).expect("client");
        let err = client.verify().await.expect_err("unauthorized");
        assert!(matches!(err, SyncError::Api { status, .. } if status == StatusCode::UNAUTHORIZED));
    }
}
