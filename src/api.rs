//! HTTP surface for Drive Digest.
//!
//! This module exposes a compact Axum router for the single-user web flow:
//!
//! - `GET /` – Landing page with the connect link and the process button.
//! - `GET /auth/login` – Redirect to the provider's authorization URL.
//! - `GET /auth/callback` – Exchange the authorization code and store the credential.
//! - `POST /process` – Start a run in the background and redirect to the progress page.
//! - `GET /processing` – Progress page polling `GET /process/status`.
//! - `GET /process/status` – JSON progress snapshot.
//! - `POST /process/stop` – Ask the active run to stop before its next file.
//! - `GET /results` – HTML table of the last run.
//! - `GET /download` – CSV export of the last run.
//! - `GET /download/pdf` – PDF export of the last run.
//! - `GET /health` – Liveness probe.
//!
//! The session (credential, pending authorization, last results) lives in [`AppState`], shared by
//! every handler through the router state.

use crate::auth::{AuthError, Credential, OAuthClient};
use crate::processing::{ProcessingApi, ProcessingError, RunProgress, RunResult};
use crate::render::{self, RenderError};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared state behind the router: the pipeline, the OAuth client, and the user session.
pub struct AppState<S> {
    service: Arc<S>,
    oauth: OAuthClient,
    progress: Arc<RunProgress>,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    credential: Option<Credential>,
    pending: Option<PendingAuthorization>,
    last_result: Option<Arc<RunResult>>,
}

struct PendingAuthorization {
    state: String,
    pkce_verifier: String,
}

impl<S> AppState<S>
where
    S: ProcessingApi + 'static,
{
    /// Create state with an empty session.
    pub fn new(service: Arc<S>, oauth: OAuthClient) -> Self {
        Self {
            service,
            oauth,
            progress: Arc::new(RunProgress::new()),
            session: Mutex::new(Session::default()),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn valid_credential(&self) -> Result<Credential, AuthError> {
        match &self.session().credential {
            Some(credential) if credential.is_valid() => Ok(credential.clone()),
            Some(_) => Err(AuthError::Expired),
            None => Err(AuthError::MissingCredential),
        }
    }

    fn last_result(&self) -> Option<Arc<RunResult>> {
        self.session().last_result.clone()
    }

    fn exportable_result(&self) -> Result<Arc<RunResult>, AppError> {
        self.last_result()
            .filter(|result| !result.is_empty())
            .ok_or(AppError::NotFound("No results to export yet"))
    }

    /// Run the pipeline to completion and publish its outcome to the session.
    async fn execute_run(self: Arc<Self>, credential: Credential) {
        let outcome = self.service.run(credential, self.progress.clone()).await;
        match outcome {
            Ok(result) => {
                let stopped = result.stopped;
                let error = result.error.clone();
                self.session().last_result = Some(Arc::new(result));
                self.progress.finish(stopped, error);
            }
            Err(error) => {
                tracing::error!(error = %error, "Processing run failed");
                if matches!(error, ProcessingError::Auth(_)) {
                    self.session().credential = None;
                }
                self.progress.finish(false, Some(error.to_string()));
            }
        }
    }
}

/// Build the HTTP router for the web flow.
pub fn create_router<S>(state: Arc<AppState<S>>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/", get(landing::<S>))
        .route("/auth/login", get(login::<S>))
        .route("/auth/callback", get(callback::<S>))
        .route("/process", post(start_processing::<S>))
        .route("/processing", get(processing))
        .route("/process/status", get(status::<S>))
        .route("/process/stop", post(stop::<S>))
        .route("/results", get(results::<S>))
        .route("/download", get(download::<S>))
        .route("/download/pdf", get(download_pdf::<S>))
        .route("/health", get(health))
        .with_state(state)
}

async fn landing<S>(State(state): State<Arc<AppState<S>>>) -> Html<String>
where
    S: ProcessingApi + 'static,
{
    let authenticated = state.valid_credential().is_ok();
    let last_run = state.last_result();
    Html(render::landing_page(
        authenticated,
        &state.progress.snapshot(),
        last_run.as_deref(),
    ))
}

/// Start the authorization flow, remembering `state` and the PKCE verifier for the callback.
async fn login<S>(State(state): State<Arc<AppState<S>>>) -> Redirect
where
    S: ProcessingApi + 'static,
{
    let request = state.oauth.authorization_request();
    state.session().pending = Some(PendingAuthorization {
        state: request.state,
        pkce_verifier: request.pkce_verifier,
    });
    Redirect::to(&request.url)
}

/// Query parameters delivered by the provider on the callback.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Finish the authorization flow and store the credential in the session.
async fn callback<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError>
where
    S: ProcessingApi + 'static,
{
    let pending = state.session().pending.take();
    if let Some(error) = params.error {
        return Err(AuthError::Denied(error).into());
    }
    let pending = pending.ok_or(AuthError::StateMismatch)?;
    if params.state.as_deref() != Some(pending.state.as_str()) {
        tracing::warn!("Authorization callback state mismatch");
        return Err(AuthError::StateMismatch.into());
    }
    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or(AuthError::MissingCode)?;

    let credential = state
        .oauth
        .exchange_code(&code, &pending.pkce_verifier)
        .await?;
    state.session().credential = Some(credential);
    tracing::info!("Drive connected");
    Ok(Redirect::to("/"))
}

/// Start a run in the background. Redirects to the progress page when a run is already active.
async fn start_processing<S>(State(state): State<Arc<AppState<S>>>) -> Result<Redirect, AppError>
where
    S: ProcessingApi + 'static,
{
    let credential = state.valid_credential()?;
    match state.progress.try_begin() {
        Ok(()) => {}
        Err(ProcessingError::AlreadyRunning) => {
            tracing::debug!("Run already active; redirecting to progress page");
            return Ok(Redirect::to("/processing"));
        }
        Err(error) => return Err(error.into()),
    }

    state.session().last_result = None;
    tokio::spawn(state.clone().execute_run(credential));
    Ok(Redirect::to("/processing"))
}

async fn processing() -> Html<String> {
    Html(render::processing_page())
}

async fn status<S>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse
where
    S: ProcessingApi + 'static,
{
    Json(state.progress.snapshot())
}

async fn stop<S>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse
where
    S: ProcessingApi + 'static,
{
    let stop_requested = state.progress.request_stop();
    if stop_requested {
        tracing::info!("Stop requested by user");
    }
    Json(json!({ "stop_requested": stop_requested }))
}

async fn results<S>(State(state): State<Arc<AppState<S>>>) -> Html<String>
where
    S: ProcessingApi + 'static,
{
    let last_run = state.last_result();
    Html(render::results_page(last_run.as_deref()))
}

/// CSV export of the last run; 404 when there is nothing to export.
async fn download<S>(State(state): State<Arc<AppState<S>>>) -> Result<Response, AppError>
where
    S: ProcessingApi + 'static,
{
    let result = state.exportable_result()?;
    let body = render::results_csv(&result)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"drive_summaries.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// PDF export of the last run; 404 when there is nothing to export.
async fn download_pdf<S>(State(state): State<Arc<AppState<S>>>) -> Result<Response, AppError>
where
    S: ProcessingApi + 'static,
{
    let result = state.exportable_result()?;
    let body = render::results_pdf(&result)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"drive_summaries.pdf\"",
            ),
        ],
        body,
    )
        .into_response())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

enum AppError {
    Auth(AuthError),
    Processing(ProcessingError),
    Render(RenderError),
    NotFound(&'static str),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(error) => auth_status(error),
            Self::Processing(ProcessingError::Auth(error)) => auth_status(error),
            Self::Processing(ProcessingError::AlreadyRunning) => StatusCode::CONFLICT,
            Self::Processing(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Auth(error) => error.to_string(),
            Self::Processing(error) => error.to_string(),
            Self::Render(error) => error.to_string(),
            Self::NotFound(message) => (*message).to_string(),
        }
    }
}

fn auth_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::MissingCredential | AuthError::Expired => StatusCode::UNAUTHORIZED,
        AuthError::StateMismatch | AuthError::Denied(_) | AuthError::MissingCode => {
            StatusCode::BAD_REQUEST
        }
        AuthError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Http(_) | AuthError::TokenExchange(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        }
        let title = status.canonical_reason().unwrap_or("Error");
        (status, Html(render::error_page(title, &message))).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(inner: AuthError) -> Self {
        Self::Auth(inner)
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<RenderError> for AppError {
    fn from(inner: RenderError) -> Self {
        Self::Render(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::DocumentFormat;
    use crate::processing::{FileStatus, ProcessedFile};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use httpmock::{Method::POST, MockServer};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct StubProcessingService {
        calls: Arc<AsyncMutex<Vec<String>>>,
        result: RunResult,
    }

    impl StubProcessingService {
        fn new(result: RunResult) -> Self {
            Self {
                calls: Arc::new(AsyncMutex::new(Vec::new())),
                result,
            }
        }

        async fn recorded_calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl ProcessingApi for StubProcessingService {
        async fn run(
            &self,
            credential: Credential,
            progress: Arc<RunProgress>,
        ) -> Result<RunResult, ProcessingError> {
            self.calls
                .lock()
                .await
                .push(credential.access_token().to_string());
            progress.set_total(self.result.files.len());
            Ok(self.result.clone())
        }
    }

    fn sample_result() -> RunResult {
        let file = ProcessedFile {
            id: "id-1".into(),
            name: "report, final.pdf".into(),
            format: DocumentFormat::Pdf,
            extracted_text: "text".into(),
            summary: "A short summary.".into(),
            status: FileStatus::Ok,
            backend_calls: 1,
            failed_chunks: 0,
        };
        RunResult {
            files: vec![file],
            files_seen: 1,
            files_processed: 1,
            ..RunResult::default()
        }
    }

    fn oauth(token_url: String) -> OAuthClient {
        OAuthClient::new(
            "client-id",
            "client-secret",
            "http://localhost:4100/auth/callback",
            "https://accounts.google.com/o/oauth2/v2/auth",
            token_url,
            Duration::from_secs(5),
        )
        .expect("oauth client")
    }

    fn state_with(
        service: StubProcessingService,
        token_url: String,
    ) -> Arc<AppState<StubProcessingService>> {
        Arc::new(AppState::new(Arc::new(service), oauth(token_url)))
    }

    fn state() -> Arc<AppState<StubProcessingService>> {
        state_with(
            StubProcessingService::new(sample_result()),
            "http://127.0.0.1:9/token".into(),
        )
    }

    fn authenticate(state: &AppState<StubProcessingService>) {
        state.session().credential = Some(Credential::new("session-token", None));
    }

    async fn send(
        state: &Arc<AppState<StubProcessingService>>,
        method: Method,
        uri: &str,
    ) -> Response {
        create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response")
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location header")
    }

    async fn wait_for_run(state: &AppState<StubProcessingService>) {
        for _ in 0..100 {
            if !state.progress.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run did not finish");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = send(&state(), Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"ok\""));
    }

    #[tokio::test]
    async fn process_requires_a_credential() {
        let state = state();
        let response = send(&state, Method::POST, "/process").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Not authenticated"));
    }

    #[tokio::test]
    async fn expired_credential_is_rejected() {
        let state = state();
        state.session().credential = Some(Credential::new(
            "old",
            Some(time::OffsetDateTime::now_utc() - time::Duration::hours(1)),
        ));

        let response = send(&state, Method::POST, "/process").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_redirects_and_remembers_state() {
        let state = state();
        let response = send(&state, Method::GET, "/auth/login").await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = location(&response).to_string();
        assert!(target.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        let pending_state = state
            .session()
            .pending
            .as_ref()
            .map(|pending| pending.state.clone())
            .expect("pending authorization");
        assert!(target.contains(&format!("state={pending_state}")));
    }

    #[tokio::test]
    async fn callback_rejects_mismatched_state() {
        let state = state();
        send(&state, Method::GET, "/auth/login").await;

        let response = send(&state, Method::GET, "/auth/callback?code=abc&state=forged").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.session().credential.is_none());
    }

    #[tokio::test]
    async fn callback_reports_denied_authorization() {
        let state = state();
        let response = send(&state, Method::GET, "/auth/callback?error=access_denied").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("access_denied"));
    }

    #[tokio::test]
    async fn callback_exchanges_code_and_stores_credential() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("code=auth-code");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "fresh-token",
                    "expires_in": 3600
                }));
            })
            .await;
        let state = state_with(
            StubProcessingService::new(sample_result()),
            server.url("/token"),
        );
        send(&state, Method::GET, "/auth/login").await;
        let pending_state = state
            .session()
            .pending
            .as_ref()
            .map(|pending| pending.state.clone())
            .expect("pending authorization");

        let uri = format!("/auth/callback?code=auth-code&state={pending_state}");
        let response = send(&state, Method::GET, &uri).await;

        token.assert_async().await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert_eq!(
            state.valid_credential().expect("credential").access_token(),
            "fresh-token"
        );
        assert!(state.session().pending.is_none());
    }

    #[tokio::test]
    async fn process_runs_in_background_and_exposes_results() {
        let service = StubProcessingService::new(sample_result());
        let state = state_with(service.clone(), "http://127.0.0.1:9/token".into());
        authenticate(&state);

        let response = send(&state, Method::POST, "/process").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/processing");
        wait_for_run(&state).await;

        assert_eq!(service.recorded_calls().await, vec!["session-token"]);

        let status = body_text(send(&state, Method::GET, "/process/status").await).await;
        let status: serde_json::Value = serde_json::from_str(&status).expect("status json");
        assert_eq!(status["is_running"], false);
        assert_eq!(status["total"], 1);

        let results = body_text(send(&state, Method::GET, "/results").await).await;
        assert!(results.contains("report, final.pdf"));
        assert!(results.contains("A short summary."));

        let download = send(&state, Method::GET, "/download").await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let csv = body_text(download).await;
        assert_eq!(
            csv,
            "index,file_name,summary\n1,\"report, final.pdf\",A short summary.\n"
        );
    }

    #[tokio::test]
    async fn process_while_running_redirects_to_progress() {
        let service = StubProcessingService::new(sample_result());
        let state = state_with(service.clone(), "http://127.0.0.1:9/token".into());
        authenticate(&state);
        state.progress.try_begin().expect("simulated active run");

        let response = send(&state, Method::POST, "/process").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/processing");
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn download_without_results_is_not_found() {
        let state = state();
        for uri in ["/download", "/download/pdf"] {
            let response = send(&state, Method::GET, uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn pdf_download_serves_the_last_run() {
        let state = state();
        state.session().last_result = Some(Arc::new(sample_result()));

        let response = send(&state, Method::GET, "/download/pdf").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"drive_summaries.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert!(bytes.starts_with(b"%PDF-"));
        let text = pdf_extract::extract_text_from_mem(&bytes).expect("readable pdf");
        assert!(text.contains("report, final.pdf"));
    }

    #[tokio::test]
    async fn listing_failure_publishes_empty_run_and_records_error() {
        let failed_run = RunResult {
            error: Some("Failed to list files: drive unavailable".into()),
            ..RunResult::default()
        };
        let state = state_with(
            StubProcessingService::new(failed_run),
            "http://127.0.0.1:9/token".into(),
        );
        authenticate(&state);

        send(&state, Method::POST, "/process").await;
        wait_for_run(&state).await;

        let status = body_text(send(&state, Method::GET, "/process/status").await).await;
        let status: serde_json::Value = serde_json::from_str(&status).expect("status json");
        assert_eq!(status["error"], "Failed to list files: drive unavailable");
        assert!(state.valid_credential().is_ok());

        let results = body_text(send(&state, Method::GET, "/results").await).await;
        assert!(results.contains("0 of 0 files processed."));
        assert!(results.contains("drive unavailable"));
        let download = send(&state, Method::GET, "/download").await;
        assert_eq!(download.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_reports_whether_a_run_was_active() {
        let state = state();
        let idle = body_text(send(&state, Method::POST, "/process/stop").await).await;
        assert!(idle.contains("\"stop_requested\":false"));

        state.progress.try_begin().expect("begin");
        let active = body_text(send(&state, Method::POST, "/process/stop").await).await;
        assert!(active.contains("\"stop_requested\":true"));
        assert!(state.progress.stop_requested());
    }

    #[tokio::test]
    async fn landing_and_processing_pages_render() {
        let state = state();
        let landing = body_text(send(&state, Method::GET, "/").await).await;
        assert!(landing.contains("Connect Google Drive"));

        authenticate(&state);
        let landing = body_text(send(&state, Method::GET, "/").await).await;
        assert!(landing.contains("Summarize my documents"));

        let processing = body_text(send(&state, Method::GET, "/processing").await).await;
        assert!(processing.contains("/process/status"));
    }
}
