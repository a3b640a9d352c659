//! Bearer-guarded HTTP surface over the [`Broker`].
//!
//! Every route is mounted twice, at the root and under `/api`. Failures are rendered as
//! `{"error": "<message>"}` with a status derived from the [`Error`] variant.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::{Path, Request, State, rejection::JsonRejection},
	http::{StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, patch, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId, TokenSecret},
	error::ConfigError,
	flows::{AccountPatch, AuthorizationSession, BatchReport, Broker, ImportRequest, LogProgress},
};

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Flow coordinator.
	pub broker: Broker,
	/// Expected bearer secret; `None` rejects every request as a misconfiguration.
	pub secret: Option<TokenSecret>,
	/// Fired on shutdown; stops in-flight batches and drains the server.
	pub shutdown: CancellationToken,
}
impl AppState {
	/// Creates handler state.
	pub fn new(broker: Broker, secret: Option<TokenSecret>, shutdown: CancellationToken) -> Self {
		Self { broker, secret, shutdown }
	}
}

/// HTTP status reported for `e`.
pub fn status_for(e: &Error) -> StatusCode {
	match e {
		Error::Validation { .. } | Error::SessionExpired { .. } => StatusCode::BAD_REQUEST,
		Error::Unauthorized => StatusCode::UNAUTHORIZED,
		Error::AccountNotFound { .. } | Error::MissingCredentials { .. } => StatusCode::NOT_FOUND,
		Error::Storage(_) | Error::Config(_) | Error::Upstream(_) | Error::Suspended { .. } =>
			StatusCode::INTERNAL_SERVER_ERROR,
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status = status_for(&self);
		let message = match &self {
			Error::Unauthorized => "Unauthorized".to_owned(),
			e => e.to_string(),
		};

		if status.is_server_error() {
			tracing::error!(error = %self, "Request failed.");
		}

		(status, Json(json!({ "error": message }))).into_response()
	}
}

/// Builds the router with the bearer gate applied to every route.
pub fn router(state: AppState) -> Router {
	Router::new()
		.merge(routes())
		.nest("/api", routes())
		.route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
		.with_state(state)
}

/// Serves `state` on `listener` until its shutdown token fires.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
	let shutdown = state.shutdown.clone();

	axum::serve(listener, router(state))
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	tracing::info!("Server stopped.");

	Ok(())
}

fn routes() -> Router<AppState> {
	Router::new()
		.route("/accounts", get(list_accounts).post(import_account).delete(delete_accounts))
		.route("/accounts/export", get(export_accounts).post(export_accounts))
		.route("/accounts/refresh", post(refresh_accounts))
		.route("/accounts/:id", patch(update_account).delete(delete_account))
		.route("/accounts/:id/refresh", patch(refresh_account))
		.route("/accounts/:id/sync", patch(sync_account))
		.route("/oauth/initiate", post(initiate))
		.route("/oauth/complete", post(complete))
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let Some(secret) = state.secret.as_ref() else {
		return Error::from(ConfigError::MissingSecret).into_response();
	};
	let authorized = request
		.headers()
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(bearer_token)
		.is_some_and(|token| token == secret.expose());

	if !authorized {
		tracing::warn!(path = request.uri().path(), "Bearer check failed.");

		return Error::Unauthorized.into_response();
	}

	next.run(request).await
}

fn bearer_token(header: &str) -> Option<&str> {
	let (scheme, token) = header.trim().split_once(' ')?;

	scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T> {
	body.map(|Json(value)| value).map_err(|e| Error::validation(e.body_text()))
}

/// Decodes an optional JSON body: an empty body yields `T::default()`, anything else must parse.
fn optional_payload<T>(body: &Bytes) -> Result<T>
where
	T: Default + for<'de> Deserialize<'de>,
{
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(T::default());
	}

	serde_json::from_slice(body).map_err(|e| Error::validation(format!("Invalid JSON body: {e}")))
}

#[derive(Debug, Default, Deserialize)]
struct IdsRequest {
	#[serde(default)]
	ids: Vec<AccountId>,
}

#[derive(Debug, Deserialize)]
struct InitiateRequest {
	provider: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest {
	callback_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
	#[serde(default)]
	force_all: bool,
}

#[derive(Debug, Serialize)]
struct Deleted {
	deleted: usize,
}

#[derive(Debug, Serialize)]
struct Completed {
	account: Account,
}

async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>> {
	Ok(Json(state.broker.list_accounts().await?))
}

async fn import_account(
	State(state): State<AppState>,
	body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>)> {
	let account = state.broker.import_refresh_token(payload(body)?).await?;

	Ok((StatusCode::CREATED, Json(account)))
}

async fn delete_accounts(
	State(state): State<AppState>,
	body: Result<Json<IdsRequest>, JsonRejection>,
) -> Result<Json<Deleted>> {
	let IdsRequest { ids } = payload(body)?;

	Ok(Json(Deleted { deleted: state.broker.delete_accounts(&ids).await? }))
}

async fn export_accounts(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<Vec<Account>>> {
	let IdsRequest { ids } = optional_payload(&body)?;

	Ok(Json(state.broker.export_accounts(&ids).await?))
}

async fn refresh_accounts(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<BatchReport>> {
	let BatchRequest { force_all } = optional_payload(&body)?;

	Ok(Json(state.broker.refresh_all(force_all, &LogProgress, &state.shutdown).await?))
}

async fn update_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Result<Json<AccountPatch>, JsonRejection>,
) -> Result<Json<Account>> {
	let id = AccountId::new(id)?;

	Ok(Json(state.broker.update_account(&id, payload(body)?).await?))
}

async fn delete_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Deleted>> {
	let id = AccountId::new(id)?;

	Ok(Json(Deleted { deleted: state.broker.delete_accounts(&[id]).await? }))
}

async fn refresh_account(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Account>> {
	let id = AccountId::new(id)?;

	Ok(Json(state.broker.refresh_by_id(&id, false).await?))
}

async fn sync_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Account>> {
	let id = AccountId::new(id)?;

	Ok(Json(state.broker.refresh_by_id(&id, true).await?))
}

async fn initiate(
	State(state): State<AppState>,
	body: Result<Json<InitiateRequest>, JsonRejection>,
) -> Result<Json<AuthorizationSession>> {
	let InitiateRequest { provider } = payload(body)?;

	Ok(Json(state.broker.initiate(&provider).await?))
}

async fn complete(
	State(state): State<AppState>,
	body: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<Completed>> {
	let CompleteRequest { callback_url } = payload(body)?;
	let account = state.broker.complete(&callback_url).await?;

	Ok(Json(Completed { account }))
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::body::{Body, to_bytes};
	use serde_json::Value;
	use tower::ServiceExt;
	// self
	use super::*;
	use crate::{
		_preludet::{build_test_broker, test_json_adapter},
		auth::Provider,
	};

	const SECRET: &str = "s3cret";

	fn app(secret: Option<&str>) -> (Router, Broker) {
		let (broker, _, _) =
			build_test_broker(test_json_adapter("http://127.0.0.1:9", "http://127.0.0.1:9"));
		let state =
			AppState::new(broker.clone(), secret.map(TokenSecret::new), CancellationToken::new());

		(router(state), broker)
	}

	async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let mut builder = axum::http::Request::builder()
			.method(method)
			.uri(uri)
			.header(AUTHORIZATION, format!("Bearer {SECRET}"));
		let body = match body {
			Some(value) => {
				builder = builder.header("content-type", "application/json");

				Body::from(value.to_string())
			},
			None => Body::empty(),
		};
		let response = app
			.oneshot(builder.body(body).expect("Request should build."))
			.await
			.expect("Router should respond.");
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("Body should be readable.");
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).expect("Body should be JSON.")
		};

		(status, value)
	}

	#[tokio::test]
	async fn missing_secret_is_a_server_misconfiguration() {
		let (app, _) = app(None);
		let (status, body) = call(app, "GET", "/accounts", None).await;

		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body["error"], "Server misconfigured: APP_SECRET is missing.");
	}

	#[tokio::test]
	async fn mismatched_bearer_is_unauthorized() {
		let (app, _) = app(Some("other"));
		let (status, body) = call(app, "GET", "/api/accounts", None).await;

		assert_eq!(status, StatusCode::UNAUTHORIZED);
		assert_eq!(body, json!({ "error": "Unauthorized" }));
	}

	#[tokio::test]
	async fn routes_are_mounted_at_root_and_under_api() {
		let (app, broker) = app(Some(SECRET));

		broker
			.accounts
			.upsert_by_email_provider(Account::new("a@b.com", Provider::Google))
			.await
			.expect("Seed should save.");

		for uri in ["/accounts", "/api/accounts"] {
			let (status, body) = call(app.clone(), "GET", uri, None).await;

			assert_eq!(status, StatusCode::OK);
			assert_eq!(body[0]["email"], "a@b.com");
		}
	}

	#[tokio::test]
	async fn errors_map_to_statuses() {
		let (app, _) = app(Some(SECRET));
		let (status, _) = call(app.clone(), "DELETE", "/accounts", Some(json!({ "ids": [] }))).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);

		let (status, _) =
			call(app.clone(), "PATCH", "/accounts/missing-id", Some(json!({ "label": "x" }))).await;

		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, body) =
			call(app.clone(), "POST", "/oauth/initiate", Some(json!({ "provider": "Apple" }))).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert!(body["error"].as_str().is_some_and(|message| !message.is_empty()));

		let (status, _) = call(app, "POST", "/oauth/complete", Some(json!({}))).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn single_delete_reports_zero_or_one() {
		let (app, broker) = app(Some(SECRET));
		let account = broker
			.accounts
			.upsert_by_email_provider(Account::new("a@b.com", Provider::Google))
			.await
			.expect("Seed should save.");
		let uri = format!("/accounts/{}", account.id);
		let (status, body) = call(app.clone(), "DELETE", &uri, None).await;

		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "deleted": 1 }));

		let (_, body) = call(app, "DELETE", &uri, None).await;

		assert_eq!(body, json!({ "deleted": 0 }));
	}

	#[tokio::test]
	async fn empty_batch_returns_an_empty_report() {
		let (app, _) = app(Some(SECRET));
		let (status, body) = call(app, "POST", "/accounts/refresh", None).await;

		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "results": [], "updated": [] }));
	}

	#[tokio::test]
	async fn malformed_export_bodies_are_rejected() {
		let (app, broker) = app(Some(SECRET));

		broker
			.accounts
			.upsert_by_email_provider(Account::new("a@b.com", Provider::Google))
			.await
			.expect("Seed should save.");

		let request = axum::http::Request::builder()
			.method("POST")
			.uri("/accounts/export")
			.header(AUTHORIZATION, format!("Bearer {SECRET}"))
			.header("content-type", "application/json")
			.body(Body::from("{\"ids\": [oops"))
			.expect("Request should build.");
		let response = app.clone().oneshot(request).await.expect("Router should respond.");

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("Body should be readable.");

		assert!(!String::from_utf8_lossy(&bytes).contains("a@b.com"));

		let (status, body) = call(app, "POST", "/accounts/export", None).await;

		assert_eq!(status, StatusCode::OK);
		assert_eq!(body[0]["email"], "a@b.com");
	}
}
