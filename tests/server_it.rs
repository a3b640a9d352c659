// crates.io
use axum::{
	Router,
	body::{Body, to_bytes},
	http::{Request, StatusCode},
};
use httpmock::prelude::*;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
// self
use account_broker::{
	_preludet::*,
	auth::TokenSecret,
	server::{self, AppState},
};

const SECRET: &str = "it-secret";

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
	let request = Request::builder()
		.method(method)
		.uri(uri)
		.header("authorization", format!("Bearer {SECRET}"))
		.header("content-type", "application/json")
		.body(body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty))
		.expect("Request should build.");
	let response = app.clone().oneshot(request).await.expect("Router should respond.");
	let status = response.status();
	let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("Body should be readable.");

	(status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn sign_in_round_trip_over_http() {
	let upstream = MockServer::start_async().await;
	let (broker, _, _) =
		build_test_broker(test_json_adapter(&upstream.base_url(), &upstream.base_url()));
	let app = server::router(AppState::new(
		broker,
		Some(TokenSecret::new(SECRET)),
		CancellationToken::new(),
	));

	upstream
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({
				"accessToken": "at-1",
				"refreshToken": "rt-1",
				"expiresIn": 3600
			}));
		})
		.await;
	upstream
		.mock_async(|when, then| {
			when.method(GET).path("/getUsageLimits").header("authorization", "Bearer at-1");
			then.status(200)
				.json_body(json!({ "userInfo": { "email": "dev@example.com", "userId": "user-1" } }));
		})
		.await;

	let (status, session) =
		send(&app, "POST", "/api/oauth/initiate", Some(json!({ "provider": "Google" }))).await;

	assert_eq!(status, StatusCode::OK);

	let state = session["state"].as_str().expect("State should be a string.").to_owned();

	assert_eq!(state.len(), 36);
	assert!(session["authorizeUrl"].as_str().is_some_and(|url| url.contains(&state)));

	let callback = format!("{TEST_REDIRECT_URI}?code=code-1&state={state}");
	let (status, completed) =
		send(&app, "POST", "/oauth/complete", Some(json!({ "callbackUrl": callback }))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(completed["account"]["email"], "dev@example.com");
	assert_eq!(completed["account"]["status"], "active");

	let (status, body) =
		send(&app, "POST", "/oauth/complete", Some(json!({ "callbackUrl": callback }))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().is_some_and(|message| message.contains("expired")));

	let id = completed["account"]["id"].as_str().expect("Id should be a string.").to_owned();
	let (status, exported) =
		send(&app, "POST", "/accounts/export", Some(json!({ "ids": [id.clone()] }))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(exported[0]["refreshToken"], "rt-1");

	let (status, updated) =
		send(&app, "PATCH", &format!("/accounts/{id}"), Some(json!({ "label": "Work" }))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(updated["label"], "Work");

	let (status, deleted) = send(&app, "DELETE", "/accounts", Some(json!({ "ids": [id] }))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(deleted, json!({ "deleted": 1 }));
}

#[tokio::test]
async fn import_over_http_returns_created() {
	let upstream = MockServer::start_async().await;
	let (broker, _, _) =
		build_test_broker(test_json_adapter(&upstream.base_url(), &upstream.base_url()));
	let app = server::router(AppState::new(
		broker,
		Some(TokenSecret::new(SECRET)),
		CancellationToken::new(),
	));

	upstream
		.mock_async(|when, then| {
			when.method(POST).path("/refreshToken");
			then.status(200).json_body(json!({ "accessToken": "at-1" }));
		})
		.await;
	upstream
		.mock_async(|when, then| {
			when.method(GET).path("/getUsageLimits");
			then.status(200).json_body(json!({ "userInfo": { "email": "dev@gmail.com" } }));
		})
		.await;

	let (status, account) =
		send(&app, "POST", "/accounts", Some(json!({ "refreshToken": "rt-1" }))).await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(account["provider"], "Google");

	let (status, body) = send(&app, "POST", "/accounts", Some(json!({}))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().is_some_and(|message| message.contains("refreshToken")));
}
