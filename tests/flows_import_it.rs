// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use account_broker::{
	_preludet::*,
	auth::{AccountStatus, Provider, TokenSecret},
	flows::{ImportRequest, UNKNOWN_EMAIL},
};

fn request(refresh: &str, provider: Option<&str>) -> ImportRequest {
	serde_json::from_value(json!({ "refreshToken": refresh, "provider": provider }))
		.expect("Import request should deserialize.")
}

#[tokio::test]
async fn import_adopts_the_usage_identity() {
	let server = MockServer::start_async().await;
	let (broker, _, accounts) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/refreshToken").json_body(json!({ "refreshToken": "rt-import" }));
			then.status(200).json_body(json!({
				"accessToken": "at-1",
				"refreshToken": "rt-rotated",
				"profileArn": "arn:aws:test",
				"expiresIn": 3600
			}));
		})
		.await;
	let usage = server
		.mock_async(|when, then| {
			when.method(GET).path("/getUsageLimits").header("authorization", "Bearer at-1");
			then.status(200)
				.json_body(json!({ "userInfo": { "email": "dev@github.example", "userId": "user-1" } }));
		})
		.await;
	let account = broker
		.import_refresh_token(request("rt-import", None))
		.await
		.expect("Import should succeed.");

	refresh.assert_async().await;
	usage.assert_async().await;

	assert_eq!(account.email, "dev@github.example");
	assert_eq!(account.provider, Provider::Github);
	assert_eq!(account.label.as_deref(), Some("Kiro Github account"));
	assert_eq!(account.status, AccountStatus::Active);
	assert_eq!(account.user_id.as_deref(), Some("user-1"));
	assert_eq!(account.refresh_token.as_ref().map(TokenSecret::expose), Some("rt-rotated"));
	assert_eq!(account.profile_arn.as_deref(), Some("arn:aws:test"));

	let again = broker
		.import_refresh_token(request("rt-import", None))
		.await
		.expect("Re-import should succeed.");

	assert_eq!(again.id, account.id);
	assert_eq!(accounts.list().await.expect("Listing should succeed.").len(), 1);
}

#[tokio::test]
async fn import_falls_back_to_the_placeholder_email_and_the_requested_provider() {
	let server = MockServer::start_async().await;
	let (broker, _, _) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/refreshToken");
			then.status(200).json_body(json!({ "accessToken": "at-1" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/getUsageLimits");
			then.status(200).json_body(json!({ "limits": [] }));
		})
		.await;

	let account = broker
		.import_refresh_token(request("rt-import", Some("google")))
		.await
		.expect("Import should succeed.");

	assert_eq!(account.email, UNKNOWN_EMAIL);
	assert_eq!(account.provider, Provider::Google);
	assert_eq!(account.refresh_token.as_ref().map(TokenSecret::expose), Some("rt-import"));
}

#[tokio::test]
async fn suspended_imports_are_rejected() {
	let server = MockServer::start_async().await;
	let (broker, store, _) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/refreshToken");
			then.status(200).json_body(json!({ "accessToken": "at-1" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/getUsageLimits");
			then.status(403).json_body(json!({ "reason": "BANNED", "message": "Suspended" }));
		})
		.await;

	let err = broker
		.import_refresh_token(request("rt-import", None))
		.await
		.expect_err("A suspended account must not be imported.");

	assert!(err.is_suspended());
	assert!(store.is_empty());
}
