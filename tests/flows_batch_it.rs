// crates.io
use httpmock::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
// self
use account_broker::{
	_preludet::*,
	auth::{Account, Provider, TokenSecret},
	flows::{BatchProgress, LogProgress, REFRESHED_MESSAGE},
	repository::AccountRepository,
};

async fn seed(
	accounts: &Arc<dyn AccountRepository>,
	email: &str,
	refresh: &str,
	expires_in: Duration,
) -> Account {
	let mut account = Account::new(email, Provider::Github);

	account.refresh_token = Some(TokenSecret::new(refresh));
	account.expires_at = Some(OffsetDateTime::now_utc() + expires_in);

	accounts.upsert_by_email_provider(account).await.expect("Seed account should save.")
}

async fn stub_refresh<'a>(
	server: &'a MockServer,
	refresh: &str,
	status: u16,
	body: serde_json::Value,
) -> httpmock::Mock<'a> {
	let expected = json!({ "refreshToken": refresh });

	server
		.mock_async(move |when, then| {
			when.method(POST).path("/refreshToken").json_body(expected);
			then.status(status).header("content-type", "application/json").json_body(body);
		})
		.await
}

#[tokio::test]
async fn one_failing_account_does_not_stop_the_batch() {
	let server = MockServer::start_async().await;
	let (broker, _, accounts) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));
	let first = seed(&accounts, "one@example.com", "rt-1", Duration::hours(2)).await;
	let second = seed(&accounts, "two@example.com", "rt-2", Duration::hours(2)).await;
	let third = seed(&accounts, "three@example.com", "rt-3", Duration::hours(2)).await;

	stub_refresh(&server, "rt-1", 200, json!({ "accessToken": "at-1-new" })).await;
	stub_refresh(&server, "rt-2", 500, json!({ "message": "upstream exploded" })).await;
	stub_refresh(&server, "rt-3", 200, json!({ "accessToken": "at-3-new" })).await;

	let seen = Mutex::new(Vec::new());
	let sink = |progress: &BatchProgress<'_>| {
		seen.lock().push((progress.current, progress.total, progress.current_email.to_owned()));
	};
	let report = broker
		.refresh_all(true, &sink, &CancellationToken::new())
		.await
		.expect("Batch should run.");

	assert_eq!(report.results.len(), 3);
	assert_eq!(report.updated.len(), 2);

	for result in &report.results {
		if result.email == second.email {
			assert!(!result.success);
			assert_eq!(result.message, "upstream exploded");
		} else {
			assert!(result.success);
			assert_eq!(result.message, REFRESHED_MESSAGE);
		}
	}

	let seen = seen.into_inner();

	assert_eq!(seen.iter().map(|(current, ..)| *current).collect::<Vec<_>>(), [1, 2, 3]);
	assert!(seen.iter().all(|(_, total, _)| *total == 3));

	for (account, token) in [(&first, Some("at-1-new")), (&second, None), (&third, Some("at-3-new"))]
	{
		let stored = accounts
			.get(&account.id)
			.await
			.expect("Lookup should succeed.")
			.expect("Account should still exist.");

		assert_eq!(stored.access_token.as_ref().map(TokenSecret::expose), token);
	}
}

#[tokio::test]
async fn non_forced_batches_only_refresh_accounts_near_expiry() {
	let server = MockServer::start_async().await;
	let (broker, _, accounts) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));
	let due = seed(&accounts, "due@example.com", "rt-due", Duration::minutes(2)).await;

	seed(&accounts, "fresh@example.com", "rt-fresh", Duration::hours(2)).await;

	let due_mock = stub_refresh(&server, "rt-due", 200, json!({ "accessToken": "at-new" })).await;
	let fresh_mock = stub_refresh(&server, "rt-fresh", 200, json!({ "accessToken": "at-x" })).await;
	let report = broker
		.refresh_all(false, &LogProgress, &CancellationToken::new())
		.await
		.expect("Batch should run.");

	due_mock.assert_async().await;
	fresh_mock.assert_calls_async(0).await;

	assert_eq!(report.results.len(), 1);
	assert_eq!(report.results[0].email, due.email);
	assert_eq!(report.updated[0].id, due.id);
}

#[tokio::test]
async fn cancelled_batches_start_no_work() {
	let server = MockServer::start_async().await;
	let (broker, _, accounts) =
		build_test_broker(test_json_adapter(&server.base_url(), &server.base_url()));

	seed(&accounts, "one@example.com", "rt-1", Duration::minutes(1)).await;

	let mock = stub_refresh(&server, "rt-1", 200, json!({ "accessToken": "at-new" })).await;
	let shutdown = CancellationToken::new();

	shutdown.cancel();

	let report = broker.refresh_all(true, &LogProgress, &shutdown).await.expect("Batch should run.");

	mock.assert_calls_async(0).await;

	assert!(report.results.is_empty());
}
