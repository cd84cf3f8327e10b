//! End-to-end session flows through the registry.

use core_auth::testing::{FakeBackend, TEST_PASSWORD};
use core_service::{
    App, AppConfig, AppRegistry, AuthEvent, CallbackTransport, Completion, CoreEvent,
    Credentials, ErrorNormalizer, NetworkTransport, ProviderType, Request, Response,
    SessionState, UserState, DEFAULT_REQUEST_TIMEOUT_MS,
};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    Transport {}

    #[async_trait::async_trait]
    impl NetworkTransport for Transport {
        async fn send(&self, request: Request) -> bridge_traits::Result<Response>;
    }
}

fn backend() -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    backend.add_account("alice@example.com", TEST_PASSWORD);
    backend.add_account("bob@example.com", TEST_PASSWORD);
    backend
}

fn config_with(transport: Arc<dyn NetworkTransport>) -> AppConfig {
    AppConfig::builder()
        .base_url("https://backend.test/")
        .local_app_name("integration")
        .local_app_version("0.1.0")
        .transport(transport)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_repeated_app_id_returns_cached_app() {
    let registry = AppRegistry::new();
    let cfg_a = config_with(backend());
    let cfg_b = AppConfig::builder()
        .base_url("https://elsewhere.test")
        .default_request_timeout_ms(1000)
        .transport(backend())
        .build()
        .unwrap();

    let first = registry.get_or_create("x", cfg_a, "/tmp/x").unwrap();
    let second = registry.get_or_create("x", cfg_b, "/tmp/x").unwrap();

    assert!(App::ptr_eq(&first, &second));
    assert_eq!(second.config().effective_base_url(), "https://backend.test");
    assert_eq!(
        second.config().default_request_timeout_ms,
        DEFAULT_REQUEST_TIMEOUT_MS
    );
}

#[tokio::test]
async fn test_invalid_provider_reports_domain() {
    let registry = AppRegistry::new();
    let app = registry
        .get_or_create("x", config_with(backend()), "/tmp/x")
        .unwrap();

    let error = app
        .login(Credentials::new(
            ProviderType::parse("not-a-provider"),
            serde_json::Map::new(),
        ))
        .await
        .unwrap_err();

    assert!(!error.domain().is_empty());
    assert_eq!(error.domain(), "client");
}

#[tokio::test]
async fn test_multi_user_session() {
    let registry = AppRegistry::new();
    let app = registry
        .get_or_create("x", config_with(backend()), "/tmp/x")
        .unwrap();

    let alice = app
        .login(Credentials::email_password("alice@example.com", TEST_PASSWORD))
        .await
        .unwrap();
    let bob = app
        .login(Credentials::email_password("bob@example.com", TEST_PASSWORD))
        .await
        .unwrap();
    assert_eq!(app.all_users().len(), 2);
    assert_eq!(app.current_user(), Some(bob.clone()));

    app.switch_user(&alice);
    assert_eq!(app.current_user(), Some(alice.clone()));

    app.remove_user(&alice).await.unwrap();
    assert!(!app.all_users().contains_key(alice.identity()));
    assert_eq!(alice.state(), UserState::Removed);
    assert_eq!(app.current_user(), Some(bob.clone()));

    let sum = bob.call_function("sum", &[json!(20), json!(22)]).await.unwrap();
    assert_eq!(sum, json!(42));

    bob.log_out().await.unwrap();
    assert_eq!(app.state(), SessionState::NoUser);
}

#[tokio::test]
async fn test_registry_event_stream() {
    let registry = AppRegistry::new();
    let mut events = registry.subscribe();
    let app = registry
        .get_or_create("evt", config_with(backend()), "/tmp/evt")
        .unwrap();

    let user = app.login(Credentials::anonymous()).await.unwrap();

    match events.recv().await.unwrap() {
        CoreEvent::Auth(AuthEvent::LoggedIn {
            app_id,
            identity,
            provider,
        }) => {
            assert_eq!(app_id, "evt");
            assert_eq!(identity, user.identity());
            assert_eq!(provider, "anon-user");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_default_timeout_reaches_transport() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| request.timeout_ms == 6000 && request.timeout_secs() == 6)
        .times(1)
        .returning(|_| Ok(Response::new(503, "")));

    let app = App::new("t", config_with(Arc::new(transport)), "/tmp/t").unwrap();
    let error = app.login(Credentials::anonymous()).await.unwrap_err();

    assert_eq!(error.domain(), "http");
    assert_eq!(error.code(), 503);
}

#[tokio::test]
async fn test_sub_second_precision_truncates() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| request.timeout_ms == 9500 && request.timeout_secs() == 9)
        .times(1)
        .returning(|_| {
            Ok(Response::new(
                401,
                r#"{"error":"invalid username/password","error_code":"InvalidPassword"}"#,
            ))
        });

    let config = AppConfig::builder()
        .default_request_timeout_ms(9500)
        .transport(Arc::new(transport))
        .build()
        .unwrap();
    let app = App::new("t", config, "/tmp/t").unwrap();

    let error = app
        .login(Credentials::email_password("a@example.com", "nope"))
        .await
        .unwrap_err();
    assert_eq!(error.domain(), "service");
    assert_eq!(error.message(), "invalid username/password");
}

#[tokio::test]
async fn test_callback_transport_completes_from_foreign_thread() {
    let fake = backend();
    let dispatcher_backend = Arc::clone(&fake);
    let transport = CallbackTransport::new(move |request: Request, completion: Completion| {
        let backend = Arc::clone(&dispatcher_backend);
        std::thread::spawn(move || completion.succeed(backend.respond(request)));
    });

    let app = App::new("cb", config_with(Arc::new(transport)), "/tmp/cb").unwrap();
    let user = app
        .login(Credentials::email_password("alice@example.com", TEST_PASSWORD))
        .await
        .unwrap();

    assert!(user.is_logged_in());
    assert_eq!(fake.requests().len(), 2);
}

#[tokio::test]
async fn test_dropped_completion_is_transport_error() {
    let transport = CallbackTransport::new(|_request: Request, completion: Completion| {
        drop(completion);
    });

    let app = App::new("cb", config_with(Arc::new(transport)), "/tmp/cb").unwrap();
    let error = app.login(Credentials::anonymous()).await.unwrap_err();

    assert_eq!(error.domain(), "custom");
    assert!(error.code() < 0);
    assert_eq!(app.state(), SessionState::NoUser);
}

#[test]
fn test_normalizer_preserves_inputs() {
    let error = ErrorNormalizer::normalize("custom", 42, "");
    assert_eq!(error.domain(), "custom");
    assert_eq!(error.code(), 42);
    assert_eq!(error.message(), "");
}
