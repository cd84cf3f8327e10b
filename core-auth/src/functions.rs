//! # Remote Functions
//!
//! Calls named backend functions with a list of structured arguments. The
//! argument list is encoded through the config's [`ValueCodec`] and the reply
//! body decoded through it; the request carries the calling user's access
//! token.
//!
//! If the backend rejects the access token (HTTP 401) the token is refreshed
//! once and the call retried once.
//!
//! [`ValueCodec`]: bridge_traits::ValueCodec

use crate::app::App;
use crate::error::{ClientErrorCode, ErrorNormalizer, JsonErrorCode, Result};
use crate::user::User;
use bridge_traits::{HttpMethod, Request, Response};
use core_runtime::events::{CoreEvent, FunctionEvent};
use serde_json::Value;
use tracing::{debug, instrument, warn};

const HTTP_UNAUTHORIZED: i32 = 401;

impl App {
    /// Calls `name` as the current user.
    pub async fn call_function(&self, name: &str, arguments: &[Value]) -> Result<Value> {
        let user = self.current_user().ok_or_else(|| {
            ErrorNormalizer::client(
                ClientErrorCode::NoCurrentUser,
                format!("cannot call function '{}' without a logged-in user", name),
            )
        })?;
        self.call_function_as(&user, name, arguments).await
    }

    /// Calls `name` as `user`.
    #[instrument(skip(self, user, arguments), fields(app_id = %self.app_id(), identity = %user.identity(), function = %name))]
    pub async fn call_function_as(
        &self,
        user: &User,
        name: &str,
        arguments: &[Value],
    ) -> Result<Value> {
        let result = self.dispatch_function(user, name, arguments).await;

        let event = match &result {
            Ok(_) => FunctionEvent::Called {
                app_id: self.app_id().to_string(),
                identity: user.identity().to_string(),
                name: name.to_string(),
            },
            Err(error) => {
                warn!(error = %error, "Function call failed");
                FunctionEvent::Failed {
                    app_id: self.app_id().to_string(),
                    identity: user.identity().to_string(),
                    name: name.to_string(),
                    message: error.to_string(),
                }
            }
        };
        self.emit_event(CoreEvent::Function(event));

        result
    }

    async fn dispatch_function(
        &self,
        user: &User,
        name: &str,
        arguments: &[Value],
    ) -> Result<Value> {
        let codec = self.config().codec.clone();
        let encoded = codec
            .encode_arguments(arguments)
            .map_err(|e| ErrorNormalizer::from_transport(&e))?;
        let body = format!(
            "{{\"name\":{},\"arguments\":{}}}",
            Value::String(name.to_string()),
            encoded
        );

        let tokens = self.logged_in_tokens(user)?;
        let response = self
            .send_raw(self.function_request(&tokens.access_token, &body))
            .await?;

        let response = if Self::is_unauthorized(&response) {
            debug!("Access token rejected, refreshing once");
            self.refresh_access_token(user).await?;
            let tokens = self.logged_in_tokens(user)?;
            self.send_raw(self.function_request(&tokens.access_token, &body))
                .await?
        } else {
            response
        };

        let response = ErrorNormalizer::check(response)?;
        codec
            .decode_result(&response.body)
            .map_err(|e| ErrorNormalizer::json(JsonErrorCode::BadResult, e.to_string()))
    }

    fn function_request(&self, access_token: &str, body: &str) -> Request {
        self.request(HttpMethod::Post, self.routes().function_call())
            .bearer_token(access_token)
            .body(body)
    }

    fn is_unauthorized(response: &Response) -> bool {
        response.custom_status_code == 0 && response.http_status_code == HTTP_UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{FakeBackend, TEST_PASSWORD};
    use crate::{App, ClientErrorCode, Credentials, ServiceErrorCode};
    use bridge_traits::{BridgeError, ValueCodec};
    use core_runtime::events::{CoreEvent, FunctionEvent};
    use core_runtime::AppConfig;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn fake_app() -> (App, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new());
        backend.add_account("alice@example.com", TEST_PASSWORD);
        let config = AppConfig::builder()
            .base_url("https://backend.test")
            .transport(backend.clone())
            .build()
            .unwrap();
        (App::new("fn-app", config, "/tmp/fn-app").unwrap(), backend)
    }

    async fn logged_in() -> (App, Arc<FakeBackend>) {
        let (app, backend) = fake_app();
        app.login(Credentials::email_password("alice@example.com", TEST_PASSWORD))
            .await
            .unwrap();
        (app, backend)
    }

    #[tokio::test]
    async fn test_call_function_round_trip() {
        let (app, backend) = logged_in().await;

        let result = app
            .call_function("sum", &[json!(1), json!(2), json!(39)])
            .await
            .unwrap();

        assert_eq!(result, json!(42));
        let request = backend.requests().pop().unwrap();
        assert!(request.url.ends_with("/app/fn-app/functions/call"));
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body, json!({"name": "sum", "arguments": [1, 2, 39]}));
    }

    #[tokio::test]
    async fn test_call_function_without_user() {
        let (app, backend) = fake_app();

        let error = app.call_function("sum", &[]).await.unwrap_err();

        assert!(error.is_client_error(ClientErrorCode::NoCurrentUser));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_function_error_is_service_error() {
        let (app, _backend) = logged_in().await;
        let mut events = app.subscribe();

        let error = app.call_function("fail", &[]).await.unwrap_err();

        assert!(error.is_service_error(ServiceErrorCode::FunctionExecutionError));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Function(FunctionEvent::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let (app, backend) = logged_in().await;
        let user = app.current_user().unwrap();
        backend.expire_access_tokens();

        let result = user.call_function("echo", &[json!("hi")]).await.unwrap();

        assert_eq!(result, json!(["hi"]));
        let calls = backend
            .requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/functions/call"))
            .count();
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_undecodable_result() {
        struct StrictCodec;

        impl ValueCodec for StrictCodec {
            fn encode_arguments(&self, arguments: &[Value]) -> bridge_traits::Result<String> {
                Ok(Value::Array(arguments.to_vec()).to_string())
            }

            fn decode_result(&self, _body: &str) -> bridge_traits::Result<Value> {
                Err(BridgeError::Codec("unsupported result".to_string()))
            }
        }

        let backend = Arc::new(FakeBackend::new());
        let config = AppConfig::builder()
            .base_url("https://backend.test")
            .transport(backend.clone())
            .codec(Arc::new(StrictCodec))
            .build()
            .unwrap();
        let app = App::new("fn-app", config, "/tmp/fn-app").unwrap();
        app.login(Credentials::anonymous()).await.unwrap();

        let error = app.call_function("sum", &[json!(1)]).await.unwrap_err();
        assert_eq!(error.domain(), "json");
    }
}
