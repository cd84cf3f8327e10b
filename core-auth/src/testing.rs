//! In-memory backend for exercising sessions without a network.
//!
//! [`FakeBackend`] implements [`NetworkTransport`] and answers the login,
//! profile, session and function routes the way the real backend does,
//! recording every request it sees.

use bridge_traits::{HttpMethod, NetworkTransport, Request, Response, Result};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Value};
use std::collections::HashMap;

pub const TEST_PASSWORD: &str = "password123";

const API_PATH: &str = "/api/client/v2.0";

#[derive(Debug, Default)]
struct FakeUser {
    providers: Vec<String>,
    email: Option<String>,
}

#[derive(Debug, Default)]
struct BackendState {
    /// email -> (password, user id)
    accounts: HashMap<String, (String, String)>,
    users: HashMap<String, FakeUser>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    next_id: u64,
    requests: Vec<Request>,
    fail_next: Option<i32>,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_access_token(&mut self, user_id: &str) -> String {
        let token = format!("at-{}-{}", user_id, self.next_id());
        self.access_tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn add_provider(&mut self, user_id: &str, provider: &str, email: Option<String>) {
        let user = self.users.entry(user_id.to_string()).or_default();
        if !user.providers.iter().any(|p| p == provider) {
            user.providers.push(provider.to_string());
        }
        if email.is_some() {
            user.email = email;
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

fn service_error(status: i32, error_code: &str, message: &str) -> Response {
    Response::new(
        status,
        json!({ "error": message, "error_code": error_code }).to_string(),
    )
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers
        .get("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock()
    }

    /// Registers an email/password account and returns its user id.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let mut state = self.state();
        let user_id = format!("user-{}", state.next_id());
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), user_id.clone()));
        user_id
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    /// The next request is answered with `status` and an empty body.
    pub fn fail_next_with(&self, status: i32) {
        self.state().fail_next = Some(status);
    }

    /// Invalidates every issued access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.state().access_tokens.clear();
    }

    /// Answers `request` synchronously, as the backend would.
    pub fn respond(&self, request: Request) -> Response {
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(status) = state.fail_next.take() {
            return Response::new(status, "");
        }

        let (path, query) = match request.url.split_once(API_PATH) {
            Some((_, rest)) => rest.split_once('?').unwrap_or((rest, "")),
            None => return Response::new(404, ""),
        };

        match (request.method, path) {
            (HttpMethod::Post, p) if p.contains("/auth/providers/") && p.ends_with("/login") => {
                let provider = p
                    .rsplit('/')
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                Self::login(&mut state, &request, &provider, query == "link=true")
            }
            (HttpMethod::Get, "/auth/profile") => Self::profile(&state, &request),
            (HttpMethod::Delete, "/auth/session") => {
                match bearer(&request).and_then(|t| state.refresh_tokens.remove(t)) {
                    Some(_) => Response::new(204, ""),
                    None => service_error(401, "InvalidSession", "invalid session"),
                }
            }
            (HttpMethod::Post, "/auth/session") => {
                let user_id = bearer(&request).and_then(|t| state.refresh_tokens.get(t).cloned());
                match user_id {
                    Some(user_id) => {
                        let token = state.issue_access_token(&user_id);
                        Response::new(201, json!({ "access_token": token }).to_string())
                    }
                    None => service_error(401, "InvalidSession", "invalid session"),
                }
            }
            (HttpMethod::Post, p) if p.ends_with("/functions/call") => {
                Self::call_function(&state, &request)
            }
            _ => Response::new(404, ""),
        }
    }

    fn login(state: &mut BackendState, request: &Request, provider: &str, link: bool) -> Response {
        let body: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);

        let (resolved, email) = match provider {
            "anon-user" => (format!("anon-{}", state.next_id()), None),
            "local-userpass" => {
                let username = body["username"].as_str().unwrap_or_default();
                let password = body["password"].as_str().unwrap_or_default();
                match state.accounts.get(username) {
                    Some((expected, user_id)) if expected == password => {
                        (user_id.clone(), Some(username.to_string()))
                    }
                    _ => {
                        return service_error(401, "InvalidPassword", "invalid username/password")
                    }
                }
            }
            "api-key" => match body["key"].as_str() {
                Some(key) => (format!("apikey-{}", key), None),
                None => return service_error(400, "MissingParameter", "missing key"),
            },
            _ => {
                return service_error(
                    400,
                    "AuthProviderNotFound",
                    &format!("authentication via '{}' is unsupported", provider),
                )
            }
        };

        if link {
            let owner = bearer(request).and_then(|t| state.access_tokens.get(t).cloned());
            let Some(owner) = owner else {
                return service_error(401, "InvalidSession", "invalid session");
            };
            state.add_provider(&owner, provider, email);
            let access_token = state.issue_access_token(&owner);
            return Response::new(
                200,
                json!({ "access_token": access_token, "user_id": owner }).to_string(),
            );
        }

        state.add_provider(&resolved, provider, email);
        let access_token = state.issue_access_token(&resolved);
        let refresh_token = format!("rt-{}", resolved);
        state
            .refresh_tokens
            .insert(refresh_token.clone(), resolved.clone());

        Response::new(
            200,
            json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "user_id": resolved,
                "device_id": format!("device-{}", resolved),
            })
            .to_string(),
        )
    }

    fn profile(state: &BackendState, request: &Request) -> Response {
        let user_id = bearer(request).and_then(|t| state.access_tokens.get(t));
        let Some(user_id) = user_id else {
            return service_error(401, "InvalidSession", "invalid session");
        };

        let user = state.users.get(user_id);
        let identities: Vec<Value> = user
            .map(|u| {
                u.providers
                    .iter()
                    .map(|p| json!({ "id": format!("{}-{}", user_id, p), "provider_type": p }))
                    .collect()
            })
            .unwrap_or_default();
        let email = user.and_then(|u| u.email.clone());

        Response::new(
            200,
            json!({
                "user_id": user_id,
                "identities": identities,
                "data": { "email": email },
            })
            .to_string(),
        )
    }

    fn call_function(state: &BackendState, request: &Request) -> Response {
        if bearer(request)
            .and_then(|t| state.access_tokens.get(t))
            .is_none()
        {
            return service_error(401, "InvalidSession", "invalid session");
        }

        let body: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);
        let arguments = body["arguments"].as_array().cloned().unwrap_or_default();

        match body["name"].as_str().unwrap_or_default() {
            "sum" => {
                let sum: i64 = arguments.iter().filter_map(Value::as_i64).sum();
                Response::new(200, sum.to_string())
            }
            "echo" => Response::new(200, Value::Array(arguments).to_string()),
            "fail" => service_error(400, "FunctionExecutionError", "function failed"),
            name => service_error(
                404,
                "FunctionNotFound",
                &format!("function not found: '{}'", name),
            ),
        }
    }
}

#[async_trait::async_trait]
impl NetworkTransport for FakeBackend {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.respond(request))
    }
}
