use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Authentication provider type.
///
/// The string form is the backend's provider identifier and is used verbatim
/// in login routes. Identifiers this crate does not recognize are kept as
/// [`ProviderType::Unknown`] so they can still be reported, but logging in
/// with one fails locally.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderType;
///
/// assert_eq!(ProviderType::UsernamePassword.as_str(), "local-userpass");
/// assert_eq!(ProviderType::parse("anon-user"), ProviderType::Anonymous);
/// assert!(!ProviderType::parse("carrier-pigeon").is_known());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderType {
    Anonymous,
    UsernamePassword,
    ApiKey,
    CustomToken,
    Function,
    Google,
    Apple,
    Facebook,
    Unknown(String),
}

impl ProviderType {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderType::Anonymous => "anon-user",
            ProviderType::UsernamePassword => "local-userpass",
            ProviderType::ApiKey => "api-key",
            ProviderType::CustomToken => "custom-token",
            ProviderType::Function => "custom-function",
            ProviderType::Google => "oauth2-google",
            ProviderType::Apple => "oauth2-apple",
            ProviderType::Facebook => "oauth2-facebook",
            ProviderType::Unknown(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "anon-user" => ProviderType::Anonymous,
            "local-userpass" => ProviderType::UsernamePassword,
            "api-key" => ProviderType::ApiKey,
            "custom-token" => ProviderType::CustomToken,
            "custom-function" => ProviderType::Function,
            "oauth2-google" => ProviderType::Google,
            "oauth2-apple" => ProviderType::Apple,
            "oauth2-facebook" => ProviderType::Facebook,
            other => ProviderType::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ProviderType::Unknown(_))
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific login material.
///
/// The payload is sent as the login request body. Its values are never
/// logged; `Debug` only prints the key names.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    provider: ProviderType,
    payload: Map<String, Value>,
}

impl Credentials {
    pub fn new(provider: ProviderType, payload: Map<String, Value>) -> Self {
        Self { provider, payload }
    }

    pub fn anonymous() -> Self {
        Self::new(ProviderType::Anonymous, Map::new())
    }

    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("username".to_string(), Value::String(email.into()));
        payload.insert("password".to_string(), Value::String(password.into()));
        Self::new(ProviderType::UsernamePassword, payload)
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("key".to_string(), Value::String(key.into()));
        Self::new(ProviderType::ApiKey, payload)
    }

    pub fn custom_token(token: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("token".to_string(), Value::String(token.into()));
        Self::new(ProviderType::CustomToken, payload)
    }

    /// Credentials checked by a backend-side authentication function.
    pub fn function(payload: Map<String, Value>) -> Self {
        Self::new(ProviderType::Function, payload)
    }

    pub fn google_id_token(id_token: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("id_token".to_string(), Value::String(id_token.into()));
        Self::new(ProviderType::Google, payload)
    }

    pub fn apple(id_token: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("id_token".to_string(), Value::String(id_token.into()));
        Self::new(ProviderType::Apple, payload)
    }

    pub fn facebook(access_token: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "accessToken".to_string(),
            Value::String(access_token.into()),
        );
        Self::new(ProviderType::Facebook, payload)
    }

    pub fn provider(&self) -> &ProviderType {
        &self.provider
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Login request body: the payload plus `options.device`.
    pub(crate) fn login_body(&self, device: Value) -> Value {
        let mut body = self.payload.clone();
        let mut options = Map::new();
        options.insert("device".to_string(), device);
        body.insert("options".to_string(), Value::Object(options));
        Value::Object(body)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("payload_keys", &self.payload.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Session lifecycle of an [`App`](crate::App).
///
/// ```text
/// NoUser --login--> LoggingIn --ok--> Authenticated
///                        \--err--> (previous state)
/// Authenticated --logOut--> LoggingOut --> NoUser | Authenticated(other)
/// any --unrecoverable--> Error
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NoUser,
    LoggingIn,
    /// A current user exists; carries its identity.
    Authenticated(String),
    LoggingOut,
    /// A reply was accepted but could not be understood. Cleared by the
    /// next successful login.
    Error(AppError),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, SessionState::LoggingIn | SessionState::LoggingOut)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NoUser => write!(f, "No User"),
            SessionState::LoggingIn => write!(f, "Logging In..."),
            SessionState::Authenticated(identity) => write!(f, "Authenticated ({})", identity),
            SessionState::LoggingOut => write!(f, "Logging Out..."),
            SessionState::Error(error) => write!(f, "Error ({})", error),
        }
    }
}

/// State of a single identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserState {
    LoggedIn,
    LoggedOut,
    /// The record is gone from the store, or its app no longer exists.
    Removed,
}

/// Profile data returned by the backend for an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "picture")]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Access/refresh token pair for a logged-in identity.
///
/// Tokens should never be logged. The `Debug` implementation redacts them.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorNormalizer;
    use serde_json::json;

    #[test]
    fn test_provider_round_trip() {
        for provider in [
            ProviderType::Anonymous,
            ProviderType::UsernamePassword,
            ProviderType::ApiKey,
            ProviderType::CustomToken,
            ProviderType::Function,
            ProviderType::Google,
            ProviderType::Apple,
            ProviderType::Facebook,
        ] {
            assert_eq!(ProviderType::parse(provider.as_str()), provider);
            assert!(provider.is_known());
        }
    }

    #[test]
    fn test_unknown_provider_keeps_name() {
        let provider = ProviderType::parse("oauth2-myspace");
        assert_eq!(provider, ProviderType::Unknown("oauth2-myspace".to_string()));
        assert_eq!(provider.to_string(), "oauth2-myspace");
        assert!(!provider.is_known());
    }

    #[test]
    fn test_login_body_merges_device_options() {
        let credentials = Credentials::email_password("a@example.com", "secret");
        let body = credentials.login_body(json!({"platform": "linux"}));

        assert_eq!(body["username"], "a@example.com");
        assert_eq!(body["password"], "secret");
        assert_eq!(body["options"]["device"]["platform"], "linux");
    }

    #[test]
    fn test_credentials_debug_redacts_values() {
        let credentials = Credentials::api_key("very-secret-key");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("ApiKey"));
        assert!(debug.contains("key"));
        assert!(!debug.contains("very-secret-key"));
    }

    #[test]
    fn test_tokens_debug_redacts() {
        let tokens = AuthTokens {
            access_token: "at-123".to_string(),
            refresh_token: "rt-456".to_string(),
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("at-123"));
        assert!(!debug.contains("rt-456"));
    }

    #[test]
    fn test_session_state_helpers() {
        assert_eq!(SessionState::default(), SessionState::NoUser);
        assert!(SessionState::Authenticated("u1".into()).is_authenticated());
        assert!(SessionState::LoggingIn.is_in_progress());
        assert!(!SessionState::NoUser.is_in_progress());

        let error = SessionState::Error(ErrorNormalizer::normalize("json", 1, "bad"));
        assert_eq!(error.to_string(), "Error (json error 1: bad)");
    }

    #[test]
    fn test_profile_deserializes_backend_shape() {
        let profile: UserProfile = serde_json::from_value(json!({
            "email": "a@example.com",
            "picture": "https://example.com/a.png",
            "extra": true
        }))
        .unwrap();
        assert_eq!(profile.email.as_deref(), Some("a@example.com"));
        assert_eq!(profile.picture_url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(profile.name, None);
    }
}
