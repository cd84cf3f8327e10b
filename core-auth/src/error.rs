//! # Error Normalization
//!
//! Every failure a caller sees is an [`AppError`] carrying a `domain`, a
//! numeric `code` and a `message`. `AppError`s are only produced here, by
//! [`ErrorNormalizer`], whatever the source: a transport failure, a backend
//! error reply, an undecodable body, or a local precondition.
//!
//! ## Domains
//!
//! | Domain | Source | Code |
//! |---|---|---|
//! | `custom` | transport failure or non-zero custom status | the (negative) custom status |
//! | `service` | non-2xx reply with an `error_code` body | [`ServiceErrorCode`] |
//! | `http` | non-2xx reply without a structured body | HTTP status |
//! | `json` | success reply that could not be decoded | [`JsonErrorCode`] |
//! | `client` | local precondition failure | [`ClientErrorCode`] |

use bridge_traits::{BridgeError, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DOMAIN_CLIENT: &str = "client";
pub const DOMAIN_SERVICE: &str = "service";
pub const DOMAIN_HTTP: &str = "http";
pub const DOMAIN_JSON: &str = "json";
pub const DOMAIN_CUSTOM: &str = "custom";

/// Domain used when a backend error arrives without a category.
const DOMAIN_UNKNOWN: &str = "unknown";

/// Structured, user-facing error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{domain} error {code}: {message}")]
pub struct AppError {
    domain: String,
    code: i32,
    message: String,
}

impl AppError {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_client_error(&self, code: ClientErrorCode) -> bool {
        self.domain == DOMAIN_CLIENT && self.code == code as i32
    }

    pub fn is_service_error(&self, code: ServiceErrorCode) -> bool {
        self.domain == DOMAIN_SERVICE && self.code == code as i32
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Local precondition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ClientErrorCode {
    UserNotFound = 1,
    UserNotLoggedIn = 2,
    AppDeallocated = 3,
    NoCurrentUser = 4,
    InvalidProvider = 5,
    IdentityMismatch = 6,
}

/// Failures decoding a reply the backend reported as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JsonErrorCode {
    MalformedJson = 1,
    MissingJsonKey = 2,
    BadResult = 3,
}

/// Backend error codes, keyed by the `error_code` string of an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServiceErrorCode {
    Unknown = -1,
    MissingAuthReq = 1,
    InvalidSession = 2,
    UserAppDomainMismatch = 3,
    DomainNotAllowed = 4,
    ReadSizeLimitExceeded = 5,
    InvalidParameter = 6,
    MissingParameter = 7,
    FunctionExecutionError = 14,
    NoMatchingRuleFound = 15,
    InternalServerError = 16,
    AuthProviderNotFound = 17,
    ServiceNotFound = 19,
    FunctionNotFound = 26,
    FunctionSyntaxError = 29,
    FunctionInvalid = 30,
    UserNotFound = 45,
    UserDisabled = 46,
    AuthError = 47,
    BadRequest = 48,
    AccountNameInUse = 49,
    InvalidPassword = 50,
    ApiKeyNotFound = 51,
    NotCallable = 52,
}

impl ServiceErrorCode {
    pub fn from_error_code(error_code: &str) -> Self {
        match error_code {
            "MissingAuthReq" => Self::MissingAuthReq,
            "InvalidSession" => Self::InvalidSession,
            "UserAppDomainMismatch" => Self::UserAppDomainMismatch,
            "DomainNotAllowed" => Self::DomainNotAllowed,
            "ReadSizeLimitExceeded" => Self::ReadSizeLimitExceeded,
            "InvalidParameter" => Self::InvalidParameter,
            "MissingParameter" => Self::MissingParameter,
            "FunctionExecutionError" => Self::FunctionExecutionError,
            "NoMatchingRuleFound" => Self::NoMatchingRuleFound,
            "InternalServerError" => Self::InternalServerError,
            "AuthProviderNotFound" => Self::AuthProviderNotFound,
            "ServiceNotFound" => Self::ServiceNotFound,
            "FunctionNotFound" => Self::FunctionNotFound,
            "FunctionSyntaxError" => Self::FunctionSyntaxError,
            "FunctionInvalid" => Self::FunctionInvalid,
            "UserNotFound" => Self::UserNotFound,
            "UserDisabled" => Self::UserDisabled,
            "AuthError" => Self::AuthError,
            "BadRequest" => Self::BadRequest,
            "AccountNameInUse" => Self::AccountNameInUse,
            "InvalidPassword" => Self::InvalidPassword,
            "APIKeyNotFound" | "ApiKeyNotFound" => Self::ApiKeyNotFound,
            "NotCallable" => Self::NotCallable,
            _ => Self::Unknown,
        }
    }
}

/// A raw backend error before normalization.
///
/// A `BackendError` whose `code` is absent or zero does not represent a
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub category: String,
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl BackendError {
    pub fn new(category: impl Into<String>, code: Option<i32>, message: Option<String>) -> Self {
        Self {
            category: category.into(),
            code,
            message,
        }
    }

    /// Whether this value carries an actual error code.
    pub fn is_failure(&self) -> bool {
        self.code.is_some_and(|code| code != 0)
    }
}

/// Error body returned by the backend alongside a non-2xx status.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

/// Translates failures from every tier into [`AppError`].
pub struct ErrorNormalizer;

impl ErrorNormalizer {
    /// Maps `{category, code, message}` to an [`AppError`].
    ///
    /// Never fails. The domain is kept even when the message is empty; an
    /// empty category becomes `"unknown"` so the domain is never blank.
    pub fn normalize(category: &str, code: i32, message: &str) -> AppError {
        let domain = if category.trim().is_empty() {
            DOMAIN_UNKNOWN
        } else {
            category
        };

        AppError {
            domain: domain.to_string(),
            code,
            message: message.to_string(),
        }
    }

    pub fn from_backend(error: BackendError) -> AppError {
        Self::normalize(
            &error.category,
            error.code.unwrap_or(0),
            error.message.as_deref().unwrap_or_default(),
        )
    }

    /// Resolves an operation outcome: success iff `error` is absent or
    /// carries no error code.
    pub fn resolve<T>(value: T, error: Option<BackendError>) -> Result<T> {
        match error {
            Some(error) if error.is_failure() => Err(Self::from_backend(error)),
            _ => Ok(value),
        }
    }

    /// Classifies a transport response. `None` means the response is a success.
    pub fn check_response(response: &Response) -> Option<BackendError> {
        if response.custom_status_code != 0 {
            return Some(BackendError::new(
                DOMAIN_CUSTOM,
                Some(response.custom_status_code),
                Some(non_empty_or(
                    &response.body,
                    format!(
                        "transport reported custom status {}",
                        response.custom_status_code
                    ),
                )),
            ));
        }

        if (200..300).contains(&response.http_status_code) {
            return None;
        }

        if response.http_status_code <= 0 {
            return Some(BackendError::new(
                DOMAIN_CUSTOM,
                Some(-1),
                Some(format!(
                    "transport returned no HTTP status ({})",
                    response.http_status_code
                )),
            ));
        }

        if let Ok(body) = serde_json::from_str::<ServiceErrorBody>(&response.body) {
            if body.error.is_some() || body.error_code.is_some() {
                let code = body
                    .error_code
                    .as_deref()
                    .map(ServiceErrorCode::from_error_code)
                    .unwrap_or(ServiceErrorCode::Unknown);
                return Some(BackendError::new(
                    DOMAIN_SERVICE,
                    Some(code as i32),
                    body.error,
                ));
            }
        }

        Some(BackendError::new(
            DOMAIN_HTTP,
            Some(response.http_status_code),
            Some(non_empty_or(
                &response.body,
                format!("http error code considered fatal: {}", response.http_status_code),
            )),
        ))
    }

    /// Turns a transport response into `Ok(response)` or the matching error.
    pub fn check(response: Response) -> Result<Response> {
        let error = Self::check_response(&response);
        Self::resolve(response, error)
    }

    pub fn from_transport(error: &BridgeError) -> AppError {
        Self::normalize(
            DOMAIN_CUSTOM,
            error.custom_status_code(),
            &error.to_string(),
        )
    }

    pub fn client(code: ClientErrorCode, message: impl AsRef<str>) -> AppError {
        Self::normalize(DOMAIN_CLIENT, code as i32, message.as_ref())
    }

    pub fn json(code: JsonErrorCode, message: impl AsRef<str>) -> AppError {
        Self::normalize(DOMAIN_JSON, code as i32, message.as_ref())
    }
}

fn non_empty_or(body: &str, fallback: String) -> String {
    if body.trim().is_empty() {
        fallback
    } else {
        body.to_string()
    }
}
