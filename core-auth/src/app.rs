//! # Application Session
//!
//! [`App`] is the session object for one backend application. It owns the
//! transport, the local identity store and the current-user slot, and runs
//! the login/link/logout flows against the backend.
//!
//! ## Overview
//!
//! `App` is a cheap handle (`Arc` inside); clones refer to the same session.
//! [`User`] handles returned by the App hold only an identity key and a weak
//! back-reference, so they never keep an App alive and they observe removal.
//!
//! Every asynchronous operation resolves exactly once, either with its value
//! or with an [`AppError`]. A failed operation never advances the session
//! state.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{App, Credentials};
//! use core_runtime::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::builder().build()?;
//! let app = App::new("my-app-id", config, "/tmp/my-app")?;
//!
//! let user = app
//!     .login(Credentials::email_password("a@example.com", "password"))
//!     .await?;
//! assert_eq!(app.current_user(), Some(user.clone()));
//!
//! let sum = app
//!     .call_function("sum", &[serde_json::json!(1), serde_json::json!(2)])
//!     .await?;
//! # let _ = sum;
//! user.log_out().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{
    AppError, ClientErrorCode, ErrorNormalizer, JsonErrorCode, Result, DOMAIN_JSON,
};
use crate::routes::Routes;
use crate::types::{AuthTokens, Credentials, ProviderType, SessionState, UserProfile};
use crate::user::User;
use crate::user_store::{LoginOutcome, Switch, UserRecord, UserStore};
use bridge_traits::{HttpMethod, NetworkTransport, Request, Response};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, Receiver};
use core_runtime::AppConfig;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Device id the backend sends when it has not assigned one.
const NULL_DEVICE_ID: &str = "000000000000000000000000";

/// An in-flight state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    LoggingIn,
    LoggingOut,
}

/// In-flight transitions are counted per kind; the session is settled only
/// when both counts are zero.
#[derive(Debug, Default)]
struct Phase {
    logging_in: usize,
    logging_out: usize,
    error: Option<AppError>,
}

impl Phase {
    fn in_flight(&mut self, transition: Transition) -> &mut usize {
        match transition {
            Transition::LoggingIn => &mut self.logging_in,
            Transition::LoggingOut => &mut self.logging_out,
        }
    }
}

/// Holds one in-flight transition open until dropped, so a cancelled
/// operation still settles the session.
struct TransitionGuard<'a> {
    phase: &'a RwLock<Phase>,
    transition: Transition,
}

impl<'a> TransitionGuard<'a> {
    fn begin(phase: &'a RwLock<Phase>, transition: Transition) -> Self {
        *phase.write().in_flight(transition) += 1;
        Self { phase, transition }
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.phase.write();
        let count = phase.in_flight(self.transition);
        *count = count.saturating_sub(1);
    }
}

pub(crate) struct AppInner {
    app_id: String,
    config: AppConfig,
    root_directory: PathBuf,
    routes: Routes,
    transport: Arc<dyn NetworkTransport>,
    pub(crate) users: UserStore,
    phase: RwLock<Phase>,
    event_bus: EventBus,
}

/// Session object for one backend application.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileIdentity {
    provider_type: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    identities: Vec<ProfileIdentity>,
    #[serde(default)]
    data: UserProfile,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

impl App {
    /// Builds an App with its own event bus.
    ///
    /// Binds `config` to `app_id` and validates it. The transport is made
    /// once, here, through the config's factory.
    pub fn new(
        app_id: &str,
        config: AppConfig,
        root_directory: impl Into<PathBuf>,
    ) -> core_runtime::Result<Self> {
        Self::with_event_bus(app_id, config, root_directory, EventBus::default())
    }

    /// Builds an App that publishes onto a shared event bus.
    pub fn with_event_bus(
        app_id: &str,
        config: AppConfig,
        root_directory: impl Into<PathBuf>,
        event_bus: EventBus,
    ) -> core_runtime::Result<Self> {
        let config = config.with_app_id(app_id)?;
        config.validate()?;

        let routes = Routes::new(config.effective_base_url(), &config.app_id);
        let transport = config.make_transport();
        let root_directory = root_directory.into();

        info!(
            app_id = %config.app_id,
            base_url = %config.effective_base_url(),
            root_directory = %root_directory.display(),
            "App created"
        );

        Ok(Self {
            inner: Arc::new(AppInner {
                app_id: config.app_id.clone(),
                config,
                root_directory,
                routes,
                transport,
                users: UserStore::new(),
                phase: RwLock::new(Phase::default()),
                event_bus,
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<AppInner>) -> Self {
        Self { inner }
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn root_directory(&self) -> &Path {
        &self.inner.root_directory
    }

    /// Whether two handles refer to the same session.
    pub fn ptr_eq(a: &App, b: &App) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Subscribe to this App's auth and function events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Current session state.
    ///
    /// Any login in flight reports `LoggingIn`, then any logout in flight
    /// reports `LoggingOut`. Otherwise the state follows the sticky error and
    /// the current-user slot.
    pub fn state(&self) -> SessionState {
        let phase = self.inner.phase.read();

        if phase.logging_in > 0 {
            return SessionState::LoggingIn;
        }
        if phase.logging_out > 0 {
            return SessionState::LoggingOut;
        }
        if let Some(error) = &phase.error {
            return SessionState::Error(error.clone());
        }
        match self.inner.users.current() {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::NoUser,
        }
    }

    fn begin_transition(&self, transition: Transition) -> TransitionGuard<'_> {
        TransitionGuard::begin(&self.inner.phase, transition)
    }

    fn clear_error(&self) {
        self.inner.phase.write().error = None;
    }

    /// Records a failed transition. Undecodable replies leave the session in
    /// the `Error` state once nothing else is in flight.
    fn fail_transition(&self, identity: Option<&str>, error: &AppError) {
        if error.domain() == DOMAIN_JSON {
            self.inner.phase.write().error = Some(error.clone());
        }
        self.report_error(identity, error);
    }

    fn report_error(&self, identity: Option<&str>, error: &AppError) {
        error!(
            domain = %error.domain(),
            code = error.code(),
            message = %error.message(),
            "Session operation failed"
        );
        self.emit(AuthEvent::AuthError {
            app_id: self.inner.app_id.clone(),
            identity: identity.map(str::to_string),
            domain: error.domain().to_string(),
            code: error.code(),
            message: error.message().to_string(),
        });
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.inner.event_bus.emit(CoreEvent::Auth(event));
    }

    pub(crate) fn emit_event(&self, event: CoreEvent) {
        let _ = self.inner.event_bus.emit(event);
    }

    fn user_handle(&self, identity: &str) -> User {
        User::new(identity, Arc::downgrade(&self.inner))
    }

    /// Resolves a user handle to its record in this App.
    pub(crate) fn record_for(&self, user: &User) -> Result<UserRecord> {
        if !user.belongs_to(&self.inner) {
            return Err(ErrorNormalizer::client(
                ClientErrorCode::UserNotFound,
                format!("user '{}' does not belong to app '{}'", user.identity(), self.app_id()),
            ));
        }

        self.inner.users.get(user.identity()).ok_or_else(|| {
            ErrorNormalizer::client(
                ClientErrorCode::UserNotFound,
                format!("user '{}' is not in the local store", user.identity()),
            )
        })
    }

    pub(crate) fn logged_in_tokens(&self, user: &User) -> Result<AuthTokens> {
        let record = self.record_for(user)?;
        match record.tokens {
            Some(tokens) if record.is_logged_in() => Ok(tokens),
            _ => Err(ErrorNormalizer::client(
                ClientErrorCode::UserNotLoggedIn,
                format!("user '{}' is not logged in", user.identity()),
            )),
        }
    }

    // Transport plumbing

    pub(crate) fn request(&self, method: HttpMethod, url: String) -> Request {
        Request::new(method, url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .timeout_ms(self.inner.config.default_request_timeout_ms)
    }

    /// Sends a request; only transport failures are errors.
    pub(crate) async fn send_raw(&self, request: Request) -> Result<Response> {
        debug!(method = %request.method, url = %request.url, "Dispatching request");
        self.inner.transport.send(request).await.map_err(|e| {
            warn!(error = %e, "Transport failed");
            ErrorNormalizer::from_transport(&e)
        })
    }

    /// Sends a request and classifies the response.
    pub(crate) async fn send(&self, request: Request) -> Result<Response> {
        ErrorNormalizer::check(self.send_raw(request).await?)
    }

    pub(crate) fn routes(&self) -> &Routes {
        &self.inner.routes
    }

    fn decode<T: DeserializeOwned>(response: &Response) -> Result<T> {
        serde_json::from_str(&response.body).map_err(|e| {
            let code = if e.is_data() {
                JsonErrorCode::MissingJsonKey
            } else {
                JsonErrorCode::MalformedJson
            };
            ErrorNormalizer::json(code, e.to_string())
        })
    }

    fn device_info(&self) -> Value {
        let config = &self.inner.config;
        let mut device = Map::new();
        if let Some(name) = &config.local_app_name {
            device.insert("appId".to_string(), Value::String(name.clone()));
        }
        if let Some(version) = &config.local_app_version {
            device.insert("appVersion".to_string(), Value::String(version.clone()));
        }
        device.insert(
            "platform".to_string(),
            Value::String(std::env::consts::OS.to_string()),
        );
        device.insert("sdk".to_string(), Value::String("Rust".to_string()));
        device.insert(
            "sdkVersion".to_string(),
            Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        Value::Object(device)
    }

    fn ensure_known_provider(&self, credentials: &Credentials) -> Result<()> {
        if credentials.provider().is_known() {
            return Ok(());
        }
        Err(ErrorNormalizer::client(
            ClientErrorCode::InvalidProvider,
            format!("unsupported provider type '{}'", credentials.provider()),
        ))
    }

    /// Runs the login exchange followed by a profile fetch.
    ///
    /// With `link_token`, the credentials are linked to the identity that
    /// owns that access token. Nothing is stored here.
    async fn authenticate(
        &self,
        credentials: &Credentials,
        link_token: Option<&str>,
    ) -> Result<LoginOutcome> {
        let provider = credentials.provider();
        let url = match link_token {
            Some(_) => self.inner.routes.link(provider),
            None => self.inner.routes.login(provider),
        };

        let mut request = self
            .request(HttpMethod::Post, url)
            .body(credentials.login_body(self.device_info()).to_string());
        if let Some(token) = link_token {
            request = request.bearer_token(token);
        }

        let login: LoginResponse = Self::decode(&self.send(request).await?)?;

        let profile_request = self
            .request(HttpMethod::Get, self.inner.routes.profile())
            .bearer_token(&login.access_token);
        let profile: ProfileResponse = Self::decode(&self.send(profile_request).await?)?;

        let mut providers: BTreeSet<ProviderType> = profile
            .identities
            .iter()
            .map(|identity| ProviderType::parse(&identity.provider_type))
            .collect();
        providers.insert(provider.clone());

        let refresh_token = match (login.refresh_token, link_token) {
            (Some(token), _) => token,
            (None, Some(_)) => String::new(),
            (None, None) => {
                return Err(ErrorNormalizer::json(
                    JsonErrorCode::MissingJsonKey,
                    "login reply has no refresh_token",
                ))
            }
        };

        Ok(LoginOutcome {
            identity: login.user_id,
            tokens: AuthTokens {
                access_token: login.access_token,
                refresh_token,
            },
            device_id: login.device_id.filter(|id| id != NULL_DEVICE_ID),
            profile: profile.data,
            providers,
        })
    }

    /// Logs in with `credentials`. The resulting user becomes current.
    #[instrument(skip(self, credentials), fields(app_id = %self.app_id(), provider = %credentials.provider()))]
    pub async fn login(&self, credentials: Credentials) -> Result<User> {
        if let Err(error) = self.ensure_known_provider(&credentials) {
            warn!("Rejected login with unknown provider");
            self.report_error(None, &error);
            return Err(error);
        }

        info!("Logging in");
        let transition = self.begin_transition(Transition::LoggingIn);

        let outcome = match self.authenticate(&credentials, None).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.fail_transition(None, &error);
                return Err(error);
            }
        };

        let identity = outcome.identity.clone();
        let previous = self.inner.users.record_login(outcome);
        self.clear_error();
        drop(transition);

        self.emit(AuthEvent::LoggedIn {
            app_id: self.inner.app_id.clone(),
            identity: identity.clone(),
            provider: credentials.provider().to_string(),
        });
        if previous.as_deref() != Some(identity.as_str()) {
            self.emit(AuthEvent::CurrentUserChanged {
                app_id: self.inner.app_id.clone(),
                identity: Some(identity.clone()),
            });
        }

        info!(identity = %identity, "Login completed");
        Ok(self.user_handle(&identity))
    }

    /// Links `credentials` to an already logged-in user.
    #[instrument(skip(self, user, credentials), fields(app_id = %self.app_id(), identity = %user.identity(), provider = %credentials.provider()))]
    pub async fn link_user(&self, user: &User, credentials: Credentials) -> Result<User> {
        let tokens = match self
            .ensure_known_provider(&credentials)
            .and_then(|_| self.logged_in_tokens(user))
        {
            Ok(tokens) => tokens,
            Err(error) => {
                self.report_error(Some(user.identity()), &error);
                return Err(error);
            }
        };

        info!("Linking credentials");
        let outcome = self
            .authenticate(&credentials, Some(&tokens.access_token))
            .await
            .and_then(|outcome| {
                if outcome.identity == user.identity() {
                    Ok(outcome)
                } else {
                    Err(ErrorNormalizer::client(
                        ClientErrorCode::IdentityMismatch,
                        format!(
                            "linked credentials resolved to identity '{}'",
                            outcome.identity
                        ),
                    ))
                }
            });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report_error(Some(user.identity()), &error);
                return Err(error);
            }
        };

        if !self.inner.users.record_link(
            user.identity(),
            outcome.tokens.access_token,
            outcome.profile,
            outcome.providers,
        ) {
            let error = ErrorNormalizer::client(
                ClientErrorCode::UserNotFound,
                format!("user '{}' was removed while linking", user.identity()),
            );
            self.report_error(Some(user.identity()), &error);
            return Err(error);
        }

        self.emit(AuthEvent::UserLinked {
            app_id: self.inner.app_id.clone(),
            identity: user.identity().to_string(),
            provider: credentials.provider().to_string(),
        });
        info!("Credentials linked");
        Ok(user.clone())
    }

    /// Makes `user` current. A user that is unknown here or not logged in
    /// leaves the slot unchanged.
    pub fn switch_user(&self, user: &User) -> User {
        if let Err(error) = self.record_for(user) {
            warn!(app_id = %self.app_id(), identity = %user.identity(), error = %error, "Cannot switch to user");
            return user.clone();
        }

        match self.inner.users.switch_to(user.identity()) {
            Switch::Switched { previous } => {
                if previous.as_deref() != Some(user.identity()) {
                    debug!(app_id = %self.app_id(), identity = %user.identity(), "Switched current user");
                    self.emit(AuthEvent::CurrentUserChanged {
                        app_id: self.inner.app_id.clone(),
                        identity: Some(user.identity().to_string()),
                    });
                }
            }
            Switch::NotLoggedIn => {
                warn!(app_id = %self.app_id(), identity = %user.identity(), "Cannot switch to a logged-out user");
            }
        }
        user.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        let identity = self.inner.users.current()?;
        self.inner
            .users
            .contains(&identity)
            .then(|| self.user_handle(&identity))
    }

    /// Point-in-time snapshot of every identity in the local store.
    pub fn all_users(&self) -> HashMap<String, User> {
        self.inner
            .users
            .identities()
            .into_iter()
            .map(|identity| {
                let user = self.user_handle(&identity);
                (identity, user)
            })
            .collect()
    }

    /// Logs out the current user.
    pub async fn log_out(&self) -> Result<()> {
        match self.current_user() {
            Some(user) => self.log_out_user(&user).await,
            None => {
                let error =
                    ErrorNormalizer::client(ClientErrorCode::NoCurrentUser, "no user is logged in");
                self.report_error(None, &error);
                Err(error)
            }
        }
    }

    /// Revokes the user's session and marks it logged out. Logging out a
    /// user that is already logged out succeeds without a request.
    ///
    /// Users that only ever logged in anonymously are removed instead, since
    /// they can never log in again.
    #[instrument(skip(self, user), fields(app_id = %self.app_id(), identity = %user.identity()))]
    pub async fn log_out_user(&self, user: &User) -> Result<()> {
        let record = match self.record_for(user) {
            Ok(record) => record,
            Err(error) => {
                self.report_error(Some(user.identity()), &error);
                return Err(error);
            }
        };

        let tokens = match (&record.tokens, record.is_logged_in()) {
            (Some(tokens), true) => tokens.clone(),
            _ => {
                debug!("User already logged out");
                return Ok(());
            }
        };

        info!("Logging out");
        let transition = self.begin_transition(Transition::LoggingOut);

        if let Err(error) = self.revoke_session(&tokens.refresh_token).await {
            self.fail_transition(Some(user.identity()), &error);
            return Err(error);
        }

        if record.is_anonymous_only() {
            self.inner.users.remove(user.identity());
        } else {
            self.inner.users.mark_logged_out(user.identity());
        }
        drop(transition);

        self.emit(AuthEvent::LoggedOut {
            app_id: self.inner.app_id.clone(),
            identity: user.identity().to_string(),
        });
        if record.is_anonymous_only() {
            self.emit(AuthEvent::UserRemoved {
                app_id: self.inner.app_id.clone(),
                identity: user.identity().to_string(),
            });
        }
        self.release_current(user.identity());

        info!("Logout completed");
        Ok(())
    }

    /// Deletes the user from the local store. A logged-in user's server
    /// session is revoked first; a revocation failure is logged and the
    /// removal still happens.
    #[instrument(skip(self, user), fields(app_id = %self.app_id(), identity = %user.identity()))]
    pub async fn remove_user(&self, user: &User) -> Result<()> {
        let record = match self.record_for(user) {
            Ok(record) => record,
            Err(error) => {
                self.report_error(Some(user.identity()), &error);
                return Err(error);
            }
        };

        if let (Some(tokens), true) = (&record.tokens, record.is_logged_in()) {
            if let Err(error) = self.revoke_session(&tokens.refresh_token).await {
                warn!(error = %error, "Server session revoke failed, removing locally");
            }
        }

        self.inner.users.remove(user.identity());
        self.emit(AuthEvent::UserRemoved {
            app_id: self.inner.app_id.clone(),
            identity: user.identity().to_string(),
        });
        self.release_current(user.identity());

        info!("User removed");
        Ok(())
    }

    /// Moves the current slot off `identity` if it is there.
    fn release_current(&self, identity: &str) {
        let Some(next) = self.inner.users.release(identity) else {
            return;
        };
        debug!(next = ?next, "Current user released");
        self.emit(AuthEvent::CurrentUserChanged {
            app_id: self.inner.app_id.clone(),
            identity: next,
        });
    }

    async fn revoke_session(&self, refresh_token: &str) -> Result<()> {
        let request = self
            .request(HttpMethod::Delete, self.inner.routes.session())
            .bearer_token(refresh_token);
        self.send(request).await.map(|_| ())
    }

    /// Exchanges the user's refresh token for a new access token.
    #[instrument(skip(self, user), fields(app_id = %self.app_id(), identity = %user.identity()))]
    pub async fn refresh_access_token(&self, user: &User) -> Result<()> {
        let result = self.refresh_tokens(user).await;
        match &result {
            Ok(()) => {
                self.emit(AuthEvent::TokenRefreshed {
                    app_id: self.inner.app_id.clone(),
                    identity: user.identity().to_string(),
                });
                info!("Access token refreshed");
            }
            Err(error) => self.report_error(Some(user.identity()), error),
        }
        result
    }

    async fn refresh_tokens(&self, user: &User) -> Result<()> {
        let tokens = self.logged_in_tokens(user)?;
        let request = self
            .request(HttpMethod::Post, self.inner.routes.session())
            .bearer_token(&tokens.refresh_token);
        let refreshed: RefreshResponse = Self::decode(&self.send(request).await?)?;

        if self
            .inner
            .users
            .update_access_token(user.identity(), refreshed.access_token)
        {
            Ok(())
        } else {
            Err(ErrorNormalizer::client(
                ClientErrorCode::UserNotFound,
                format!("user '{}' was removed during refresh", user.identity()),
            ))
        }
    }
}

impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        App::ptr_eq(self, other)
    }
}

impl Eq for App {}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("app_id", &self.inner.app_id)
            .field("root_directory", &self.inner.root_directory)
            .field("users", &self.inner.users.len())
            .field("state", &self.state())
            .finish()
    }
}
