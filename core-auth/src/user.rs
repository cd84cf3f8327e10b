//! Non-owning user handles.

use crate::app::{App, AppInner};
use crate::error::{ClientErrorCode, ErrorNormalizer, Result};
use crate::types::{Credentials, ProviderType, UserProfile, UserState};
use crate::user_store::UserRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

/// Handle to one identity of an [`App`].
///
/// A `User` holds the identity key and a weak reference to its App. It never
/// keeps the App alive; once the App is dropped or the record is removed,
/// [`state`](Self::state) reports [`UserState::Removed`] and operations fail
/// with a `client` error.
#[derive(Clone)]
pub struct User {
    identity: String,
    app: Weak<AppInner>,
}

impl User {
    pub(crate) fn new(identity: &str, app: Weak<AppInner>) -> Self {
        Self {
            identity: identity.to_string(),
            app,
        }
    }

    /// Backend identity. Immutable for the lifetime of the handle.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The owning App, if it still exists.
    pub fn app(&self) -> Result<App> {
        self.app.upgrade().map(App::from_inner).ok_or_else(|| {
            ErrorNormalizer::client(
                ClientErrorCode::AppDeallocated,
                format!("the app owning user '{}' no longer exists", self.identity),
            )
        })
    }

    pub(crate) fn belongs_to(&self, app: &Arc<AppInner>) -> bool {
        std::ptr::eq(self.app.as_ptr(), Arc::as_ptr(app))
    }

    fn record(&self) -> Option<UserRecord> {
        self.app.upgrade()?.users.get(&self.identity)
    }

    pub fn state(&self) -> UserState {
        self.record()
            .map_or(UserState::Removed, |record| record.state)
    }

    pub fn is_logged_in(&self) -> bool {
        self.record().is_some_and(|record| record.is_logged_in())
    }

    /// Providers this identity has logged in or linked with.
    pub fn credentials_used(&self) -> BTreeSet<ProviderType> {
        self.record()
            .map(|record| record.credentials_used)
            .unwrap_or_default()
    }

    pub fn device_id(&self) -> Option<String> {
        self.record().and_then(|record| record.device_id)
    }

    pub fn profile(&self) -> UserProfile {
        self.record()
            .map(|record| record.profile)
            .unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<String> {
        self.record()
            .and_then(|record| record.tokens)
            .map(|tokens| tokens.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.record()
            .and_then(|record| record.tokens)
            .map(|tokens| tokens.refresh_token)
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.record().map(|record| record.last_login_at)
    }

    pub async fn log_out(&self) -> Result<()> {
        self.app()?.log_out_user(self).await
    }

    pub async fn link_credentials(&self, credentials: Credentials) -> Result<User> {
        self.app()?.link_user(self, credentials).await
    }

    pub async fn remove(&self) -> Result<()> {
        self.app()?.remove_user(self).await
    }

    pub async fn refresh_access_token(&self) -> Result<()> {
        self.app()?.refresh_access_token(self).await
    }

    /// Calls a backend function as this user.
    pub async fn call_function(&self, name: &str, arguments: &[Value]) -> Result<Value> {
        self.app()?.call_function_as(self, name, arguments).await
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && Weak::ptr_eq(&self.app, &other.app)
    }
}

impl Eq for User {}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
