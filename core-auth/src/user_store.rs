//! # Local Identity Store
//!
//! Owns every identity record an [`App`](crate::App) knows about, plus the
//! current-user slot. Records are keyed by backend identity; user handles
//! hold only that key and resolve through the store on each access.
//!
//! All operations are short and synchronous. Tokens held in records are
//! never logged.

use crate::types::{AuthTokens, ProviderType, UserProfile, UserState};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// One identity known to the store.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub identity: String,
    pub credentials_used: BTreeSet<ProviderType>,
    pub tokens: Option<AuthTokens>,
    pub device_id: Option<String>,
    pub profile: UserProfile,
    pub state: UserState,
    pub last_login_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_logged_in(&self) -> bool {
        self.state == UserState::LoggedIn && self.tokens.is_some()
    }

    /// Whether this identity has only ever used anonymous credentials.
    pub fn is_anonymous_only(&self) -> bool {
        !self.credentials_used.is_empty()
            && self
                .credentials_used
                .iter()
                .all(|provider| *provider == ProviderType::Anonymous)
    }
}

/// Result of a completed login, ready to be stored.
#[derive(Debug, Clone)]
pub(crate) struct LoginOutcome {
    pub identity: String,
    pub tokens: AuthTokens,
    pub device_id: Option<String>,
    pub profile: UserProfile,
    pub providers: BTreeSet<ProviderType>,
}

/// Outcome of moving the current-user slot onto an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Switch {
    Switched { previous: Option<String> },
    NotLoggedIn,
}

#[derive(Default)]
struct Slots {
    users: HashMap<String, UserRecord>,
    current: Option<String>,
}

impl Slots {
    fn most_recent_logged_in(&self, excluded: &str) -> Option<String> {
        self.users
            .values()
            .filter(|record| record.identity != excluded && record.is_logged_in())
            .max_by_key(|record| record.last_login_at)
            .map(|record| record.identity.clone())
    }
}

/// Records and the current slot live under one lock, so the slot can only
/// ever name a logged-in record.
#[derive(Default)]
pub(crate) struct UserStore {
    slots: RwLock<Slots>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read()
    }

    fn slots_mut(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write()
    }

    /// Inserts or refreshes the record for a login and makes it current.
    /// Returns the previous occupant of the current slot.
    pub fn record_login(&self, outcome: LoginOutcome) -> Option<String> {
        let LoginOutcome {
            identity,
            tokens,
            device_id,
            profile,
            providers,
        } = outcome;

        let mut slots = self.slots_mut();
        let record = slots
            .users
            .entry(identity.clone())
            .or_insert_with(|| UserRecord {
                identity: identity.clone(),
                credentials_used: BTreeSet::new(),
                tokens: None,
                device_id: None,
                profile: UserProfile::default(),
                state: UserState::LoggedOut,
                last_login_at: Utc::now(),
            });

        record.credentials_used.extend(providers);
        record.tokens = Some(tokens);
        if device_id.is_some() {
            record.device_id = device_id;
        }
        record.profile = profile;
        record.state = UserState::LoggedIn;
        record.last_login_at = Utc::now();

        debug!(identity = %identity, "Stored login for identity");
        slots.current.replace(identity)
    }

    /// Applies a link result to an existing record. Returns `false` if the
    /// record is missing.
    pub fn record_link(
        &self,
        identity: &str,
        access_token: String,
        profile: UserProfile,
        providers: BTreeSet<ProviderType>,
    ) -> bool {
        self.update(identity, |record| {
            record.credentials_used.extend(providers);
            if let Some(tokens) = record.tokens.as_mut() {
                tokens.access_token = access_token;
            }
            record.profile = profile;
        })
    }

    pub fn update_access_token(&self, identity: &str, access_token: String) -> bool {
        self.update(identity, |record| {
            if let Some(tokens) = record.tokens.as_mut() {
                tokens.access_token = access_token;
            }
        })
    }

    fn update<F>(&self, identity: &str, apply: F) -> bool
    where
        F: FnOnce(&mut UserRecord),
    {
        match self.slots_mut().users.get_mut(identity) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, identity: &str) -> Option<UserRecord> {
        self.slots().users.get(identity).cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.slots().users.contains_key(identity)
    }

    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.slots().users.keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn len(&self) -> usize {
        self.slots().users.len()
    }

    /// Clears tokens and marks the record logged out. Returns `false` if the
    /// record is missing.
    pub fn mark_logged_out(&self, identity: &str) -> bool {
        self.update(identity, |record| {
            record.tokens = None;
            record.state = UserState::LoggedOut;
        })
    }

    pub fn remove(&self, identity: &str) -> Option<UserRecord> {
        self.slots_mut().users.remove(identity)
    }

    pub fn current(&self) -> Option<String> {
        self.slots().current.clone()
    }

    /// Makes `identity` current if its record is logged in.
    pub fn switch_to(&self, identity: &str) -> Switch {
        let mut slots = self.slots_mut();
        let logged_in = slots
            .users
            .get(identity)
            .is_some_and(|record| record.is_logged_in());
        if !logged_in {
            return Switch::NotLoggedIn;
        }
        Switch::Switched {
            previous: slots.current.replace(identity.to_string()),
        }
    }

    /// If `identity` is current, hands the slot to the most recently
    /// logged-in other identity (or empties it). Returns the new occupant
    /// when the slot moved.
    pub fn release(&self, identity: &str) -> Option<Option<String>> {
        let mut slots = self.slots_mut();
        if slots.current.as_deref() != Some(identity) {
            return None;
        }
        let next = slots.most_recent_logged_in(identity);
        slots.current = next.clone();
        Some(next)
    }
}
