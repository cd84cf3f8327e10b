//! # Event Bus System
//!
//! Broadcasts session lifecycle events using `tokio::sync::broadcast` so hosts
//! can react to logins, logouts and user switches without polling.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::LoggedIn {
//!         app_id: "my-app".to_string(),
//!         identity: "user-123".to_string(),
//!         provider: "local-userpass".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers is not an error worth surfacing; callers
//! ignore the `SendError`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Identity and session events
    Auth(AuthEvent),
    /// Remote function invocation events
    Function(FunctionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Function(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Function(FunctionEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::LoggedIn { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::LoggedOut { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::UserRemoved { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// The application the event belongs to.
    pub fn app_id(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.app_id(),
            CoreEvent::Function(e) => e.app_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events related to user identities and the current-user slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A login completed and the identity became current.
    LoggedIn {
        app_id: String,
        identity: String,
        /// Provider type used for the login (e.g. "local-userpass").
        provider: String,
    },
    /// An identity gained an additional provider.
    UserLinked {
        app_id: String,
        identity: String,
        provider: String,
    },
    /// An identity's session was invalidated.
    LoggedOut { app_id: String, identity: String },
    /// An identity record was deleted from the local store.
    UserRemoved { app_id: String, identity: String },
    /// The current-user slot now points elsewhere (or nowhere).
    CurrentUserChanged {
        app_id: String,
        identity: Option<String>,
    },
    /// An access token was replaced using the refresh token.
    TokenRefreshed { app_id: String, identity: String },
    /// A session operation failed.
    AuthError {
        app_id: String,
        identity: Option<String>,
        domain: String,
        code: i32,
        message: String,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::LoggedIn { .. } => "User logged in",
            AuthEvent::UserLinked { .. } => "User linked new credentials",
            AuthEvent::LoggedOut { .. } => "User logged out",
            AuthEvent::UserRemoved { .. } => "User removed",
            AuthEvent::CurrentUserChanged { .. } => "Current user changed",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }

    fn app_id(&self) -> &str {
        match self {
            AuthEvent::LoggedIn { app_id, .. }
            | AuthEvent::UserLinked { app_id, .. }
            | AuthEvent::LoggedOut { app_id, .. }
            | AuthEvent::UserRemoved { app_id, .. }
            | AuthEvent::CurrentUserChanged { app_id, .. }
            | AuthEvent::TokenRefreshed { app_id, .. }
            | AuthEvent::AuthError { app_id, .. } => app_id,
        }
    }
}

/// Events related to remote function calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FunctionEvent {
    Called {
        app_id: String,
        identity: String,
        name: String,
    },
    Failed {
        app_id: String,
        identity: String,
        name: String,
        message: String,
    },
}

impl FunctionEvent {
    fn description(&self) -> &str {
        match self {
            FunctionEvent::Called { .. } => "Remote function returned",
            FunctionEvent::Failed { .. } => "Remote function failed",
        }
    }

    fn app_id(&self) -> &str {
        match self {
            FunctionEvent::Called { app_id, .. } | FunctionEvent::Failed { app_id, .. } => app_id,
        }
    }
}

/// Central broadcast channel for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let auth_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Auth(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}
