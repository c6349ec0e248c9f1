//! Authenticated-principal state machine.
//!
//! ```text
//! Anonymous ──login/register──▶ Authenticating ──ok──▶ Authenticated
//!   ▲     ▲                        ▲      │                  │
//!   │     │                  retry │      │ fail             │ logout / expiry
//!   │     └──── clear_error ─── Error ◀───┘                  │
//!   └────────────────────────────────────────────────────────┘
//! ```
//!
//! Sign-in persists the principal, attaches the user's caches and enables
//! the session, in that order. Sign-out runs the reverse: the session is
//! disabled before the caches are detached, so no activity arriving
//! mid-logout can re-arm a timer. Inactivity expiry runs the same sign-out
//! with [`LogoutReason::Inactivity`].

use std::fmt;
use std::sync::{Arc, Weak};

use kiosk_session::{SessionEvent, SessionOrchestrator, SubscriptionId, TimerConfig};
use kiosk_store::{CacheCoordinator, KeyValueStore, PRINCIPAL_KEY};
use kiosk_types::{Principal, UserId};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::directory::{Credentials, Registration, UserDirectory};
use crate::error::{AuthError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticating,
    Authenticated,
    /// The last attempt failed. Unauthenticated; a retry is allowed.
    Error,
}

/// Why the last sign-out happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserInitiated,
    /// The session expired through inactivity.
    Inactivity,
    /// The account was deleted.
    AccountDeleted,
}

impl LogoutReason {
    pub fn expired_due_to_inactivity(&self) -> bool {
        matches!(self, LogoutReason::Inactivity)
    }
}

/// Notification of a controller transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Principal),
    SignedOut { user: UserId, reason: LogoutReason },
    SignInFailed { message: String },
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub principal: Option<Principal>,
    pub error: Option<String>,
}

struct ControllerState {
    status: AuthStatus,
    principal: Option<Principal>,
    error: Option<String>,
    last_logout_reason: Option<LogoutReason>,
    /// Bumped whenever an in-flight attempt must be discarded.
    attempt: u64,
    disposed: bool,
}

struct ControllerShared {
    directory: Arc<dyn UserDirectory>,
    backend: Arc<dyn KeyValueStore>,
    caches: Arc<CacheCoordinator>,
    session: SessionOrchestrator,
    timer_config: TimerConfig,
    state: Mutex<ControllerState>,
    subscription: Mutex<Option<SubscriptionId>>,
    events: broadcast::Sender<AuthEvent>,
}

/// Sequences the user directory, the cache coordinator and the session
/// orchestrator as the signed-in principal changes.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct AuthSessionController {
    shared: Arc<ControllerShared>,
}

impl AuthSessionController {
    /// Create a controller and subscribe it to session expiry.
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        backend: Arc<dyn KeyValueStore>,
        caches: Arc<CacheCoordinator>,
        session: SessionOrchestrator,
        timer_config: TimerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(ControllerShared {
            directory,
            backend,
            caches,
            session,
            timer_config,
            state: Mutex::new(ControllerState {
                status: AuthStatus::Anonymous,
                principal: None,
                error: None,
                last_logout_reason: None,
                attempt: 0,
                disposed: false,
            }),
            subscription: Mutex::new(None),
            events,
        });

        let weak: Weak<ControllerShared> = Arc::downgrade(&shared);
        let id = shared.session.subscribe(move |event| {
            if *event != SessionEvent::Expired {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                shared.sign_out(LogoutReason::Inactivity);
            }
        });
        *shared.subscription.lock() = Some(id);

        Self { shared }
    }

    /// Sign in with email and password.
    pub async fn login(&self, credentials: Credentials) -> Result<Principal> {
        let attempt = self.shared.begin_attempt()?;
        debug!(email = %credentials.email, "Signing in");
        let result = self.shared.directory.authenticate(&credentials).await;
        self.shared.finish_attempt(attempt, result)
    }

    /// Create an account and sign in to it.
    pub async fn register(&self, registration: Registration) -> Result<Principal> {
        let attempt = self.shared.begin_attempt()?;
        debug!(email = %registration.email, "Registering");
        let result = self.shared.directory.register(&registration).await;
        self.shared.finish_attempt(attempt, result)
    }

    /// Sign out. Returns false if nobody was signed in.
    ///
    /// An attempt still in flight is discarded.
    pub fn logout(&self) -> bool {
        self.shared.sign_out(LogoutReason::UserInitiated)
    }

    /// Restore a principal persisted by an earlier run, without
    /// re-verifying credentials.
    pub fn initialize_from_persisted_principal(&self) -> Option<Principal> {
        let raw = match self.shared.backend.get(PRINCIPAL_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted principal");
                return None;
            }
        };
        let principal = match Principal::from_json(&raw) {
            Ok(principal) => principal,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted principal");
                return None;
            }
        };

        {
            let mut state = self.shared.state.lock();
            if state.disposed || state.status == AuthStatus::Authenticated {
                return None;
            }
            state.attempt += 1;
            self.shared.enter_authenticated(&mut state, &principal);
        }
        info!(user = %principal.id, "Restored persisted session");
        self.shared.emit(AuthEvent::SignedIn(principal.clone()));
        Some(principal)
    }

    /// Remove the account from the directory, then sign out and delete the
    /// user's stored cart and orders.
    ///
    /// If the directory refuses, nothing else changes.
    pub async fn delete_account(&self) -> Result<()> {
        let user = self
            .principal()
            .map(|p| p.id)
            .ok_or(AuthError::NotAuthenticated)?;

        self.shared.directory.remove(&user).await?;

        // Someone else may have signed in while the directory answered.
        if self.principal().is_some_and(|p| p.id == user) {
            self.shared.sign_out(LogoutReason::AccountDeleted);
        }
        self.shared.caches.delete_user_data(&user);
        info!(user = %user, "Account deleted");
        Ok(())
    }

    /// Leave the Error state.
    pub fn clear_error(&self) {
        let mut state = self.shared.state.lock();
        if state.status == AuthStatus::Error {
            state.status = AuthStatus::Anonymous;
            state.error = None;
        }
    }

    /// Stop reacting to session events and discard any in-flight attempt.
    /// Idempotent.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.attempt += 1;
            if state.status == AuthStatus::Authenticating {
                state.status = AuthStatus::Anonymous;
            }
        }
        if let Some(id) = self.shared.subscription.lock().take() {
            self.shared.session.unsubscribe(id);
        }
        debug!("Auth controller disposed");
    }

    pub fn status(&self) -> AuthStatus {
        self.shared.state.lock().status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    pub fn principal(&self) -> Option<Principal> {
        self.shared.state.lock().principal.clone()
    }

    /// Message of the last failed attempt, while in the Error state.
    pub fn error(&self) -> Option<String> {
        self.shared.state.lock().error.clone()
    }

    pub fn state(&self) -> AuthState {
        let state = self.shared.state.lock();
        AuthState {
            status: state.status,
            principal: state.principal.clone(),
            error: state.error.clone(),
        }
    }

    /// Reason of the most recent sign-out; cleared by the next sign-in.
    pub fn last_logout_reason(&self) -> Option<LogoutReason> {
        self.shared.state.lock().last_logout_reason
    }

    pub fn expired_due_to_inactivity(&self) -> bool {
        self.last_logout_reason()
            .is_some_and(|r| r.expired_due_to_inactivity())
    }

    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.shared.events.subscribe()
    }

    pub fn session(&self) -> &SessionOrchestrator {
        &self.shared.session
    }

    pub fn caches(&self) -> &Arc<CacheCoordinator> {
        &self.shared.caches
    }
}

impl ControllerShared {
    fn begin_attempt(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(AuthError::Cancelled);
        }
        match state.status {
            AuthStatus::Authenticated => return Err(AuthError::AlreadyAuthenticated),
            AuthStatus::Authenticating => return Err(AuthError::Busy),
            AuthStatus::Anonymous | AuthStatus::Error => {}
        }
        state.status = AuthStatus::Authenticating;
        state.error = None;
        state.attempt += 1;
        Ok(state.attempt)
    }

    fn finish_attempt(&self, attempt: u64, result: Result<Principal>) -> Result<Principal> {
        let event = {
            let mut state = self.state.lock();
            if state.disposed || state.attempt != attempt {
                debug!(attempt, "Discarding superseded authentication result");
                return Err(AuthError::Cancelled);
            }

            match &result {
                Ok(principal) => {
                    self.persist_principal(principal);
                    self.enter_authenticated(&mut state, principal);
                    info!(user = %principal.id, "Signed in");
                    AuthEvent::SignedIn(principal.clone())
                }
                Err(e) => {
                    let message = e.to_string();
                    state.status = AuthStatus::Error;
                    state.error = Some(message.clone());
                    info!(error = %message, "Sign-in failed");
                    AuthEvent::SignInFailed { message }
                }
            }
        };
        self.emit(event);
        result
    }

    /// Attach caches and enable the session, then mark authenticated.
    fn enter_authenticated(&self, state: &mut ControllerState, principal: &Principal) {
        self.caches.switch_user(None, Some(&principal.id));
        self.session.enable(self.timer_config);
        state.status = AuthStatus::Authenticated;
        state.principal = Some(principal.clone());
        state.error = None;
        state.last_logout_reason = None;
    }

    fn sign_out(&self, reason: LogoutReason) -> bool {
        let user = {
            let mut state = self.state.lock();
            state.attempt += 1;
            let principal = state.principal.take();
            state.status = AuthStatus::Anonymous;
            state.error = None;

            let Some(principal) = principal else {
                return false;
            };

            self.session.disable();
            self.caches.switch_user(Some(&principal.id), None);
            if let Err(e) = self.backend.remove(PRINCIPAL_KEY) {
                warn!(error = %e, "Failed to remove persisted principal");
            }
            state.last_logout_reason = Some(reason);
            principal.id
        };

        info!(user = %user, ?reason, "Signed out");
        self.emit(AuthEvent::SignedOut { user, reason });
        true
    }

    fn persist_principal(&self, principal: &Principal) {
        let stored = principal
            .to_json()
            .map_err(AuthError::from)
            .and_then(|json| {
                self.backend
                    .set(PRINCIPAL_KEY, &json)
                    .map_err(AuthError::from)
            });
        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist principal");
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for AuthSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("AuthSessionController")
            .field("status", &state.status)
            .field("user", &state.principal.as_ref().map(|p| p.id.as_str()))
            .field("disposed", &state.disposed)
            .finish()
    }
}
