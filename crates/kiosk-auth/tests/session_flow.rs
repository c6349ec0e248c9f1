//! End-to-end flows across auth, caches and the inactivity session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiosk_auth::{
    AuthError, AuthSessionController, AuthStatus, Credentials, LogoutReason, Registration,
    Result, UserDirectory,
};
use kiosk_session::{
    ActivitySignal, ManualScheduler, Scheduler, SessionOrchestrator, SessionStatus, SignalHub, TimerConfig,
    TokioScheduler,
};
use kiosk_store::{CacheCoordinator, KeyValueStore, MemoryStore};
use kiosk_types::{Clock, ManualClock, Principal, SystemClock, UserId};

/// Accepts any password for a fixed set of accounts.
#[derive(Debug)]
struct FixedDirectory {
    accounts: HashMap<String, Principal>,
}

impl FixedDirectory {
    fn new(clock: &dyn Clock, ids: &[&str]) -> Self {
        let accounts = ids
            .iter()
            .map(|id| {
                let email = format!("{id}@example.com");
                let principal = Principal {
                    id: UserId::new(*id).unwrap(),
                    email: email.clone(),
                    name: id.to_uppercase(),
                    avatar: None,
                    created_at: clock.now(),
                };
                (email, principal)
            })
            .collect();
        Self { accounts }
    }
}

#[async_trait]
impl UserDirectory for FixedDirectory {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal> {
        self.accounts
            .get(&credentials.email)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn register(&self, _registration: &Registration) -> Result<Principal> {
        Err(AuthError::EmailAlreadyInUse)
    }

    async fn remove(&self, id: &UserId) -> Result<()> {
        Err(AuthError::UserNotFound(id.to_string()))
    }
}

struct Kiosk {
    clock: Arc<ManualClock>,
    scheduler: Arc<ManualScheduler>,
    hub: Arc<SignalHub>,
    backend: Arc<MemoryStore>,
    auth: AuthSessionController,
}

fn kiosk() -> Kiosk {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let hub = Arc::new(SignalHub::new());
    let backend = Arc::new(MemoryStore::new());

    let directory = Arc::new(FixedDirectory::new(clock.as_ref(), &["u1", "u2"]));
    let caches = Arc::new(CacheCoordinator::new(backend.clone(), clock.clone()));
    let session = SessionOrchestrator::new(clock.clone(), scheduler.clone(), Arc::clone(&hub));
    let auth = AuthSessionController::new(
        directory,
        backend.clone(),
        caches,
        session,
        TimerConfig::new(300_000, 30_000).unwrap(),
    );

    Kiosk {
        clock,
        scheduler,
        hub,
        backend,
        auth,
    }
}

async fn login(k: &Kiosk, id: &str) -> UserId {
    k.auth
        .login(Credentials::new(format!("{id}@example.com"), "pw"))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_cart_follows_the_signed_in_user() {
    let k = kiosk();
    let caches = Arc::clone(k.auth.caches());

    let u1 = login(&k, "u1").await;
    assert_eq!(caches.add_to_cart(&u1, "p1", "M", 1).unwrap(), 1);
    assert_eq!(caches.add_to_cart(&u1, "p1", "M", 1).unwrap(), 2);
    assert!(k.auth.logout());

    let u2 = login(&k, "u2").await;
    assert!(caches.cart().unwrap().is_empty());
    assert!(k.auth.logout());

    login(&k, "u1").await;
    let cart = caches.cart().unwrap();
    assert_eq!(cart.quantity("p1", "M"), 2);
    assert_eq!(cart.item_count(), 2);

    assert_eq!(
        k.backend.get("cart_u1").unwrap().as_deref(),
        Some(r#"{"p1":{"M":2}}"#)
    );
    assert_eq!(k.backend.get(&format!("cart_{u2}")).unwrap(), None);
}

#[tokio::test]
async fn test_stale_write_after_user_switch_is_rejected() {
    let k = kiosk();
    let caches = Arc::clone(k.auth.caches());

    let u1 = login(&k, "u1").await;
    k.auth.logout();
    login(&k, "u2").await;

    assert!(caches.add_to_cart(&u1, "p1", "M", 1).is_err());
    assert!(caches.cart().unwrap().is_empty());
    assert_eq!(k.backend.get("cart_u1").unwrap(), None);
}

#[tokio::test]
async fn test_activity_keeps_session_alive_until_idle() {
    let k = kiosk();
    login(&k, "u1").await;
    let session = k.auth.session().clone();
    let mut events = session.events();

    for _ in 0..10 {
        k.scheduler.advance(200_000);
        k.hub.dispatch_activity(ActivitySignal::Scroll);
    }
    assert!(k.auth.is_authenticated());
    assert!(events.try_recv().is_err());

    k.scheduler.advance(270_000);
    assert_eq!(session.status(), SessionStatus::Warning);
    assert_eq!(session.get_remaining_time(), 30_000);

    k.scheduler.advance(30_000);
    assert_eq!(k.auth.status(), AuthStatus::Anonymous);
    assert_eq!(k.auth.last_logout_reason(), Some(LogoutReason::Inactivity));
    assert_eq!(session.status(), SessionStatus::Disabled);
}

#[tokio::test]
async fn test_expired_session_keeps_durable_cart() {
    let k = kiosk();
    let u1 = login(&k, "u1").await;
    k.auth.caches().add_to_cart(&u1, "p1", "L", 3).unwrap();

    k.clock.advance(1);
    k.scheduler.advance(300_000);
    assert!(k.auth.expired_due_to_inactivity());
    assert!(k.auth.caches().cart().is_none());

    login(&k, "u1").await;
    assert!(!k.auth.expired_due_to_inactivity());
    assert_eq!(k.auth.caches().cart_item_count(), 3);
}

#[tokio::test]
async fn test_activity_then_logout_leaves_no_timer() {
    let k = kiosk();
    login(&k, "u1").await;

    k.hub.dispatch_activity(ActivitySignal::KeyDown);
    k.auth.logout();

    assert!(!k.auth.session().is_timer_active());
    assert_eq!(k.scheduler.pending(), 0);
    assert_eq!(k.hub.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tokio_scheduler_expires_on_real_timers() {
    let hub = Arc::new(SignalHub::new());
    let backend = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session = SessionOrchestrator::new(
        Arc::clone(&clock),
        Arc::new(TokioScheduler::current().unwrap()),
        Arc::clone(&hub),
    );
    let auth = AuthSessionController::new(
        Arc::new(FixedDirectory::new(clock.as_ref(), &["u1"])),
        backend.clone(),
        Arc::new(CacheCoordinator::new(backend, Arc::clone(&clock))),
        session,
        TimerConfig::new(1_000, 200).unwrap(),
    );

    auth.login(Credentials::new("u1@example.com", "pw"))
        .await
        .unwrap();
    assert!(auth.session().is_timer_active());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(auth.status(), AuthStatus::Anonymous);
    assert!(auth.expired_due_to_inactivity());
}
