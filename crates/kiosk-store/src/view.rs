//! In-memory view of one per-user collection.

use kiosk_types::UserId;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::scoped::{CollectionKey, UserScopedStore};

/// Holds the active user's copy of a collection.
///
/// Attached to at most one user at a time. Reads and writes go through the
/// view and only ever touch the attached user's data; every accepted write
/// is persisted before the call returns.
#[derive(Debug)]
pub struct ScopedCollection<T> {
    key: CollectionKey,
    store: UserScopedStore,
    active: Mutex<Option<Attached<T>>>,
}

#[derive(Debug)]
struct Attached<T> {
    user: UserId,
    value: T,
}

impl<T> ScopedCollection<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(key: CollectionKey, store: UserScopedStore) -> Self {
        Self {
            key,
            store,
            active: Mutex::new(None),
        }
    }

    pub fn key(&self) -> CollectionKey {
        self.key
    }

    /// Load `user`'s durable state and make it the active view.
    pub fn attach(&self, user: &UserId) {
        let value = self.store.load(user, self.key);
        *self.active.lock() = Some(Attached {
            user: user.clone(),
            value,
        });
        debug!(collection = %self.key, user = %user, "Collection attached");
    }

    /// Drop the in-memory view. Durable state is left untouched.
    pub fn detach(&self) -> Option<UserId> {
        let previous = self.active.lock().take().map(|a| a.user);
        if let Some(user) = &previous {
            debug!(collection = %self.key, user = %user, "Collection detached");
        }
        previous
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.active.lock().as_ref().map(|a| a.user.clone())
    }

    /// Copy of the active user's collection, `None` when detached.
    pub fn snapshot(&self) -> Option<T> {
        self.active.lock().as_ref().map(|a| a.value.clone())
    }

    /// Read the active collection without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.active.lock().as_ref().map(|a| f(&a.value))
    }

    /// Apply `f` to the collection of `expected`, then persist it.
    ///
    /// Rejected without side effects when `expected` is not the attached
    /// user. If `f` fails, the collection is left as it was.
    pub fn mutate<R>(
        &self,
        expected: &UserId,
        f: impl FnOnce(&mut T) -> Result<R>,
    ) -> Result<R> {
        let mut active = self.active.lock();
        let attached = match active.as_mut() {
            Some(attached) if attached.user == *expected => attached,
            Some(attached) => {
                warn!(
                    collection = %self.key,
                    expected = %expected,
                    active = %attached.user,
                    "Rejected write for inactive user"
                );
                return Err(StoreError::NotActiveUser {
                    expected: expected.clone(),
                    active: attached.user.clone(),
                });
            }
            None => {
                warn!(
                    collection = %self.key,
                    expected = %expected,
                    "Rejected write with no active user"
                );
                return Err(StoreError::NoActiveUser {
                    expected: expected.clone(),
                });
            }
        };

        let mut working = attached.value.clone();
        let result = f(&mut working)?;
        attached.value = working;
        self.store.save(&attached.user, self.key, &attached.value);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KeyValueStore, MemoryStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    type Counts = BTreeMap<String, u32>;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, ScopedCollection<Counts>) {
        let backend = Arc::new(MemoryStore::new());
        let store = UserScopedStore::new(backend.clone());
        (backend, ScopedCollection::new(CollectionKey::Cart, store))
    }

    #[test]
    fn test_detached_view_rejects_writes() {
        let (backend, view) = setup();
        let err = view
            .mutate(&uid("u1"), |c| {
                c.insert("x".to_string(), 1);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NoActiveUser { .. }));
        assert!(view.snapshot().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_write_for_other_user_is_rejected() {
        let (backend, view) = setup();
        view.attach(&uid("u1"));

        let err = view.mutate(&uid("u2"), |_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::NotActiveUser { .. }));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_accepted_write_is_persisted() {
        let (backend, view) = setup();
        view.attach(&uid("u1"));
        view.mutate(&uid("u1"), |c| {
            c.insert("x".to_string(), 3);
            Ok(())
        })
        .unwrap();

        assert_eq!(backend.get("cart_u1").unwrap().as_deref(), Some(r#"{"x":3}"#));
    }

    #[test]
    fn test_failed_mutation_leaves_value() {
        let (_backend, view) = setup();
        view.attach(&uid("u1"));

        let result: Result<()> = view.mutate(&uid("u1"), |c| {
            c.insert("x".to_string(), 3);
            Err(StoreError::EmptyCart)
        });
        assert!(result.is_err());
        assert_eq!(view.snapshot(), Some(Counts::new()));
    }

    #[test]
    fn test_detach_keeps_durable_state() {
        let (_backend, view) = setup();
        view.attach(&uid("u1"));
        view.mutate(&uid("u1"), |c| {
            c.insert("x".to_string(), 1);
            Ok(())
        })
        .unwrap();

        assert_eq!(view.detach(), Some(uid("u1")));
        assert!(view.snapshot().is_none());

        view.attach(&uid("u1"));
        assert_eq!(view.read(|c| c.get("x").copied()), Some(Some(1)));
    }
}
