//! Per-user persisted collections for the kiosk session engine.
//!
//! - [`KeyValueStore`]: durable string storage ([`MemoryStore`], [`FileStore`])
//! - [`UserScopedStore`]: JSON persistence under `{collection}_{userId}` keys
//! - [`ScopedCollection`]: the active user's in-memory copy of one collection
//! - [`CacheCoordinator`]: swaps the cart and order history when the user changes

pub mod backend;
pub mod cart;
pub mod coordinator;
pub mod error;
pub mod orders;
pub mod scoped;
pub mod view;

pub use backend::{FileStore, KeyValueStore, MemoryStore};
pub use cart::{Cart, CartLine};
pub use coordinator::CacheCoordinator;
pub use error::{Result, StoreError};
pub use orders::{
    DeliveryInfo, ESTIMATED_DELIVERY_DAYS, NewOrder, Order, OrderHistory, OrderItem, OrderStatus,
    PaymentMethod,
};
pub use scoped::{CollectionKey, PRINCIPAL_KEY, USERS_KEY, UserScopedStore};
pub use view::ScopedCollection;
