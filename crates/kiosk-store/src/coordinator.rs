//! Swapping per-user collections as the signed-in user changes.

use std::sync::Arc;

use kiosk_types::{Clock, UserId};
use tracing::{debug, info};

use crate::backend::KeyValueStore;
use crate::cart::Cart;
use crate::error::{Result, StoreError};
use crate::orders::{
    DeliveryInfo, NewOrder, Order, OrderHistory, OrderItem, OrderStatus, PaymentMethod,
};
use crate::scoped::{CollectionKey, UserScopedStore};
use crate::view::ScopedCollection;

/// Owns the cart and order-history views and keeps them on the active user.
///
/// Every mutation names the user it is meant for; a write for anyone but the
/// active user is rejected, so a late write from a previous session can
/// never land in the next user's data.
#[derive(Debug)]
pub struct CacheCoordinator {
    clock: Arc<dyn Clock>,
    store: UserScopedStore,
    cart: ScopedCollection<Cart>,
    orders: ScopedCollection<OrderHistory>,
}

impl CacheCoordinator {
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let store = UserScopedStore::new(backend);
        Self {
            clock,
            cart: ScopedCollection::new(CollectionKey::Cart, store.clone()),
            orders: ScopedCollection::new(CollectionKey::Orders, store.clone()),
            store,
        }
    }

    /// Move the collections from `previous` to `next`.
    ///
    /// The previous user's views are dropped (durable state stays) before
    /// the next user's are loaded. `next = None` is a logout.
    pub fn switch_user(&self, previous: Option<&UserId>, next: Option<&UserId>) {
        if previous != next || next.is_none() {
            self.cart.detach();
            self.orders.detach();
        }

        if let Some(user) = next {
            self.cart.attach(user);
            self.orders.attach(user);
        }

        info!(
            from = previous.map(UserId::as_str),
            to = next.map(UserId::as_str),
            "Switched active user"
        );
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.cart.active_user()
    }

    /// The active user's cart, `None` when signed out.
    pub fn cart(&self) -> Option<Cart> {
        self.cart.snapshot()
    }

    /// The active user's orders, `None` when signed out.
    pub fn orders(&self) -> Option<OrderHistory> {
        self.orders.snapshot()
    }

    /// Units in the active cart; zero when signed out.
    pub fn cart_item_count(&self) -> u32 {
        self.cart.read(Cart::item_count).unwrap_or(0)
    }

    pub fn add_to_cart(
        &self,
        user: &UserId,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<u32> {
        self.cart.mutate(user, |cart| Ok(cart.add(item_id, size, quantity)))
    }

    /// Set a line's quantity; zero removes it.
    pub fn update_cart_quantity(
        &self,
        user: &UserId,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<()> {
        self.cart.mutate(user, |cart| {
            cart.set_quantity(item_id, size, quantity);
            Ok(())
        })
    }

    pub fn remove_from_cart(&self, user: &UserId, item_id: &str, size: &str) -> Result<bool> {
        self.cart.mutate(user, |cart| Ok(cart.remove(item_id, size)))
    }

    pub fn clear_cart(&self, user: &UserId) -> Result<()> {
        self.cart.mutate(user, |cart| {
            cart.clear();
            Ok(())
        })
    }

    /// Record a new order for `user`.
    pub fn place_order(&self, user: &UserId, order: NewOrder) -> Result<Order> {
        let placed = Order::place(user.clone(), order, self.clock.now());
        self.orders.mutate(user, |history| {
            history.record(placed.clone());
            Ok(())
        })?;
        info!(order_id = %placed.id, user = %user, total = placed.total_amount, "Order placed");
        Ok(placed)
    }

    /// Turn the active cart into an order and empty the cart.
    ///
    /// `price_of` returns the unit price in cents of an item id.
    pub fn checkout<P>(
        &self,
        user: &UserId,
        delivery_info: DeliveryInfo,
        payment_method: PaymentMethod,
        price_of: P,
    ) -> Result<Order>
    where
        P: Fn(&str) -> Option<u64>,
    {
        self.cart.mutate(user, |cart| {
            if cart.is_empty() {
                return Err(StoreError::EmptyCart);
            }

            let items = cart
                .lines()
                .map(|line| {
                    let unit_price = price_of(line.item_id)
                        .ok_or_else(|| StoreError::UnknownItem(line.item_id.to_string()))?;
                    Ok(OrderItem {
                        item_id: line.item_id.to_string(),
                        size: line.size.to_string(),
                        quantity: line.quantity,
                        unit_price,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let order = self.place_order(
                user,
                NewOrder {
                    items,
                    delivery_info,
                    payment_method,
                },
            )?;
            cart.clear();
            Ok(order)
        })
    }

    pub fn update_order_status(
        &self,
        user: &UserId,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<()> {
        self.orders.mutate(user, |history| {
            if history.set_status(order_id, status) {
                Ok(())
            } else {
                Err(StoreError::OrderNotFound(order_id.to_string()))
            }
        })?;
        debug!(order_id, %status, "Order status updated");
        Ok(())
    }

    /// Delete every durable collection of `user`, detaching first if they
    /// are the active user. Used by account deletion only.
    pub fn delete_user_data(&self, user: &UserId) {
        if self.active_user().as_ref() == Some(user) {
            self.cart.detach();
            self.orders.detach();
        }
        for key in CollectionKey::ALL {
            self.store.clear_durable(user, key);
        }
        info!(user = %user, "Deleted stored user data");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use kiosk_types::ManualClock;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, CacheCoordinator) {
        let backend = Arc::new(MemoryStore::new());
        let coordinator = CacheCoordinator::new(backend.clone(), Arc::new(ManualClock::default()));
        (backend, coordinator)
    }

    fn delivery() -> DeliveryInfo {
        DeliveryInfo {
            name: "Ada".to_string(),
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            phone: Some("555-0100".to_string()),
        }
    }

    #[test]
    fn test_switch_isolates_users() {
        let (_backend, c) = setup();
        let (u1, u2) = (uid("u1"), uid("u2"));

        c.switch_user(None, Some(&u1));
        c.add_to_cart(&u1, "shirt", "M", 2).unwrap();

        c.switch_user(Some(&u1), Some(&u2));
        assert_eq!(c.cart(), Some(Cart::new()));
        assert_eq!(c.cart_item_count(), 0);

        c.switch_user(Some(&u2), Some(&u1));
        assert_eq!(c.cart().unwrap().quantity("shirt", "M"), 2);
    }

    #[test]
    fn test_logout_detaches_and_login_rehydrates() {
        let (backend, c) = setup();
        let u1 = uid("u1");

        c.switch_user(None, Some(&u1));
        c.add_to_cart(&u1, "shirt", "M", 1).unwrap();
        c.switch_user(Some(&u1), None);

        assert!(c.cart().is_none());
        assert!(c.active_user().is_none());
        assert!(backend.get("cart_u1").unwrap().is_some());

        c.switch_user(None, Some(&u1));
        assert_eq!(c.cart_item_count(), 1);
    }

    #[test]
    fn test_write_for_previous_user_is_rejected() {
        let (backend, c) = setup();
        let (u1, u2) = (uid("u1"), uid("u2"));

        c.switch_user(None, Some(&u2));
        let err = c.add_to_cart(&u1, "shirt", "M", 1).unwrap_err();
        assert!(matches!(err, StoreError::NotActiveUser { .. }));
        assert_eq!(backend.get("cart_u1").unwrap(), None);
        assert_eq!(c.cart_item_count(), 0);
    }

    #[test]
    fn test_writes_while_signed_out_are_rejected() {
        let (backend, c) = setup();
        let err = c.clear_cart(&uid("u1")).unwrap_err();
        assert!(matches!(err, StoreError::NoActiveUser { .. }));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_cart_operations_persist() {
        let (backend, c) = setup();
        let u1 = uid("u1");
        c.switch_user(None, Some(&u1));

        c.add_to_cart(&u1, "shirt", "M", 1).unwrap();
        c.add_to_cart(&u1, "shirt", "M", 1).unwrap();
        c.update_cart_quantity(&u1, "hat", "OS", 3).unwrap();
        assert!(c.remove_from_cart(&u1, "hat", "OS").unwrap());

        assert_eq!(
            backend.get("cart_u1").unwrap().as_deref(),
            Some(r#"{"shirt":{"M":2}}"#)
        );
    }

    #[test]
    fn test_checkout_builds_order_and_clears_cart() {
        let (_backend, c) = setup();
        let u1 = uid("u1");
        c.switch_user(None, Some(&u1));
        c.add_to_cart(&u1, "shirt", "M", 2).unwrap();
        c.add_to_cart(&u1, "hat", "OS", 1).unwrap();

        let order = c
            .checkout(&u1, delivery(), PaymentMethod::CashOnDelivery, |id| match id {
                "shirt" => Some(1_999),
                "hat" => Some(1_500),
                _ => None,
            })
            .unwrap();

        assert_eq!(order.total_amount, 5_498);
        assert_eq!(order.items.len(), 2);
        assert!(c.cart().unwrap().is_empty());
        assert_eq!(c.orders().unwrap().get(&order.id), Some(&order));
    }

    #[test]
    fn test_checkout_rejections() {
        let (_backend, c) = setup();
        let u1 = uid("u1");

        let err = c
            .checkout(&u1, delivery(), PaymentMethod::CashOnDelivery, |_| Some(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::NoActiveUser { .. }));

        c.switch_user(None, Some(&u1));
        let err = c
            .checkout(&u1, delivery(), PaymentMethod::CashOnDelivery, |_| Some(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyCart));

        c.add_to_cart(&u1, "mystery", "M", 1).unwrap();
        let err = c
            .checkout(&u1, delivery(), PaymentMethod::CashOnDelivery, |_| None)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownItem(_)));
        assert_eq!(c.cart_item_count(), 1);
        assert!(c.orders().unwrap().is_empty());
    }

    #[test]
    fn test_update_order_status() {
        let (_backend, c) = setup();
        let u1 = uid("u1");
        c.switch_user(None, Some(&u1));
        let order = c
            .place_order(
                &u1,
                NewOrder {
                    items: vec![],
                    delivery_info: delivery(),
                    payment_method: PaymentMethod::Card {
                        last4: "4242".to_string(),
                    },
                },
            )
            .unwrap();

        c.update_order_status(&u1, &order.id, OrderStatus::Delivered)
            .unwrap();
        assert_eq!(
            c.orders().unwrap().get(&order.id).unwrap().status,
            OrderStatus::Delivered
        );
        assert!(matches!(
            c.update_order_status(&u1, "nope", OrderStatus::Shipped),
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_delete_user_data() {
        let (backend, c) = setup();
        let u1 = uid("u1");
        c.switch_user(None, Some(&u1));
        c.add_to_cart(&u1, "shirt", "M", 1).unwrap();
        c.place_order(
            &u1,
            NewOrder {
                items: vec![],
                delivery_info: delivery(),
                payment_method: PaymentMethod::CashOnDelivery,
            },
        )
        .unwrap();

        c.delete_user_data(&u1);
        assert!(c.active_user().is_none());
        assert!(backend.is_empty());
    }
}
