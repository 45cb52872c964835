//! End-to-end placement saga tests over the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use cache::{CacheService, IdempotencyGuard, InMemoryCacheStore};
use checkout::{CheckoutError, InMemoryPaymentGateway, OrderOrchestrator, PlacedOrder};
use common::{Money, ProductId, UserId};
use domain::{CartLine, OrderStatus, PaymentStatus, Product};
use store::{CommerceStore, InMemoryStore};

const EMAIL: &str = "buyer@example.com";

type TestOrchestrator =
    OrderOrchestrator<InMemoryStore, InMemoryPaymentGateway, InMemoryCacheStore>;

struct Fixture {
    orchestrator: TestOrchestrator,
    store: InMemoryStore,
    gateway: InMemoryPaymentGateway,
    cache: InMemoryCacheStore,
}

fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let cache = InMemoryCacheStore::new();
    let orchestrator = OrderOrchestrator::new(
        store.clone(),
        gateway.clone(),
        CacheService::new(cache.clone()),
        "https://shop.test",
    );
    Fixture {
        orchestrator,
        store,
        gateway,
        cache,
    }
}

async fn seed_widget(store: &InMemoryStore, price: Money, stock: i64) -> ProductId {
    let product_id = ProductId::new();
    store
        .insert_product(Product {
            id: product_id,
            name: "Widget".to_string(),
            price,
            quantity: stock,
        })
        .await;
    product_id
}

async fn seed_cart(store: &InMemoryStore, user_id: UserId, product_id: ProductId, quantity: u32) {
    store
        .set_cart(
            user_id,
            vec![CartLine {
                product_id,
                product_name: "Widget".to_string(),
                quantity,
                unit_price: Money::from_major(10),
            }],
        )
        .await;
}

#[tokio::test]
async fn placement_worked_example() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 2).await;

    let placed = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap()
        .expect("cart was not empty");

    // 2 × 10.00 + 30.00 shipping = 50.00.
    assert_eq!(placed.order.total_amount, Money::from_cents(5000));
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.lines.len(), 1);
    assert_eq!(placed.order.lines[0].total_amount, Money::from_cents(2000));

    // The gateway saw the total in minor units.
    assert_eq!(f.gateway.amount_for(&placed.reference), Some(5000));
    assert!(placed.payment_url.contains(&placed.reference));

    // Stock decremented, cart emptied, order and payment stub persisted.
    assert_eq!(f.store.product_quantity(product_id).await, Some(3));
    assert_eq!(f.store.cart_len(user_id).await, 0);
    assert_eq!(f.store.order_count().await, 1);
    let payment = f
        .store
        .payment_by_reference(&placed.reference)
        .await
        .unwrap()
        .expect("payment stub stored");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Money::from_cents(5000));
}

#[tokio::test]
async fn missing_or_empty_cart_places_nothing() {
    let f = fixture();
    let user_id = UserId::new();

    // No cart at all.
    let placed = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap();
    assert!(placed.is_none());

    // A cart with no lines.
    f.store.set_cart(user_id, Vec::new()).await;
    let placed = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap();
    assert!(placed.is_none());
    assert_eq!(f.store.order_count().await, 0);
}

#[tokio::test]
async fn second_pending_order_is_a_conflict() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 10).await;
    seed_cart(&f.store, user_id, product_id, 1).await;

    f.orchestrator
        .place_order(user_id, EMAIL, Money::zero())
        .await
        .unwrap()
        .expect("first placement");

    // A refilled cart cannot produce a second order while one is pending.
    seed_cart(&f.store, user_id, product_id, 1).await;
    let err = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::zero())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::PendingOrderExists));
    assert_eq!(f.store.order_count().await, 1);
}

#[tokio::test]
async fn insufficient_stock_aborts_with_detail() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 1).await;
    seed_cart(&f.store, user_id, product_id, 2).await;

    let err = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::zero())
        .await
        .unwrap_err();
    match err {
        CheckoutError::InsufficientStock {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(f.store.order_count().await, 0);
    assert_eq!(f.store.product_quantity(product_id).await, Some(1));
    assert_eq!(f.store.cart_len(user_id).await, 1);
}

#[tokio::test]
async fn unknown_product_in_cart_is_not_found() {
    let f = fixture();
    let user_id = UserId::new();
    seed_cart(&f.store, user_id, ProductId::new(), 1).await;

    let err = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::zero())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::NotFound(_)));
}

#[tokio::test]
async fn decrement_failure_rolls_back_everything() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 2).await;
    f.store.set_fail_on_decrement(true);

    let err = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));

    // All-or-nothing: no order, no payment, stock and cart untouched.
    assert_eq!(f.store.order_count().await, 0);
    assert_eq!(f.store.payment_count().await, 0);
    assert_eq!(f.store.product_quantity(product_id).await, Some(5));
    assert_eq!(f.store.cart_len(user_id).await, 1);
}

#[tokio::test]
async fn gateway_failure_rolls_back_everything() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 2).await;
    f.gateway.set_fail_on_initiate(true);

    let err = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));

    assert_eq!(f.store.order_count().await, 0);
    assert_eq!(f.store.product_quantity(product_id).await, Some(5));
    assert_eq!(f.store.cart_len(user_id).await, 1);
}

#[tokio::test]
async fn idempotent_replay_returns_identical_payload() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 2).await;

    let guard = IdempotencyGuard::new(f.cache.clone());
    let orchestrator = &f.orchestrator;

    let first: Result<Option<PlacedOrder>, CheckoutError> = guard
        .run("place-1", Duration::from_secs(60), || async {
            orchestrator
                .place_order(user_id, EMAIL, Money::from_major(30))
                .await
        })
        .await;
    let first = first.unwrap().expect("first placement");

    // The retry must replay the stored payload, not place again.
    let second: Result<Option<PlacedOrder>, CheckoutError> = guard
        .run("place-1", Duration::from_secs(60), || async {
            orchestrator
                .place_order(user_id, EMAIL, Money::from_major(30))
                .await
        })
        .await;
    let second = second.unwrap().expect("replayed payload");

    assert_eq!(second.order.id, first.order.id);
    assert_eq!(second.reference, first.reference);
    assert_eq!(f.store.order_count().await, 1);
    assert_eq!(f.gateway.transaction_count(), 1);
    assert_eq!(f.store.product_quantity(product_id).await, Some(3));
}

#[tokio::test]
async fn concurrent_placements_never_oversell() {
    let f = fixture();
    let alice = UserId::new();
    let bob = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 3).await;
    seed_cart(&f.store, alice, product_id, 2).await;
    seed_cart(&f.store, bob, product_id, 2).await;

    let orchestrator = Arc::new(f.orchestrator);
    let a = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.place_order(alice, EMAIL, Money::zero()).await })
    };
    let b = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.place_order(bob, EMAIL, Money::zero()).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { .. })))
        .count();

    assert_eq!(placed, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(f.store.product_quantity(product_id).await, Some(1));
}

#[tokio::test]
async fn verification_places_the_order_once() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 2).await;

    let placed = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::from_major(30))
        .await
        .unwrap()
        .expect("placement");

    let receipt = f
        .orchestrator
        .verify_payment(&placed.reference)
        .await
        .unwrap();
    assert_eq!(receipt.message, "Order placed successfully");

    let order = f
        .store
        .order_with_lines(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
    let payment = f
        .store
        .payment_by_reference(&placed.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, Money::from_cents(5000));

    // A duplicate callback is a no-op success.
    let receipt = f
        .orchestrator
        .verify_payment(&placed.reference)
        .await
        .unwrap();
    assert_eq!(receipt.message, "Order already placed");
    assert_eq!(f.store.payment_count().await, 1);
}

#[tokio::test]
async fn failed_verification_leaves_order_pending() {
    let f = fixture();
    let user_id = UserId::new();
    let product_id = seed_widget(&f.store, Money::from_major(10), 5).await;
    seed_cart(&f.store, user_id, product_id, 1).await;

    let placed = f
        .orchestrator
        .place_order(user_id, EMAIL, Money::zero())
        .await
        .unwrap()
        .expect("placement");

    f.gateway.set_verify_status(false);
    let err = f
        .orchestrator
        .verify_payment(&placed.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));

    let order = f
        .store
        .order_with_lines(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn verification_with_unknown_reference_fails() {
    let f = fixture();
    let err = f
        .orchestrator
        .verify_payment("ODR-does-not-exist")
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));
}
