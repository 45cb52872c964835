//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, Money, OrderId, PaymentId, ProductId, UserId};
use domain::{Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use sqlx::PgPool;
use store::{CommerceStore, PostgresStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> (PostgresStore, PgPool) {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query(
        "TRUNCATE TABLE payments, order_items, orders, cart_items, carts, products, users CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    (PostgresStore::new(pool.clone()), pool)
}

async fn seed_user(pool: &PgPool, email: &str) -> UserId {
    let user_id = UserId::new();
    sqlx::query("INSERT INTO users (user_id, email) VALUES ($1, $2)")
        .bind(user_id.as_uuid())
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    user_id
}

async fn seed_product(pool: &PgPool, name: &str, price: Money, quantity: i64) -> ProductId {
    let product_id = ProductId::new();
    sqlx::query("INSERT INTO products (product_id, name, price_cents, quantity) VALUES ($1, $2, $3, $4)")
        .bind(product_id.as_uuid())
        .bind(name)
        .bind(price.cents())
        .bind(quantity)
        .execute(pool)
        .await
        .unwrap();
    product_id
}

async fn seed_cart(pool: &PgPool, user_id: UserId, items: &[(ProductId, i32, Money)]) -> CartId {
    let cart_id = CartId::new();
    sqlx::query("INSERT INTO carts (cart_id, user_id) VALUES ($1, $2)")
        .bind(cart_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(pool)
        .await
        .unwrap();
    for (product_id, quantity, unit_price) in items {
        sqlx::query(
            "INSERT INTO cart_items (cart_item_id, cart_id, product_id, quantity, unit_price_cents) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(quantity)
        .bind(unit_price.cents())
        .execute(pool)
        .await
        .unwrap();
    }
    cart_id
}

fn order_for(user_id: UserId, number: &str, total: Money) -> Order {
    Order {
        id: OrderId::new(),
        user_id,
        order_number: number.to_string(),
        status: OrderStatus::Pending,
        total_amount: total,
        created_at: Utc::now(),
        lines: Vec::new(),
    }
}

#[tokio::test]
async fn cart_loads_with_product_names() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "cart@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 5).await;
    let gadget = seed_product(&pool, "Gadget", Money::from_cents(2500), 3).await;
    seed_cart(
        &pool,
        user_id,
        &[
            (widget, 2, Money::from_cents(1000)),
            (gadget, 1, Money::from_cents(2500)),
        ],
    )
    .await;

    let mut tx = store.begin().await.unwrap();
    let cart = tx.cart_for_user(user_id).await.unwrap().unwrap();
    assert_eq!(cart.user_id, user_id);
    assert_eq!(cart.lines.len(), 2);

    let widget_line = cart
        .lines
        .iter()
        .find(|l| l.product_id == widget)
        .unwrap();
    assert_eq!(widget_line.product_name, "Widget");
    assert_eq!(widget_line.quantity, 2);
    assert_eq!(widget_line.unit_price, Money::from_cents(1000));
}

#[tokio::test]
async fn cart_absent_for_unknown_user() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "nocart@example.com").await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.cart_for_user(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn order_round_trips_through_commit() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "order@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 5).await;

    let order = order_for(user_id, "482913-207", Money::from_cents(5000));
    let order_id = order.id;
    let lines = vec![OrderLine {
        product_id: widget,
        product_name: "Widget".to_string(),
        quantity: 2,
        total_amount: Money::from_cents(2000),
    }];

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_order_lines(order_id, &lines).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.order_with_lines(order_id).await.unwrap().unwrap();
    assert_eq!(stored.order_number, "482913-207");
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.total_amount, Money::from_cents(5000));
    assert_eq!(stored.lines.len(), 1);
    assert_eq!(stored.lines[0].product_name, "Widget");
    assert_eq!(stored.lines[0].total_amount, Money::from_cents(2000));
}

#[tokio::test]
async fn uncommitted_transaction_leaves_no_trace() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "rollback@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 5).await;

    let order = order_for(user_id, "111111-111", Money::from_cents(1000));
    let order_id = order.id;

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        assert_eq!(tx.decrement_stock(widget, 2).await.unwrap(), 1);
        // Dropped without commit.
    }

    assert!(store.order_with_lines(order_id).await.unwrap().is_none());
    let product = store.product(widget).await.unwrap().unwrap();
    assert_eq!(product.quantity, 5);
}

#[tokio::test]
async fn duplicate_order_number_is_recoverable() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "dup@example.com").await;

    let first = order_for(user_id, "222222-222", Money::from_cents(1000));
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&first).await.unwrap();
    tx.commit().await.unwrap();

    let clash = order_for(user_id, "222222-222", Money::from_cents(2000));
    let retry = order_for(user_id, "333333-333", Money::from_cents(2000));
    let retry_id = retry.id;

    // The savepoint keeps the transaction usable after the conflict.
    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_order(&clash).await.unwrap_err();
    assert!(matches!(err, StoreError::OrderNumberTaken));
    tx.insert_order(&retry).await.unwrap();
    tx.commit().await.unwrap();

    assert!(store.order_with_lines(retry_id).await.unwrap().is_some());
}

#[tokio::test]
async fn decrement_stock_guards_against_depletion() {
    let (store, pool) = get_test_store().await;
    seed_user(&pool, "stock@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 3).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(widget, 2).await.unwrap(), 1);
    // Staged quantity is now 1; a further 2 must not match.
    assert_eq!(tx.decrement_stock(widget, 2).await.unwrap(), 0);
    tx.commit().await.unwrap();

    let product = store.product(widget).await.unwrap().unwrap();
    assert_eq!(product.quantity, 1);
}

#[tokio::test]
async fn pending_order_check_scoped_to_user_and_status() {
    let (store, pool) = get_test_store().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;

    let mut placed = order_for(alice, "444444-444", Money::from_cents(1000));
    placed.status = OrderStatus::Placed;
    let pending = order_for(bob, "555555-555", Money::from_cents(1000));

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&placed).await.unwrap();
    tx.insert_order(&pending).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(!tx.pending_order_exists(alice).await.unwrap());
    assert!(tx.pending_order_exists(bob).await.unwrap());
}

#[tokio::test]
async fn clear_cart_empties_items_only() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "clear@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 5).await;
    let cart_id = seed_cart(&pool, user_id, &[(widget, 2, Money::from_cents(1000))]).await;

    let mut tx = store.begin().await.unwrap();
    tx.clear_cart(cart_id).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let cart = tx.cart_for_user(user_id).await.unwrap().unwrap();
    assert!(cart.lines.is_empty());
}

#[tokio::test]
async fn payment_upsert_replaces_by_order() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "pay@example.com").await;

    let order = order_for(user_id, "666666-666", Money::from_cents(5000));
    let order_id = order.id;

    let first = Payment {
        id: PaymentId::new(),
        order_id,
        amount: Money::from_cents(5000),
        reference: "ODR-1700000000000".to_string(),
        status: PaymentStatus::Pending,
        created_at: Utc::now(),
    };
    let second = Payment {
        id: PaymentId::new(),
        order_id,
        amount: Money::from_cents(5000),
        reference: "ODR-1700000000999".to_string(),
        status: PaymentStatus::Completed,
        created_at: Utc::now(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.upsert_payment(&first).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.upsert_payment(&second).await.unwrap();
    tx.commit().await.unwrap();

    assert!(
        store
            .payment_by_reference("ODR-1700000000000")
            .await
            .unwrap()
            .is_none()
    );
    let stored = store
        .payment_by_reference("ODR-1700000000999")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_id, order_id);
    assert_eq!(stored.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn order_status_update_persists() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "status@example.com").await;

    let order = order_for(user_id, "777777-777", Money::from_cents(1000));
    let order_id = order.id;

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.set_order_status(order_id, OrderStatus::Placed).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.order_with_lines(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Placed);
}

#[tokio::test]
async fn orders_for_user_newest_first() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "list@example.com").await;
    let other = seed_user(&pool, "other@example.com").await;

    let mut older = order_for(user_id, "888888-888", Money::from_cents(1000));
    older.created_at = Utc::now() - chrono::Duration::minutes(5);
    let newer = order_for(user_id, "999999-999", Money::from_cents(2000));
    let theirs = order_for(other, "121212-121", Money::from_cents(3000));

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&older).await.unwrap();
    tx.insert_order(&newer).await.unwrap();
    tx.insert_order(&theirs).await.unwrap();
    tx.commit().await.unwrap();

    let orders = store.orders_for_user(user_id).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_number, "999999-999");
    assert_eq!(orders[1].order_number, "888888-888");
}

/// One placement-shaped transaction: lock the cart, check for a pending
/// order, insert if there is none. Returns true if the order landed.
async fn try_place(
    store: PostgresStore,
    user_id: UserId,
    product_id: ProductId,
    number: &'static str,
) -> bool {
    let mut tx = store.begin().await.unwrap();
    let cart = tx.cart_for_user(user_id).await.unwrap().unwrap();
    if tx.pending_order_exists(user_id).await.unwrap() {
        return false;
    }
    let order = order_for(user_id, number, Money::from_cents(2000));
    tx.insert_order(&order).await.unwrap();
    assert_eq!(tx.decrement_stock(product_id, 2).await.unwrap(), 1);
    tx.clear_cart(cart.id).await.unwrap();
    tx.commit().await.unwrap();
    true
}

#[tokio::test]
async fn concurrent_same_user_placements_yield_one_pending_order() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "race@example.com").await;
    let widget = seed_product(&pool, "Widget", Money::from_cents(1000), 10).await;
    seed_cart(&pool, user_id, &[(widget, 2, Money::from_cents(1000))]).await;

    // The cart row lock serializes the two transactions: the loser blocks
    // in cart_for_user until the winner commits, then observes the
    // winner's pending order and backs off.
    let first = tokio::spawn(try_place(store.clone(), user_id, widget, "100000-001"));
    let second = tokio::spawn(try_place(store.clone(), user_id, widget, "100000-002"));
    let placed = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(placed.iter().filter(|landed| **landed).count(), 1);

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND status = 'pending'",
    )
    .bind(user_id.as_uuid())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(pending, 1);

    // Stock was decremented exactly once.
    let quantity: i64 = sqlx::query_scalar("SELECT quantity FROM products WHERE product_id = $1")
        .bind(widget.as_uuid())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(quantity, 8);
}

#[tokio::test]
async fn concurrent_status_transitions_serialize_on_order_row() {
    let (store, pool) = get_test_store().await;
    let user_id = seed_user(&pool, "verify-race@example.com").await;

    let order = order_for(user_id, "555000-321", Money::from_cents(1000));
    let order_id = order.id;
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    // A verify-shaped transaction: read the order, promote it only if it
    // is still pending. order_by_id locks the row, so the second reader
    // waits out the first and sees the committed `placed`.
    async fn promote(store: PostgresStore, order_id: OrderId) -> bool {
        let mut tx = store.begin().await.unwrap();
        let order = tx.order_by_id(order_id).await.unwrap().unwrap();
        if order.status != OrderStatus::Pending {
            return false;
        }
        tx.set_order_status(order_id, OrderStatus::Placed)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        true
    }

    let first = tokio::spawn(promote(store.clone(), order_id));
    let second = tokio::spawn(promote(store.clone(), order_id));
    let promoted = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(promoted.iter().filter(|saw_pending| **saw_pending).count(), 1);

    let stored = store.order_with_lines(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Placed);
}
