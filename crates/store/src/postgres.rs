//! PostgreSQL-backed store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, Money, OrderId, PaymentId, ProductId, UserId};
use domain::{Cart, CartLine, Order, OrderLine, OrderStatus, Payment, PaymentStatus, Product};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::store::{CommerceStore, StoreTx};
use crate::{Result, StoreError};

/// PostgreSQL-backed commerce store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        order_number: row.try_get("order_number")?,
        status: status.parse::<OrderStatus>()?,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        lines: Vec::new(),
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: row.try_get::<i32, _>("quantity")? as u32,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("payment_id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        reference: row.try_get("reference")?,
        status: status.parse::<PaymentStatus>()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

async fn load_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<Order>> {
    let row = sqlx::query(
        r#"
        SELECT order_id, user_id, order_number, status, total_cents, created_at
        FROM orders
        WHERE order_id = $1
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut order = row_to_order(&row)?;
    order.lines = load_order_lines(conn, order_id).await?;
    Ok(Some(order))
}

async fn load_order_lines(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderLine>> {
    let rows = sqlx::query(
        r#"
        SELECT product_id, product_name, quantity, total_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY order_item_id
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_order_line).collect()
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn order_with_lines(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut *conn, order_id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT order_id, user_id, order_number, status, total_cents, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = row_to_order(row)?;
            order.lines = load_order_lines(&mut *conn, order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT payment_id, order_id, amount_cents, reference, status, created_at
            FROM payments
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, price_cents, quantity
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Product {
                id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                name: row.try_get("name")?,
                price: Money::from_cents(row.try_get("price_cents")?),
                quantity: row.try_get("quantity")?,
            })
        })
        .transpose()
    }
}

/// A PostgreSQL transaction. Dropping it uncommitted rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        // FOR UPDATE holds a row lock on the cart until commit; a second
        // placement for the same user blocks here and then observes
        // whatever the first transaction committed.
        let row = sqlx::query("SELECT cart_id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cart_id = CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?);

        let rows = sqlx::query(
            r#"
            SELECT ci.product_id, p.name AS product_name, ci.quantity, ci.unit_price_cents
            FROM cart_items ci
            JOIN products p ON p.product_id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.cart_item_id
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let lines = rows
            .iter()
            .map(|row| {
                Ok(CartLine {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            id: cart_id,
            user_id,
            lines,
        }))
    }

    async fn pending_order_exists(&mut self, user_id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE user_id = $1 AND status = 'pending')",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn product_stock(&mut self, product_id: ProductId) -> Result<Option<i64>> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM products WHERE product_id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(quantity)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        // A unique violation aborts the surrounding Postgres transaction,
        // so the insert runs under a savepoint; rolling back to it keeps
        // the transaction usable for a retry with a fresh order number.
        sqlx::query("SAVEPOINT order_insert")
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, order_number, status, total_cents, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT order_insert")
                    .execute(&mut *self.tx)
                    .await?;
                Ok(())
            }
            Err(e) => {
                let number_taken = matches!(
                    &e,
                    sqlx::Error::Database(db) if db.constraint() == Some("orders_order_number_key")
                );
                sqlx::query("ROLLBACK TO SAVEPOINT order_insert")
                    .execute(&mut *self.tx)
                    .await?;
                if number_taken {
                    Err(StoreError::OrderNumberTaken)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn insert_order_lines(&mut self, order_id: OrderId, lines: &[OrderLine]) -> Result<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_item_id, order_id, product_id, product_name, quantity, total_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(&line.product_name)
            .bind(line.quantity as i32)
            .bind(line.total_amount.cents())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn upsert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, order_id, amount_cents, reference, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO UPDATE SET
                amount_cents = EXCLUDED.amount_cents,
                reference = EXCLUDED.reference,
                status = EXCLUDED.status
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.reference)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity - $2
            WHERE product_id = $1 AND quantity >= $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(quantity as i64)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn order_by_id(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        // Lock the order row until commit; concurrent verify callbacks
        // serialize here, and the second reads the first's committed
        // status instead of a stale `pending`.
        sqlx::query("SELECT order_id FROM orders WHERE order_id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        load_order(&mut *self.tx, order_id).await
    }

    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
