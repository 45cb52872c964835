//! The order placement saga and payment verification.

use cache::{CacheOptions, CacheService, CacheStore, keys};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use domain::{Order, OrderLine, OrderStatus, Payment, PaymentStatus, order_number};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, StoreError, StoreTx};

use crate::error::CheckoutError;
use crate::gateway::{InitiatePayment, PaymentGateway, PaymentMetadata};

/// Attempts before giving up on generating a unique order number.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// A successfully placed order plus what the client needs to pay for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    /// Gateway URL the customer is redirected to.
    pub payment_url: String,
    /// Gateway reference for the pending payment.
    pub reference: String,
    pub message: String,
}

/// Outcome of a successful payment verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReceipt {
    pub message: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
}

/// Coordinates order placement across the relational store, the payment
/// gateway and the cache.
///
/// Placement runs inside one store transaction so a failure at any step
/// leaves no order, no stock decrement and an intact cart. The
/// surrounding idempotency guard (applied by the HTTP layer) makes client
/// retries safe; this type assumes at most one invocation per token.
pub struct OrderOrchestrator<S, G, C: CacheStore> {
    store: S,
    gateway: G,
    cache: CacheService<C>,
    /// Base URL the gateway redirects back to after payment.
    api_url: String,
}

impl<S, G, C> OrderOrchestrator<S, G, C>
where
    S: CommerceStore,
    G: PaymentGateway,
    C: CacheStore + Clone,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, gateway: G, cache: CacheService<C>, api_url: impl Into<String>) -> Self {
        Self {
            store,
            gateway,
            cache,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Turns the user's cart into a pending order awaiting payment.
    ///
    /// Returns `Ok(None)` when the user has no cart or an empty one; that
    /// is not an error, there is simply nothing to place. Every other
    /// failure aborts the whole transaction.
    #[tracing::instrument(skip(self, email), fields(%user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        email: &str,
        shipping_fee: Money,
    ) -> Result<Option<PlacedOrder>, CheckoutError> {
        metrics::counter!("checkout_orders_attempted_total").increment(1);
        let start = std::time::Instant::now();

        let mut tx = self.store.begin().await?;

        // 1. The cart row lock serializes concurrent placements per user.
        let Some(cart) = tx.cart_for_user(user_id).await? else {
            return Ok(None);
        };
        if cart.lines.is_empty() {
            return Ok(None);
        }

        // 2. One order awaiting payment per user.
        if tx.pending_order_exists(user_id).await? {
            return Err(CheckoutError::PendingOrderExists);
        }

        // 3. Live stock check inside the transaction; the snapshot the
        // cart was built from may be stale.
        for line in &cart.lines {
            let stock = tx.product_stock(line.product_id).await?.ok_or_else(|| {
                CheckoutError::NotFound(format!("Product {} not found", line.product_id))
            })?;
            if stock < i64::from(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_name: line.product_name.clone(),
                    available: stock,
                    requested: line.quantity,
                });
            }
        }

        // 4. Freeze line pricing at the cart snapshot.
        let lines: Vec<OrderLine> = cart.lines.iter().map(OrderLine::freeze).collect();
        if lines.is_empty() {
            return Err(CheckoutError::Unprocessable(
                "Order has no lines".to_string(),
            ));
        }
        let total = Order::total_for(&lines, shipping_fee);

        // 5. Insert the order, regenerating the number on collision.
        let mut order = Order {
            id: OrderId::new(),
            user_id,
            order_number: order_number::generate(),
            status: OrderStatus::Pending,
            total_amount: total,
            created_at: Utc::now(),
            lines: Vec::new(),
        };
        let mut attempts = 0;
        loop {
            match tx.insert_order(&order).await {
                Ok(()) => break,
                Err(StoreError::OrderNumberTaken) if attempts < MAX_ORDER_NUMBER_ATTEMPTS => {
                    attempts += 1;
                    tracing::debug!(attempts, "order number collision, regenerating");
                    order.order_number = order_number::generate();
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.insert_order_lines(order.id, &lines).await?;

        // 6. Initiate the gateway transaction and persist a pending
        // payment stub carrying the reference, so a crash after this
        // point can still be reconciled through verification.
        let initiation = self
            .gateway
            .initiate(InitiatePayment {
                amount: total.to_gateway_amount(),
                email: email.to_string(),
                reference: format!("ODR-{}", Utc::now().timestamp_millis()),
                callback_url: format!("{}/success", self.api_url),
                metadata: PaymentMetadata {
                    user_id,
                    order_id: order.id,
                },
            })
            .await?;
        tx.upsert_payment(&Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: total,
            reference: initiation.reference.clone(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        })
        .await?;

        // 7. Guarded decrement: zero rows means stock moved under us and
        // the whole transaction aborts.
        for line in &lines {
            let rows = tx.decrement_stock(line.product_id, line.quantity).await?;
            if rows == 0 {
                let available = tx.product_stock(line.product_id).await?.unwrap_or(0);
                return Err(CheckoutError::InsufficientStock {
                    product_name: line.product_name.clone(),
                    available,
                    requested: line.quantity,
                });
            }
        }

        // 8. The cart empties only if the commit lands.
        tx.clear_cart(cart.id).await?;
        tx.commit().await?;

        metrics::counter!("checkout_orders_placed_total").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        self.invalidate_after_placement(user_id).await;

        order.lines = lines;
        Ok(Some(PlacedOrder {
            order,
            payment_url: initiation.authorization_url,
            reference: initiation.reference,
            message: initiation.message,
        }))
    }

    /// Confirms a gateway payment and moves the order to `placed`.
    ///
    /// The order is located through the order id the gateway echoes back
    /// in the transaction metadata, never through the caller-supplied
    /// reference alone. Verifying an already placed order is a no-op
    /// success, which makes duplicate gateway callbacks harmless.
    #[tracing::instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        reference: &str,
    ) -> Result<VerificationReceipt, CheckoutError> {
        metrics::counter!("payment_verifications_total").increment(1);

        let verification = self.gateway.verify(reference).await?;
        if !verification.status {
            return Err(CheckoutError::Gateway(
                crate::gateway::GatewayError::Declined(
                    "Payment verification failed".to_string(),
                ),
            ));
        }

        let mut tx = self.store.begin().await?;
        let order = tx
            .order_by_id(verification.order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Order not found".to_string()))?;

        if order.status == OrderStatus::Placed {
            return Ok(VerificationReceipt {
                message: "Order already placed".to_string(),
                timestamp: Utc::now(),
            });
        }

        let next = order.status.transition_to(OrderStatus::Placed)?;
        tx.upsert_payment(&Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: Money::from_cents(verification.amount_minor),
            reference: verification.reference.clone(),
            status: PaymentStatus::Completed,
            created_at: Utc::now(),
        })
        .await?;
        tx.set_order_status(order.id, next).await?;
        tx.commit().await?;

        metrics::counter!("payments_completed_total").increment(1);
        self.invalidate_after_verification(order.user_id, order.id)
            .await;

        Ok(VerificationReceipt {
            message: "Order placed successfully".to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Best-effort cache invalidation after a committed placement. The
    /// database is already correct; stale cache entries expire by TTL if
    /// this fails.
    async fn invalidate_after_placement(&self, user_id: UserId) {
        let user_key = keys::by_user(&user_id.to_string());
        self.cache
            .del(&user_key, prefix_only(keys::PREFIX_ORDERS))
            .await;
        self.cache
            .del(&user_key, prefix_only(keys::PREFIX_CART))
            .await;
        self.cache
            .invalidate_pattern(&format!("{}:*", keys::PREFIX_PRODUCT))
            .await;
        self.cache
            .invalidate_pattern(&format!("{}:*", keys::PREFIX_PRODUCTS))
            .await;
    }

    async fn invalidate_after_verification(&self, user_id: UserId, order_id: OrderId) {
        self.cache
            .del(&order_id.to_string(), prefix_only(keys::PREFIX_ORDER))
            .await;
        self.cache
            .del(
                &keys::by_user(&user_id.to_string()),
                prefix_only(keys::PREFIX_ORDERS),
            )
            .await;
    }
}

fn prefix_only(prefix: &'static str) -> CacheOptions {
    CacheOptions {
        ttl: None,
        prefix: Some(prefix),
    }
}
