use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::core::StorageError;
use crate::models::{Order, OrderStatus, Subscription, SubscriptionStatus};

/// Persistence seam used by the order router.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), StorageError>;
    async fn update_order(&self, order: &Order) -> Result<(), StorageError>;
    async fn get_order(&self, id: &str) -> Result<Option<Order>, StorageError>;
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StorageError>;
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    connector: String,
    symbol: String,
    side: String,
    order_type: String,
    qty: f64,
    price: Option<f64>,
    status: String,
    external_id: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorageError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(StorageError::Corrupt)?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            connector: row.connector,
            symbol: row.symbol,
            side: row.side,
            order_type: row.order_type,
            qty: row.qty,
            price: row.price,
            status,
            external_id: row.external_id,
            reason: row.reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    plan: String,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StorageError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(StorageError::Corrupt)?;
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan: row.plan,
            status,
            current_period_end: row.current_period_end,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: usize,
    pub filled_orders: usize,
    pub open_orders: usize,
    pub rejected_orders: usize,
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = if database_url.contains(":memory:") {
            // Every connection to an in-memory database is a fresh database,
            // so pin the pool to a single connection that never expires.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            let path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite://{}?mode=rwc", path))
                .await?
        };

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::new("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                connector TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                qty REAL NOT NULL,
                price REAL,
                status TEXT NOT NULL,
                external_id TEXT,
                reason TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_orders_user
            ON orders(user_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                plan TEXT NOT NULL,
                status TEXT NOT NULL,
                current_period_end DATETIME,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("order database schema initialized");

        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn count_orders(&self) -> Result<usize, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn get_statistics(&self) -> Result<OrderStatistics, StorageError> {
        #[derive(sqlx::FromRow)]
        struct Stats {
            total: i64,
            filled: Option<i64>,
            open: Option<i64>,
            rejected: Option<i64>,
        }

        let stats = sqlx::query_as::<_, Stats>(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN status = 'filled' THEN 1 ELSE 0 END) as filled,
                SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END) as open,
                SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END) as rejected
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStatistics {
            total_orders: stats.total as usize,
            filled_orders: stats.filled.unwrap_or(0) as usize,
            open_orders: stats.open.unwrap_or(0) as usize,
            rejected_orders: stats.rejected.unwrap_or(0) as usize,
        })
    }

    pub async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, user_id, plan, status, current_period_end, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                plan = excluded.plan,
                status = excluded.status,
                current_period_end = excluded.current_period_end,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.user_id)
        .bind(&subscription.plan)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, StorageError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT * FROM subscriptions WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, connector, symbol, side, order_type, qty, price,
                status, external_id, reason, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(&order.connector)
        .bind(&order.symbol)
        .bind(&order.side)
        .bind(&order.order_type)
        .bind(order.qty)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(&order.external_id)
        .bind(&order.reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, external_id = ?, reason = ?, price = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(order.status.as_str())
        .bind(&order.external_id)
        .bind(&order.reason)
        .bind(order.price)
        .bind(order.updated_at)
        .bind(&order.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM orders WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
