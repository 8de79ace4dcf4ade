//! SQLite-backed `ReservationStore`.
//!
//! Layout:
//!   - `reservations` holds one row per reservation, dates as ISO-8601 text.
//!   - `item_versions` holds the per-item write version the compare-and-write
//!     primitive checks against.
//!
//! The checked write performs its version bump through a guarded UPDATE
//! inside a transaction; zero rows affected means another writer got there
//! first and the caller sees `VersionConflict`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use catalog::types::{ItemId, ReservationId};

use super::{ItemSnapshot, ReservationStore, StoreError};
use crate::interval::DateRange;
use crate::model::{NewReservation, Reservation, ReservationStatus};

const DATE_FMT: &str = "%Y-%m-%d";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(e))
    }
}

pub struct SqliteReservationStore {
    pool: SqlitePool,
}

impl SqliteReservationStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a SQLite-backed store and ensure the schema exists.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(path).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reservations (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                renter_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                total_price INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reservations_item_status
                ON reservations (item_id, status);
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS item_versions (
                item_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("bad date column {:?}: {}", s, e)))
}

fn row_to_reservation(row: &SqliteRow) -> Result<Reservation, StoreError> {
    let id_str: String = row.get("id");
    let item_str: String = row.get("item_id");
    let renter_str: String = row.get("renter_id");
    let start_str: String = row.get("start_date");
    let end_str: String = row.get("end_date");
    let status_str: String = row.get("status");
    let created_str: String = row.get("created_at");

    let range = DateRange::new(parse_date(&start_str)?, parse_date(&end_str)?)
        .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("bad created_at column: {}", e)))?
        .with_timezone(&Utc);

    Ok(Reservation {
        id: Uuid::parse_str(&id_str).map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
        item_id: Uuid::parse_str(&item_str)
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
        renter_id: Uuid::parse_str(&renter_str)
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?,
        range,
        total_price: row.get("total_price"),
        created_at,
        status: ReservationStatus::from_str(&status_str).map_err(StoreError::Backend)?,
    })
}

#[async_trait::async_trait]
impl ReservationStore for SqliteReservationStore {
    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        let reservation = Reservation {
            id: Uuid::new_v4(),
            item_id: new.item_id,
            renter_id: new.renter_id,
            range: new.range,
            total_price: new.total_price,
            created_at: Utc::now(),
            status: ReservationStatus::Requested,
        };

        sqlx::query(
            r#"
            INSERT INTO reservations
                (id, item_id, renter_id, start_date, end_date,
                 total_price, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);
        "#,
        )
        .bind(reservation.id.to_string())
        .bind(reservation.item_id.to_string())
        .bind(reservation.renter_id.to_string())
        .bind(reservation.range.start().format(DATE_FMT).to_string())
        .bind(reservation.range.end().format(DATE_FMT).to_string())
        .bind(reservation.total_price)
        .bind(reservation.status.to_string())
        .bind(reservation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query("SELECT * FROM reservations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_reservation).transpose()
    }

    async fn list_for_item(
        &self,
        item_id: ItemId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT * FROM reservations \
                     WHERE item_id = ?1 AND status = ?2 ORDER BY created_at",
                )
                .bind(item_id.to_string())
                .bind(s.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM reservations WHERE item_id = ?1 ORDER BY created_at")
                    .bind(item_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_reservation).collect()
    }

    async fn snapshot_accepted(&self, item_id: ItemId) -> Result<ItemSnapshot, StoreError> {
        let accepted = self
            .list_for_item(item_id, Some(ReservationStatus::Accepted))
            .await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM item_versions WHERE item_id = ?1")
                .bind(item_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(ItemSnapshot {
            version: version.unwrap_or(0) as u64,
            accepted,
        })
    }

    async fn write_status_checked(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        expected_version: u64,
    ) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM reservations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let mut reservation = match row.as_ref().map(row_to_reservation).transpose()? {
            Some(r) => r,
            None => return Err(StoreError::NotFound),
        };

        // Guarded version bump: zero rows affected means a concurrent writer
        // advanced the item since the caller's snapshot.
        let bumped = sqlx::query(
            "UPDATE item_versions SET version = version + 1 \
             WHERE item_id = ?1 AND version = ?2",
        )
        .bind(reservation.item_id.to_string())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if bumped == 0 {
            if expected_version != 0 {
                return Err(StoreError::VersionConflict);
            }
            // First-ever write for this item: create the version row, unless
            // someone else just did.
            let inserted = sqlx::query(
                "INSERT INTO item_versions (item_id, version) VALUES (?1, 1) \
                 ON CONFLICT (item_id) DO NOTHING",
            )
            .bind(reservation.item_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                return Err(StoreError::VersionConflict);
            }
        }

        sqlx::query("UPDATE reservations SET status = ?1 WHERE id = ?2")
            .bind(new_status.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        reservation.status = new_status;
        Ok(reservation)
    }

    async fn write_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM reservations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let mut reservation = match row.as_ref().map(row_to_reservation).transpose()? {
            Some(r) => r,
            None => return Err(StoreError::NotFound),
        };

        sqlx::query(
            "INSERT INTO item_versions (item_id, version) VALUES (?1, 1) \
             ON CONFLICT (item_id) DO UPDATE SET version = item_versions.version + 1",
        )
        .bind(reservation.item_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE reservations SET status = ?1 WHERE id = ?2")
            .bind(new_status.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        reservation.status = new_status;
        Ok(reservation)
    }
}
