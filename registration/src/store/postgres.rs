//! `PostgreSQL` repository.
//!
//! One row per cohort in `cohort_ledgers` carries the capacity, the enrolled
//! count and the optimistic version. Registrations and waitlist entries are
//! upserted in the same transaction as the version bump, so a save either
//! lands completely or not at all.

use super::{DueExpiries, RegistrationRepository, RepoResult, RepositoryError};
use crate::aggregates::{CohortState, SeatLedger, Waitlist};
use crate::types::{
    CohortId, Money, PaymentId, PromoUsage, Registration, RegistrationId, RegistrationStatus, UserId, WaitlistEntry,
    WaitlistEntryId, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

const REGISTRATION_COLUMNS: &str = "id, user_id, cohort_id, status, registered_at, confirmed_at, expires_at, \
     closed_at, promo_code, price_minor, payment_id, cancellation_reason";

const ENTRY_COLUMNS: &str = "id, user_id, cohort_id, registration_id, position, status, joined_at, notified_at, expires_at";

type RegistrationRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<String>,
    i64,
    Option<String>,
    Option<String>,
);

type EntryRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    i32,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

/// Repository backed by a `PostgreSQL` pool
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Wrap an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Backend`] if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32, connect_timeout: Duration) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| RepositoryError::Backend(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema in `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write(&self, state: &CohortState) -> RepoResult<u64> {
        let cohort_id = state.cohort_id;
        let next = state.version + 1;
        let capacity = to_i32(state.ledger.capacity(), "capacity")?;
        let enrolled = to_i32(state.ledger.enrolled(), "enrolled")?;
        let held = to_i32(state.ledger.held(), "held")?;

        let mut tx = self.pool.begin().await?;

        let written = if state.version == 0 {
            sqlx::query(
                "INSERT INTO cohort_ledgers (cohort_id, capacity, enrolled, held, version)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (cohort_id) DO NOTHING",
            )
            .bind(cohort_id.as_uuid())
            .bind(capacity)
            .bind(enrolled)
            .bind(held)
            .bind(to_i64(next, "version")?)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE cohort_ledgers
                 SET capacity = $2, enrolled = $3, held = $4, version = $5, updated_at = now()
                 WHERE cohort_id = $1 AND version = $6",
            )
            .bind(cohort_id.as_uuid())
            .bind(capacity)
            .bind(enrolled)
            .bind(held)
            .bind(to_i64(next, "version")?)
            .bind(to_i64(state.version, "version")?)
            .execute(&mut *tx)
            .await?
        };
        if written.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(cohort_id));
        }

        for r in state.registrations.values() {
            sqlx::query(
                "INSERT INTO registrations (id, user_id, cohort_id, status, registered_at, confirmed_at,
                     expires_at, closed_at, promo_code, price_minor, payment_id, cancellation_reason)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT (id) DO UPDATE SET
                     status = EXCLUDED.status,
                     confirmed_at = EXCLUDED.confirmed_at,
                     expires_at = EXCLUDED.expires_at,
                     closed_at = EXCLUDED.closed_at,
                     payment_id = EXCLUDED.payment_id,
                     cancellation_reason = EXCLUDED.cancellation_reason",
            )
            .bind(r.id.as_uuid())
            .bind(r.user_id.as_uuid())
            .bind(r.cohort_id.as_uuid())
            .bind(r.status.as_str())
            .bind(r.registered_at)
            .bind(r.confirmed_at)
            .bind(r.expires_at)
            .bind(r.closed_at)
            .bind(r.promo_code.as_deref())
            .bind(to_i64(r.price.minor(), "price")?)
            .bind(r.payment_id.as_ref().map(PaymentId::as_str))
            .bind(r.cancellation_reason.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_is_conflict(e, cohort_id))?;
        }

        for e in state.waitlist.entries() {
            sqlx::query(
                "INSERT INTO waitlist_entries (id, user_id, cohort_id, registration_id, position, status,
                     joined_at, notified_at, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (id) DO UPDATE SET
                     position = EXCLUDED.position,
                     status = EXCLUDED.status,
                     notified_at = EXCLUDED.notified_at,
                     expires_at = EXCLUDED.expires_at",
            )
            .bind(e.id.as_uuid())
            .bind(e.user_id.as_uuid())
            .bind(e.cohort_id.as_uuid())
            .bind(e.registration_id.as_uuid())
            .bind(to_i32(e.position, "position")?)
            .bind(e.status.as_str())
            .bind(e.joined_at)
            .bind(e.notified_at)
            .bind(e.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| unique_is_conflict(err, cohort_id))?;
        }

        tx.commit().await?;
        Ok(next)
    }

    async fn read(&self, cohort_id: CohortId) -> RepoResult<Option<CohortState>> {
        let ledger: Option<(i32, i32, i64)> =
            sqlx::query_as("SELECT capacity, enrolled, version FROM cohort_ledgers WHERE cohort_id = $1")
                .bind(cohort_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let Some((capacity, enrolled, version)) = ledger else {
            return Ok(None);
        };

        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE cohort_id = $1");
        let rows: Vec<RegistrationRow> = sqlx::query_as(&sql)
            .bind(cohort_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let registrations = rows
            .into_iter()
            .map(|row| registration_from_row(row).map(|r| (r.id, r)))
            .collect::<RepoResult<BTreeMap<_, _>>>()?;

        let sql = format!("SELECT {ENTRY_COLUMNS} FROM waitlist_entries WHERE cohort_id = $1");
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(cohort_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let entries = rows
            .into_iter()
            .map(entry_from_row)
            .collect::<RepoResult<Vec<_>>>()?;

        let with_status = |status: RegistrationStatus| {
            registrations
                .values()
                .filter(move |r: &&Registration| r.status == status)
                .map(|r| r.id)
        };
        let ledger = SeatLedger::restore(
            from_i32(capacity, "capacity")?,
            from_i32(enrolled, "enrolled")?,
            with_status(RegistrationStatus::PendingPayment),
            with_status(RegistrationStatus::Confirmed),
        );

        Ok(Some(CohortState {
            cohort_id,
            ledger,
            registrations,
            waitlist: Waitlist::restore(entries),
            version: u64::try_from(version).map_err(|_| RepositoryError::Corrupt(format!("negative version {version}")))?,
            last_error: None,
            events: Vec::new(),
        }))
    }
}

fn to_i32(value: u32, what: &str) -> RepoResult<i32> {
    i32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{what} {value} out of range")))
}

fn to_i64(value: u64, what: &str) -> RepoResult<i64> {
    i64::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{what} {value} out of range")))
}

fn from_i32(value: i32, what: &str) -> RepoResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("negative {what} {value}")))
}

fn unique_is_conflict(err: sqlx::Error, cohort_id: CohortId) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(cohort_id),
        _ => RepositoryError::from(err),
    }
}

fn registration_from_row(row: RegistrationRow) -> RepoResult<Registration> {
    let (
        id,
        user_id,
        cohort_id,
        status,
        registered_at,
        confirmed_at,
        expires_at,
        closed_at,
        promo_code,
        price_minor,
        payment_id,
        cancellation_reason,
    ) = row;
    Ok(Registration {
        id: RegistrationId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        cohort_id: CohortId::from_uuid(cohort_id),
        status: status.parse::<RegistrationStatus>().map_err(RepositoryError::Corrupt)?,
        registered_at,
        confirmed_at,
        expires_at,
        closed_at,
        promo_code,
        price: Money::from_minor(
            u64::try_from(price_minor)
                .map_err(|_| RepositoryError::Corrupt(format!("negative price {price_minor}")))?,
        ),
        payment_id: payment_id.map(PaymentId::new),
        cancellation_reason,
    })
}

fn entry_from_row(row: EntryRow) -> RepoResult<WaitlistEntry> {
    let (id, user_id, cohort_id, registration_id, position, status, joined_at, notified_at, expires_at) = row;
    let status: WaitlistStatus = status.parse().map_err(RepositoryError::Corrupt)?;
    Ok(WaitlistEntry {
        id: WaitlistEntryId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        cohort_id: CohortId::from_uuid(cohort_id),
        registration_id: RegistrationId::from_uuid(registration_id),
        position: from_i32(position, "position")?,
        status,
        joined_at,
        notified_at,
        expires_at,
    })
}

impl RegistrationRepository for PostgresRepository {
    fn load(&self, cohort_id: CohortId) -> BoxFuture<'_, RepoResult<Option<CohortState>>> {
        Box::pin(self.read(cohort_id))
    }

    fn save<'a>(&'a self, state: &'a CohortState) -> BoxFuture<'a, RepoResult<u64>> {
        Box::pin(self.write(state))
    }

    fn locate_registration(&self, id: RegistrationId) -> BoxFuture<'_, RepoResult<Option<CohortId>>> {
        Box::pin(async move {
            let row: Option<(Uuid,)> = sqlx::query_as("SELECT cohort_id FROM registrations WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(cohort,)| CohortId::from_uuid(cohort)))
        })
    }

    fn locate_entry(&self, id: WaitlistEntryId) -> BoxFuture<'_, RepoResult<Option<CohortId>>> {
        Box::pin(async move {
            let row: Option<(Uuid,)> = sqlx::query_as("SELECT cohort_id FROM waitlist_entries WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(cohort,)| CohortId::from_uuid(cohort)))
        })
    }

    fn locate_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, RepoResult<Option<(CohortId, RegistrationId)>>> {
        Box::pin(async move {
            let row: Option<(Uuid, Uuid)> =
                sqlx::query_as("SELECT cohort_id, id FROM registrations WHERE payment_id = $1")
                    .bind(payment_id.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(cohort, id)| (CohortId::from_uuid(cohort), RegistrationId::from_uuid(id))))
        })
    }

    fn promo_usage<'a>(&'a self, code: &'a str, user: UserId) -> BoxFuture<'a, RepoResult<PromoUsage>> {
        Box::pin(async move {
            let (total, by_user): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE user_id = $2)
                 FROM registrations
                 WHERE promo_code = $1 AND status IN ('PENDING_PAYMENT', 'CONFIRMED', 'WAITLISTED')",
            )
            .bind(code)
            .bind(user.as_uuid())
            .fetch_one(&self.pool)
            .await?;

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // COUNT(*) is never negative
            let usage = PromoUsage {
                total: total as u32,
                by_user: by_user as u32,
            };
            Ok(usage)
        })
    }

    fn due_expiries(&self, now: DateTime<Utc>) -> BoxFuture<'_, RepoResult<DueExpiries>> {
        Box::pin(async move {
            let holds: Vec<(Uuid, Uuid)> = sqlx::query_as(
                "SELECT cohort_id, id FROM registrations
                 WHERE status = 'PENDING_PAYMENT' AND expires_at < $1
                 ORDER BY expires_at",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

            let offers: Vec<(Uuid, Uuid)> = sqlx::query_as(
                "SELECT cohort_id, id FROM waitlist_entries
                 WHERE status = 'NOTIFIED' AND expires_at < $1
                 ORDER BY expires_at",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

            Ok(DueExpiries {
                holds: holds
                    .into_iter()
                    .map(|(c, r)| (CohortId::from_uuid(c), RegistrationId::from_uuid(r)))
                    .collect(),
                offers: offers
                    .into_iter()
                    .map(|(c, e)| (CohortId::from_uuid(c), WaitlistEntryId::from_uuid(e)))
                    .collect(),
            })
        })
    }

    fn registrations_for_user(&self, user: UserId) -> BoxFuture<'_, RepoResult<Vec<Registration>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = $1 ORDER BY registered_at DESC"
            );
            let rows: Vec<RegistrationRow> = sqlx::query_as(&sql)
                .bind(user.as_uuid())
                .fetch_all(&self.pool)
                .await?;
            rows.into_iter().map(registration_from_row).collect()
        })
    }

    fn ping(&self) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_testing::test_epoch;

    fn row(status: &str, price: i64) -> RegistrationRow {
        (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            status.to_string(),
            test_epoch(),
            None,
            Some(test_epoch()),
            None,
            Some("SAVE20".to_string()),
            price,
            Some("pay_1".to_string()),
            None,
        )
    }

    #[test]
    fn registration_rows_map_back() {
        let r = registration_from_row(row("PENDING_PAYMENT", 80_000)).unwrap();
        assert_eq!(r.status, RegistrationStatus::PendingPayment);
        assert_eq!(r.price, Money::from_minor(80_000));
        assert_eq!(r.payment_id, Some(PaymentId::new("pay_1")));
    }

    #[test]
    fn bad_rows_are_corrupt() {
        assert!(matches!(
            registration_from_row(row("ON_HOLD", 1)),
            Err(RepositoryError::Corrupt(_))
        ));
        assert!(matches!(
            registration_from_row(row("CONFIRMED", -5)),
            Err(RepositoryError::Corrupt(_))
        ));
    }

    #[test]
    fn entry_rows_map_back() {
        let entry = entry_from_row((
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            3,
            "NOTIFIED".to_string(),
            test_epoch(),
            Some(test_epoch()),
            Some(test_epoch()),
        ))
        .unwrap();
        assert_eq!(entry.position, 3);
        assert_eq!(entry.status, WaitlistStatus::Notified);
        assert!(matches!(
            entry_from_row((
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                -1,
                "WAITING".to_string(),
                test_epoch(),
                None,
                None,
            )),
            Err(RepositoryError::Corrupt(_))
        ));
    }

    #[test]
    fn out_of_range_counts_are_rejected() {
        assert!(to_i32(u32::MAX, "capacity").is_err());
        assert_eq!(to_i32(25, "capacity").unwrap(), 25);
    }
}
