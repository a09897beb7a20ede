//! PostgreSQL store.
//!
//! Accounts live in `ledger_accounts`, the log in `ledger_transactions`.
//! `commit` updates the account row guarded by its version and inserts the
//! transaction inside one database transaction, so concurrent writers from
//! other processes cannot both apply against the same snapshot.

use async_trait::async_trait;
use boothpay_common::{AccountId, Amount, LedgerError, RelatedId, Result, TransactionId};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Executor, Row};
use tracing::warn;

use super::LedgerStore;
use crate::account::Account;
use crate::journal::{Transaction, TransactionKind};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_accounts (
    account_id  TEXT PRIMARY KEY,
    balance     BIGINT NOT NULL,
    available   BIGINT NOT NULL CHECK (available >= 0),
    held        BIGINT NOT NULL CHECK (held >= 0),
    version     BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    CHECK (balance = available + held)
);

CREATE TABLE IF NOT EXISTS ledger_transactions (
    id               UUID PRIMARY KEY,
    account_id       TEXT NOT NULL REFERENCES ledger_accounts (account_id),
    sequence         BIGINT NOT NULL,
    kind             TEXT NOT NULL,
    amount           BIGINT NOT NULL,
    requested        BIGINT NOT NULL,
    balance_after    BIGINT NOT NULL,
    available_after  BIGINT NOT NULL,
    held_after       BIGINT NOT NULL,
    related_id       TEXT,
    note             TEXT,
    created_at       TIMESTAMPTZ NOT NULL,
    UNIQUE (account_id, sequence)
);
"#;

fn storage(err: sqlx::Error) -> LedgerError {
    LedgerError::StorageFailure(err.to_string())
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| LedgerError::AmountOverflow)
}

/// Store backed by a PostgreSQL pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(storage)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables if missing.
    pub async fn migrate(&self) -> Result<()> {
        // Plain string execution uses the simple protocol, which accepts
        // several statements at once.
        (&self.pool).execute(SCHEMA).await.map_err(storage)?;
        Ok(())
    }

    fn account_from_row(row: &PgRow) -> Result<Account> {
        let version: i64 = row.try_get("version").map_err(storage)?;
        Ok(Account {
            account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(storage)?),
            balance: Amount::from_minor(row.try_get("balance").map_err(storage)?),
            available: Amount::from_minor(row.try_get("available").map_err(storage)?),
            held: Amount::from_minor(row.try_get("held").map_err(storage)?),
            version: version as u64,
            created_at: row.try_get("created_at").map_err(storage)?,
            updated_at: row.try_get("updated_at").map_err(storage)?,
        })
    }

    fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
        let kind: String = row.try_get("kind").map_err(storage)?;
        let sequence: i64 = row.try_get("sequence").map_err(storage)?;
        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get("id").map_err(storage)?),
            account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(storage)?),
            sequence: sequence as u64,
            kind: kind.parse::<TransactionKind>().map_err(LedgerError::StorageFailure)?,
            amount: Amount::from_minor(row.try_get("amount").map_err(storage)?),
            requested: Amount::from_minor(row.try_get("requested").map_err(storage)?),
            balance_after: Amount::from_minor(row.try_get("balance_after").map_err(storage)?),
            available_after: Amount::from_minor(row.try_get("available_after").map_err(storage)?),
            held_after: Amount::from_minor(row.try_get("held_after").map_err(storage)?),
            related_id: row
                .try_get::<Option<String>, _>("related_id")
                .map_err(storage)?
                .map(RelatedId::new),
            note: row.try_get("note").map_err(storage)?,
            created_at: row.try_get("created_at").map_err(storage)?,
        })
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn load_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM ledger_accounts WHERE account_id = $1")
            .bind(account_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn open_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO ledger_accounts \
             (account_id, balance, available, held, version, created_at, updated_at) \
             VALUES ($1, 0, 0, 0, 0, $2, $2) \
             ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account.account_id.as_str())
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        let mut db_tx = self.pool.begin().await.map_err(storage)?;
        let previous_version = to_i64(account.version.saturating_sub(1))?;

        let updated = sqlx::query(
            "INSERT INTO ledger_accounts \
             (account_id, balance, available, held, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (account_id) DO UPDATE SET \
                balance = EXCLUDED.balance, \
                available = EXCLUDED.available, \
                held = EXCLUDED.held, \
                version = EXCLUDED.version, \
                updated_at = EXCLUDED.updated_at \
             WHERE ledger_accounts.version = $8",
        )
        .bind(account.account_id.as_str())
        .bind(account.balance.minor())
        .bind(account.available.minor())
        .bind(account.held.minor())
        .bind(to_i64(account.version)?)
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(previous_version)
        .execute(&mut *db_tx)
        .await
        .map_err(storage)?;

        if updated.rows_affected() != 1 {
            warn!(
                account = %account.account_id,
                version = account.version,
                "Account row changed underneath commit"
            );
            return Err(LedgerError::StorageFailure(format!(
                "concurrent modification of account {}",
                account.account_id
            )));
        }

        sqlx::query(
            "INSERT INTO ledger_transactions \
             (id, account_id, sequence, kind, amount, requested, balance_after, \
              available_after, held_after, related_id, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*transaction.id.as_uuid())
        .bind(transaction.account_id.as_str())
        .bind(to_i64(transaction.sequence)?)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount.minor())
        .bind(transaction.requested.minor())
        .bind(transaction.balance_after.minor())
        .bind(transaction.available_after.minor())
        .bind(transaction.held_after.minor())
        .bind(transaction.related_id.as_ref().map(|r| r.as_str().to_owned()))
        .bind(transaction.note.clone())
        .bind(transaction.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(storage)?;

        db_tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn list_for_account(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_transactions WHERE account_id = $1 \
             ORDER BY sequence DESC LIMIT $2",
        )
        .bind(account_id.as_str())
        .bind(to_i64(limit as u64)?)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(Self::transaction_from_row).collect()
    }

    async fn replay(&self, account_id: &AccountId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_transactions WHERE account_id = $1 ORDER BY sequence ASC",
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(Self::transaction_from_row).collect()
    }
}
