//! Append-only JSON-lines journal on local disk.
//!
//! Each line is one record. A transaction line carries the full account
//! snapshot it produced, so appending that single line is the commit point
//! for both the account and its history. Account state is rebuilt by
//! replaying the journal on open.
//!
//! The journal is held under an exclusive advisory lock for the life of the
//! store; a second `open` of the same file fails instead of racing the first.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use boothpay_common::{AccountId, LedgerError, Result, Timestamp};
use dashmap::DashMap;
use fs4::fs_std::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{check_version, AccountRecord, LedgerStore};
use crate::account::Account;
use crate::journal::Transaction;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JournalRecord {
    Opened {
        account_id: AccountId,
        created_at: Timestamp,
    },
    Transaction(Transaction),
}

struct JournalWriter {
    path: PathBuf,
    file: File,
    len: u64,
}

impl JournalWriter {
    /// Append one encoded line and fsync it. A failed write is truncated away
    /// so later appends stay parseable.
    fn append(&mut self, line: &[u8]) -> Result<()> {
        let start = self.len;
        match self.file.write_all(line).and_then(|_| self.file.sync_data()) {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                if let Err(truncate_err) = self.file.set_len(start) {
                    error!(
                        path = %self.path.display(),
                        error = %truncate_err,
                        "Failed to roll back partial journal write"
                    );
                }
                Err(err.into())
            }
        }
    }
}

/// Durable store backed by a single journal file.
pub struct FileStore {
    path: PathBuf,
    writer: Arc<Mutex<JournalWriter>>,
    records: Arc<DashMap<AccountId, AccountRecord>>,
}

impl FileStore {
    /// Open (or create) a journal, lock it and replay it.
    ///
    /// A trailing line without its newline is the remains of an interrupted
    /// append and is truncated away. Any other unreadable line is fatal, as
    /// is a journal already locked by another handle or process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            LedgerError::StorageFailure(format!(
                "journal {} is in use by another writer: {e}",
                path.display()
            ))
        })?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let records = DashMap::new();
        let valid_len = replay_journal(&contents, &records)?;

        if valid_len < contents.len() {
            warn!(
                path = %path.display(),
                discarded_bytes = contents.len() - valid_len,
                "Discarding torn journal tail"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            accounts = records.len(),
            "Journal opened"
        );

        Ok(Self {
            writer: Arc::new(Mutex::new(JournalWriter {
                path: path.clone(),
                file,
                len: valid_len as u64,
            })),
            path,
            records: Arc::new(records),
        })
    }

    /// Journal location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of accounts with persisted state.
    pub fn account_count(&self) -> usize {
        self.records.len()
    }

    /// Run `write` on the blocking pool while holding the journal writer, so
    /// fsync latency never stalls the async runtime. `write` also updates the
    /// in-memory records, keeping them in step with the file even if the
    /// awaiting caller goes away.
    async fn write_blocking<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&mut JournalWriter, &DashMap<AccountId, AccountRecord>) -> Result<()>
            + Send
            + 'static,
    {
        let writer = self.writer.clone();
        let records = self.records.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock();
            write(&mut *guard, &*records)
        })
            .await
            .map_err(|e| LedgerError::StorageFailure(format!("journal writer task failed: {e}")))?
    }
}

fn encode(record: &JournalRecord) -> Result<Vec<u8>> {
    let mut line =
        serde_json::to_vec(record).map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

fn replay_journal(contents: &[u8], records: &DashMap<AccountId, AccountRecord>) -> Result<usize> {
    let mut offset = 0;
    let mut line_no = 0;

    while offset < contents.len() {
        let rest = &contents[offset..];
        let Some(end) = rest.iter().position(|b| *b == b'\n') else {
            // Every complete record ends with a newline.
            return Ok(offset);
        };
        let line = &rest[..end];
        line_no += 1;

        if !line.iter().all(u8::is_ascii_whitespace) {
            let record: JournalRecord = serde_json::from_slice(line).map_err(|e| {
                LedgerError::StorageFailure(format!("corrupt journal line {line_no}: {e}"))
            })?;
            apply_record(records, record, line_no)?;
        }

        offset += end + 1;
    }

    Ok(offset)
}

fn apply_record(
    records: &DashMap<AccountId, AccountRecord>,
    record: JournalRecord,
    line_no: usize,
) -> Result<()> {
    match record {
        JournalRecord::Opened {
            account_id,
            created_at,
        } => {
            records.entry(account_id.clone()).or_insert_with(|| {
                let mut account = Account::new(account_id);
                account.created_at = created_at;
                account.updated_at = created_at;
                AccountRecord::new(account)
            });
        }
        JournalRecord::Transaction(tx) => {
            let mut entry = records.entry(tx.account_id.clone()).or_insert_with(|| {
                let mut account = Account::new(tx.account_id.clone());
                account.created_at = tx.created_at;
                AccountRecord::new(account)
            });

            let expected = entry.account.version + 1;
            if tx.sequence != expected {
                return Err(LedgerError::StorageFailure(format!(
                    "journal line {line_no}: account {} expected sequence {expected}, found {}",
                    tx.account_id, tx.sequence
                )));
            }

            let account = tx.account_after(entry.account.created_at);
            if !account.is_consistent() {
                return Err(LedgerError::StorageFailure(format!(
                    "journal line {line_no}: inconsistent snapshot for account {}",
                    tx.account_id
                )));
            }
            entry.push(&account, &tx);
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn load_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.records.get(account_id).map(|r| r.account.clone()))
    }

    async fn open_account(&self, account: &Account) -> Result<()> {
        if self.records.contains_key(&account.account_id) {
            return Ok(());
        }

        let line = encode(&JournalRecord::Opened {
            account_id: account.account_id.clone(),
            created_at: account.created_at,
        })?;
        let account = account.clone();
        self.write_blocking(move |writer, records| {
            if records.contains_key(&account.account_id) {
                return Ok(());
            }
            writer.append(&line)?;
            records.insert(account.account_id.clone(), AccountRecord::new(account));
            Ok(())
        })
        .await
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        let line = encode(&JournalRecord::Transaction(transaction.clone()))?;
        let account = account.clone();
        let transaction = transaction.clone();
        self.write_blocking(move |writer, records| {
            // All writes go through the writer lock, so the version read here
            // cannot move before the append lands.
            let stored = records
                .get(&account.account_id)
                .map(|r| r.account.version)
                .unwrap_or(0);
            check_version(&account, stored)?;

            writer.append(&line)?;
            records
                .entry(account.account_id.clone())
                .or_insert_with(|| AccountRecord::new(account.clone()))
                .push(&account, &transaction);
            Ok(())
        })
        .await
    }

    async fn list_for_account(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        Ok(self
            .records
            .get(account_id)
            .map(|r| r.recent(limit))
            .unwrap_or_default())
    }

    async fn replay(&self, account_id: &AccountId) -> Result<Vec<Transaction>> {
        Ok(self
            .records
            .get(account_id)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceChange;
    use crate::journal::{TransactionDraft, TransactionKind, TransactionLog};
    use boothpay_common::Amount;
    use std::sync::Arc;

    async fn record(
        log: &TransactionLog,
        account: &Account,
        kind: TransactionKind,
        amount: i64,
    ) -> Account {
        let change = BalanceChange::for_operation(kind, Amount::from_minor(amount)).unwrap();
        let next = change.apply_to(account).unwrap();
        log.append(TransactionDraft::new(account.account_id.clone(), change), &next)
            .await
            .unwrap();
        next
    }

    #[tokio::test]
    async fn test_reopen_restores_accounts_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let id = AccountId::new("host_1");

        {
            let store = Arc::new(FileStore::open(&path).unwrap());
            let log = TransactionLog::new(store);
            let account = Account::new(id.clone());
            let account = record(&log, &account, TransactionKind::Deposit, 1000).await;
            let account = record(&log, &account, TransactionKind::Hold, 400).await;
            record(&log, &account, TransactionKind::Capture, 400).await;
        }

        let store = FileStore::open(&path).unwrap();
        let account = store.load_account(&id).await.unwrap().unwrap();
        assert_eq!(account.balance.minor(), 600);
        assert_eq!(account.available.minor(), 600);
        assert_eq!(account.held.minor(), 0);
        assert_eq!(account.version, 3);

        let kinds: Vec<TransactionKind> = store
            .replay(&id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::Deposit, TransactionKind::Hold, TransactionKind::Capture]
        );
    }

    #[tokio::test]
    async fn test_torn_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let id = AccountId::new("owner_1");

        {
            let log = TransactionLog::new(Arc::new(FileStore::open(&path).unwrap()));
            record(&log, &Account::new(id.clone()), TransactionKind::Deposit, 250).await;
        }

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"record":"transaction","id":"0194"#).unwrap();
        drop(file);

        let store = Arc::new(FileStore::open(&path).unwrap());
        let account = store.load_account(&id).await.unwrap().unwrap();
        assert_eq!(account.balance.minor(), 250);

        // The journal is usable again after truncation.
        let log = TransactionLog::new(store);
        record(&log, &account, TransactionKind::Deposit, 50).await;
        drop(log);
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.load_account(&id).await.unwrap().unwrap().balance.minor(), 300);
    }

    #[tokio::test]
    async fn test_corrupt_interior_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(&path, b"not json\n").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(LedgerError::StorageFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_second_open_of_locked_journal_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let first = FileStore::open(&path).unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(LedgerError::StorageFailure(_))
        ));

        drop(first);
        assert!(FileStore::open(&path).is_ok());
    }

    #[tokio::test]
    async fn test_stale_commit_leaves_journal_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let base = Account::new(AccountId::new("host_1"));

        {
            let log = TransactionLog::new(Arc::new(FileStore::open(&path).unwrap()));
            record(&log, &base, TransactionKind::Deposit, 100).await;

            // Same starting snapshot again: sequence 1 is already taken.
            let change =
                BalanceChange::for_operation(TransactionKind::Deposit, Amount::from_minor(50)).unwrap();
            let stale = change.apply_to(&base).unwrap();
            let err = log
                .append(TransactionDraft::new(base.account_id.clone(), change), &stale)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::StorageFailure(_)));
        }

        let store = FileStore::open(&path).unwrap();
        let account = store.load_account(&base.account_id).await.unwrap().unwrap();
        assert_eq!((account.balance.minor(), account.version), (100, 1));
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn test_opened_account_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");
        let id = AccountId::new("contractor_3");

        {
            let store = FileStore::open(&path).unwrap();
            store.open_account(&Account::new(id.clone())).await.unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let account = store.load_account(&id).await.unwrap().unwrap();
        assert!(account.is_pristine());
    }
}
