use std::sync::Arc;

use boothpay_common::{AccountId, Amount, LedgerError};
use boothpay_ledger::{FileStore, LedgerConfig, LedgerEngine, MemoryStore, TransactionKind};
use proptest::prelude::*;

fn memory_engine() -> Arc<LedgerEngine> {
    Arc::new(LedgerEngine::new(
        Arc::new(MemoryStore::new()),
        LedgerConfig::default(),
    ))
}

async fn run_op(
    engine: &LedgerEngine,
    account: &AccountId,
    kind: TransactionKind,
    amount: i64,
) -> Result<(), LedgerError> {
    let amount = Amount::from_minor(amount);
    match kind {
        TransactionKind::Deposit => engine.deposit(account, amount, None).await,
        TransactionKind::Withdrawal => engine.withdraw(account, amount, None).await,
        TransactionKind::Hold => engine.hold(account, amount, None, None).await,
        TransactionKind::Release => engine.release(account, amount, None, None).await,
        TransactionKind::Capture => engine.capture(account, amount, None, None).await,
        TransactionKind::Payout => engine.payout(account, amount, None, None).await,
        TransactionKind::Refund => engine.refund(account, amount, None, None).await,
    }
    .map(|_| ())
}

fn op_strategy() -> impl Strategy<Value = (TransactionKind, i64)> {
    (
        prop::sample::select(TransactionKind::ALL.to_vec()),
        -50i64..2_000,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balances_stay_consistent_and_replay_matches(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let engine = memory_engine();
        let account = AccountId::new("prop_account");

        tokio_test::block_on(async {
            let mut successes = 0usize;
            for (kind, amount) in ops {
                let before = engine.get_balance(&account).await.unwrap();
                match run_op(&engine, &account, kind, amount).await {
                    Ok(()) => successes += 1,
                    Err(err) => {
                        assert!(matches!(
                            err,
                            LedgerError::InvalidAmount(_)
                                | LedgerError::InsufficientAvailableFunds { .. }
                                | LedgerError::InsufficientHeldFunds { .. }
                        ));
                        let after = engine.get_balance(&account).await.unwrap();
                        assert_eq!(before, after);
                    }
                }

                let live = engine.get_balance(&account).await.unwrap();
                assert!(live.is_consistent());
                assert!(!live.available.is_negative());
                assert!(!live.held.is_negative());
            }

            let report = engine.verify_account(&account).await.unwrap();
            assert!(report.is_clean(), "{:?}", report.issues);
            assert_eq!(report.transactions, successes);
        });
    }

    #[test]
    fn withdraw_beyond_available_never_succeeds(deposit in 1i64..10_000, extra in 1i64..10_000) {
        let engine = memory_engine();
        let account = AccountId::new("prop_withdraw");

        tokio_test::block_on(async {
            engine.deposit(&account, Amount::from_minor(deposit), None).await.unwrap();
            let err = engine
                .withdraw(&account, Amount::from_minor(deposit + extra), None)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InsufficientAvailableFunds { .. }));

            let live = engine.get_balance(&account).await.unwrap();
            assert_eq!(live.balance.minor(), deposit);
            assert_eq!(live.available.minor(), deposit);
        });
    }

    #[test]
    fn hold_then_capture_only_reduces_balance(deposit in 1i64..10_000, pct in 1i64..=100) {
        let engine = memory_engine();
        let account = AccountId::new("prop_capture");
        let hold = (deposit * pct / 100).max(1);

        tokio_test::block_on(async {
            let before = engine.deposit(&account, Amount::from_minor(deposit), None).await.unwrap().account;
            engine.hold(&account, Amount::from_minor(hold), None, None).await.unwrap();
            let after = engine.capture(&account, Amount::from_minor(hold), None, None).await.unwrap().account;

            assert_eq!(after.balance.minor(), before.balance.minor() - hold);
            assert_eq!(after.held, before.held);
            assert_eq!(after.available.minor(), before.available.minor() - hold);
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_only_one_succeeds() {
    for round in 0..50 {
        let engine = memory_engine();
        let account = AccountId::new(format!("race_{round}"));
        engine
            .deposit(&account, Amount::from_minor(100), None)
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let account = account.clone();
                tokio::spawn(async move {
                    engine
                        .withdraw(&account, Amount::from_minor(100), None)
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientAvailableFunds { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((ok, insufficient), (1, 1));
        let live = engine.get_balance(&account).await.unwrap();
        assert_eq!(live.available, Amount::ZERO);
        assert!(engine.verify_account(&account).await.unwrap().is_clean());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_accounts_are_independent() {
    let engine = memory_engine();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let account = AccountId::new(format!("vendor_{i}"));
                for _ in 0..25 {
                    engine
                        .deposit(&account, Amount::from_minor(10), None)
                        .await
                        .unwrap();
                }
                engine
                    .hold(&account, Amount::from_minor(50), Some(format!("evt_{i}").into()), None)
                    .await
                    .unwrap();
                account
            })
        })
        .collect();

    for handle in handles {
        let account = handle.await.unwrap();
        let live = engine.get_balance(&account).await.unwrap();
        assert_eq!(live.balance.minor(), 250);
        assert_eq!(live.available.minor(), 200);
        assert_eq!(live.held.minor(), 50);
        assert_eq!(live.version, 26);
    }
    assert_eq!(engine.metrics().snapshot().transactions_appended, 16 * 26);
}

#[tokio::test]
async fn file_backed_engine_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.jsonl");
    let host = AccountId::new("host_1");

    {
        let engine = LedgerEngine::new(Arc::new(FileStore::open(&path).unwrap()), LedgerConfig::default());
        engine.deposit(&host, Amount::from_minor(1_000), None).await.unwrap();
        engine
            .hold(&host, Amount::from_minor(400), Some("evt1".into()), None)
            .await
            .unwrap();
    }

    let engine = LedgerEngine::new(Arc::new(FileStore::open(&path).unwrap()), LedgerConfig::default());
    let live = engine.get_balance(&host).await.unwrap();
    assert_eq!(
        (live.balance.minor(), live.available.minor(), live.held.minor()),
        (1_000, 600, 400)
    );

    let receipt = engine
        .capture(&host, Amount::from_minor(400), Some("evt1".into()), None)
        .await
        .unwrap();
    assert_eq!(receipt.transaction.sequence, 3);
    assert!(engine.verify_account(&host).await.unwrap().is_clean());
}
