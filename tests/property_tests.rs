//! Property-based tests for ledger invariants
//!
//! These tests verify the critical invariants over random transaction
//! streams:
//! - No account balance is ever negative after a completed post
//! - Transfers conserve the total system balance
//! - Posting a transaction twice is indistinguishable from posting it once
//! - Replaying the WAL rebuilds exactly the pre-crash state

use std::collections::HashMap;
use std::path::Path;

use proptest::prelude::*;
use uuid::Uuid;

use memledger::{
    spawn_single_writer, AccountId, AccountStore, Error, MutexLedger, SingleWriterLedger,
    Transaction, WriteAheadLog,
};

fn seed_balances() -> HashMap<AccountId, i64> {
    let mut balances = HashMap::new();
    balances.insert(AccountId::new(1), 100);
    balances.insert(AccountId::new(2), 50);
    balances.insert(AccountId::new(3), 75);
    balances
}

fn open_mutex(path: &Path) -> MutexLedger {
    let wal = WriteAheadLog::open(path).unwrap();
    let (engine, _) = MutexLedger::new(AccountStore::new(seed_balances()), wal, true).unwrap();
    engine
}

fn total(snapshot: &HashMap<AccountId, i64>) -> i128 {
    snapshot.values().map(|&b| i128::from(b)).sum()
}

/// Strategy for one of the three seeded accounts
fn account_strategy() -> impl Strategy<Value = AccountId> {
    prop_oneof![
        Just(AccountId::new(1)),
        Just(AccountId::new(2)),
        Just(AccountId::new(3)),
    ]
}

/// Strategy for arbitrary valid-shaped transactions (amounts >= 1; may
/// still fail business validation, e.g. insufficient funds)
fn transaction_strategy() -> impl Strategy<Value = Transaction> {
    (
        any::<u128>(),
        0u8..3,
        account_strategy(),
        account_strategy(),
        1i64..=120,
    )
        .prop_map(|(raw_id, kind, from, to, amount)| {
            let id = Uuid::from_u128(raw_id);
            match kind {
                0 => Transaction::deposit(id, to, amount, 0),
                1 => Transaction::withdraw(id, from, amount, 0),
                _ => Transaction::transfer(id, from, to, amount, 0),
            }
        })
}

/// Strategy for transfers between distinct accounts
fn transfer_strategy() -> impl Strategy<Value = Transaction> {
    (any::<u128>(), account_strategy(), account_strategy(), 1i64..=120).prop_filter_map(
        "self transfers are rejected by design",
        |(raw_id, from, to, amount)| {
            (from != to)
                .then(|| Transaction::transfer(Uuid::from_u128(raw_id), from, to, amount, 0))
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: no balance is ever negative, whatever the stream does
    #[test]
    fn prop_balances_never_negative(
        trans in prop::collection::vec(transaction_strategy(), 1..40)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_mutex(&dir.path().join("negative.wal"));

        for tran in trans {
            // Business rejections are expected; the invariant is on state.
            let _ = engine.post(tran);
        }

        for (account, balance) in engine.snapshot() {
            prop_assert!(balance >= 0, "account {} went negative: {}", account, balance);
        }
    }

    /// Property: transfers conserve the total system balance
    #[test]
    fn prop_transfers_conserve_total(
        trans in prop::collection::vec(transfer_strategy(), 1..40)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_mutex(&dir.path().join("conserve.wal"));
        let before = total(&engine.snapshot());

        for tran in trans {
            let _ = engine.post(tran);
        }

        prop_assert_eq!(total(&engine.snapshot()), before);
    }

    /// Property: post(T); post(T) has the same effect as post(T)
    #[test]
    fn prop_posting_twice_equals_posting_once(
        trans in prop::collection::vec(transaction_strategy(), 1..30)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let once = open_mutex(&dir.path().join("once.wal"));
        let twice = open_mutex(&dir.path().join("twice.wal"));

        for tran in trans {
            let _ = once.post(tran.clone());
            let _ = twice.post(tran.clone());
            let _ = twice.post(tran);
        }

        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }

    /// Property: recovery from the WAL rebuilds the exact pre-crash state
    #[test]
    fn prop_replay_rebuilds_identical_state(
        trans in prop::collection::vec(transaction_strategy(), 1..30)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.wal");

        let engine = open_mutex(&path);
        for tran in trans {
            let _ = engine.post(tran);
        }
        let expected = engine.snapshot();
        drop(engine);

        let recovered = open_mutex(&path);
        prop_assert_eq!(recovered.snapshot(), expected);
    }
}

mod integration_tests {
    use super::*;

    fn two_accounts() -> HashMap<AccountId, i64> {
        let mut balances = HashMap::new();
        balances.insert(AccountId::new(1), 100);
        balances.insert(AccountId::new(2), 50);
        balances
    }

    fn snapshot_of(pairs: &[(i64, i64)]) -> HashMap<AccountId, i64> {
        pairs
            .iter()
            .map(|&(id, balance)| (AccountId::new(id), balance))
            .collect()
    }

    #[test]
    fn end_to_end_scenario_mutex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.wal");
        let wal = WriteAheadLog::open(&path).unwrap();
        let (engine, _) = MutexLedger::new(AccountStore::new(two_accounts()), wal, true).unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        // 1. Deposit A: to=1, amount=25
        engine
            .post(Transaction::deposit(a, AccountId::new(1), 25, 0))
            .unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 125), (2, 50)]));

        // 2. Withdraw B: from=2, amount=60 -> insufficient
        assert!(matches!(
            engine.post(Transaction::withdraw(b, AccountId::new(2), 60, 0)),
            Err(Error::InsufficientBalance)
        ));
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 125), (2, 50)]));

        // 3. Withdraw B: from=2, amount=50 -> ok (B never entered the index)
        engine
            .post(Transaction::withdraw(b, AccountId::new(2), 50, 0))
            .unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 125), (2, 0)]));

        // 4. Retry of B -> idempotent Ok, no state change
        engine
            .post(Transaction::withdraw(b, AccountId::new(2), 50, 0))
            .unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 125), (2, 0)]));

        // 5. Transfer C: 1 -> 2, amount=75
        engine
            .post(Transaction::transfer(
                c,
                AccountId::new(1),
                AccountId::new(2),
                75,
                0,
            ))
            .unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 50), (2, 75)]));
        drop(engine);

        // 6. Crash and restart: replay yields identical state, and A, B, C
        // are all remembered as applied.
        let wal = WriteAheadLog::open(&path).unwrap();
        let (engine, report) =
            MutexLedger::new(AccountStore::new(two_accounts()), wal, true).unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 50), (2, 75)]));
        // Four durable records: A, the failed B attempt, the good B, and C.
        assert_eq!(report.replayed, 4);
        assert_eq!(report.applied, 3);
        assert_eq!(report.anomalies, 1);

        engine
            .post(Transaction::deposit(a, AccountId::new(1), 25, 0))
            .unwrap();
        engine
            .post(Transaction::withdraw(b, AccountId::new(2), 50, 0))
            .unwrap();
        engine
            .post(Transaction::transfer(
                c,
                AccountId::new(1),
                AccountId::new(2),
                75,
                0,
            ))
            .unwrap();
        assert_eq!(engine.snapshot(), snapshot_of(&[(1, 50), (2, 75)]));
    }

    async fn open_single_writer(path: &Path) -> SingleWriterLedger {
        let wal = WriteAheadLog::open(path).unwrap();
        let (ledger, _) = spawn_single_writer(AccountStore::new(two_accounts()), wal, 64).unwrap();
        ledger
    }

    #[tokio::test]
    async fn end_to_end_scenario_single_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario_sw.wal");
        let ledger = open_single_writer(&path).await;

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        ledger
            .post(Transaction::deposit(a, AccountId::new(1), 25, 0))
            .await
            .unwrap();
        assert!(matches!(
            ledger
                .post(Transaction::withdraw(b, AccountId::new(2), 60, 0))
                .await,
            Err(Error::InsufficientBalance)
        ));
        ledger
            .post(Transaction::withdraw(b, AccountId::new(2), 50, 0))
            .await
            .unwrap();
        ledger
            .post(Transaction::withdraw(b, AccountId::new(2), 50, 0))
            .await
            .unwrap();
        ledger
            .post(Transaction::transfer(
                c,
                AccountId::new(1),
                AccountId::new(2),
                75,
                0,
            ))
            .await
            .unwrap();
        assert_eq!(
            ledger.snapshot().await.unwrap(),
            snapshot_of(&[(1, 50), (2, 75)])
        );
        ledger.shutdown().await.unwrap();

        // Restart: replay rebuilds the same state; retries are no-ops.
        let ledger = open_single_writer(&path).await;
        assert_eq!(
            ledger.snapshot().await.unwrap(),
            snapshot_of(&[(1, 50), (2, 75)])
        );
        ledger
            .post(Transaction::deposit(a, AccountId::new(1), 25, 0))
            .await
            .unwrap();
        assert_eq!(
            ledger.snapshot().await.unwrap(),
            snapshot_of(&[(1, 50), (2, 75)])
        );
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn wal_order_matches_application_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.wal");
        let ledger = open_single_writer(&path).await;

        for _ in 0..10 {
            ledger
                .post(Transaction::deposit(Uuid::new_v4(), AccountId::new(1), 1, 0))
                .await
                .unwrap();
        }
        ledger.shutdown().await.unwrap();

        let wal = WriteAheadLog::open(&path).unwrap();
        let mut sequences = Vec::new();
        wal.read_all(|payload| {
            let tran: Transaction = bincode::deserialize(payload).unwrap();
            sequences.push(tran.sequence);
            Ok(())
        })
        .unwrap();
        assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn concurrent_producers_keep_totals_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concurrent.wal");
        let ledger = open_single_writer(&path).await;

        let mut tasks = Vec::new();
        for producer in 0..8 {
            let handle = ledger.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let tran = if producer % 2 == 0 {
                        Transaction::deposit(Uuid::new_v4(), AccountId::new(1), 10, 0)
                    } else {
                        Transaction::transfer(
                            Uuid::new_v4(),
                            AccountId::new(1),
                            AccountId::new(2),
                            1,
                            0,
                        )
                    };
                    handle.post(tran).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // 20 deposits of 10 and 20 transfers of 1: the total grows by
        // exactly the deposited amount.
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(total(&snapshot), 150 + 200);
        assert_eq!(snapshot[&AccountId::new(2)], 50 + 20);
        ledger.shutdown().await.unwrap();
    }
}
