//! Atomic writes and reads against the in-memory dialect.

mod common;

use common::{fixture, fixture_with, Account, Order};
use odm_engine::{ConditionSpec, Error, Key, Store};
use odm_memory::MemoryConfig;

fn seeded() -> (Store, std::sync::Arc<odm_memory::MemoryDb>) {
    let (store, db) = fixture();
    store
        .table::<Account>()
        .put_item(
            &Account {
                id: "a1".into(),
                balance: 100,
            },
            None,
        )
        .unwrap();
    store
        .table::<Account>()
        .put_item(
            &Account {
                id: "a2".into(),
                balance: 0,
            },
            None,
        )
        .unwrap();
    store
        .table::<Order>()
        .put_item(
            &Order {
                id: "o1".into(),
                status: "pending".into(),
            },
            None,
        )
        .unwrap();
    (store, db)
}

fn balance(store: &Store, id: &str) -> i64 {
    store
        .table::<Account>()
        .get_item(&Key::partition(id), None)
        .unwrap()
        .map(|a| a.balance)
        .unwrap_or_default()
}

fn status(store: &Store, id: &str) -> String {
    store
        .table::<Order>()
        .get_item(&Key::partition(id), None)
        .unwrap()
        .map(|o| o.status)
        .unwrap_or_default()
}

fn debit(amount: i64) -> ConditionSpec {
    ConditionSpec::new("balance >= :amount").value(":amount", amount)
}

fn mark_paid() -> ConditionSpec {
    ConditionSpec::params()
        .name("#s", "status")
        .value(":paid", "paid")
}

#[test]
fn all_operations_apply_together() {
    let (store, _db) = seeded();
    let mut tx = store.transaction();
    tx.update(
        "account",
        Key::partition("a1"),
        "SET balance = balance - :amount",
        Some(debit(60)),
    )
    .unwrap();
    tx.update(
        "account",
        Key::partition("a2"),
        "ADD balance :amount",
        Some(ConditionSpec::params().value(":amount", 60)),
    )
    .unwrap();
    tx.update("order", Key::partition("o1"), "SET #s = :paid", Some(mark_paid()))
        .unwrap();
    assert_eq!(tx.len(), 3);
    tx.commit().unwrap();

    assert_eq!(balance(&store, "a1"), 40);
    assert_eq!(balance(&store, "a2"), 60);
    assert_eq!(status(&store, "o1"), "paid");
}

#[test]
fn failed_condition_rejects_whole_set() {
    let (store, _db) = seeded();
    let mut tx = store.transaction();
    tx.update("order", Key::partition("o1"), "SET #s = :paid", Some(mark_paid()))
        .unwrap();
    tx.update(
        "account",
        Key::partition("a1"),
        "SET balance = balance - :amount",
        Some(debit(150)),
    )
    .unwrap();

    let err = tx.commit().unwrap_err();
    let failure = err.condition_failure().expect("condition failure");
    assert_eq!(failure.table, "account");
    assert_eq!(failure.operation, Some(1));
    assert!(failure.prior.is_none());

    assert_eq!(status(&store, "o1"), "pending");
    assert_eq!(balance(&store, "a1"), 100);
}

#[test]
fn prior_value_returned_when_asked() {
    let (store, _db) = seeded();
    let mut tx = store.transaction();
    tx.check(
        "account",
        Key::partition("a1"),
        ConditionSpec::new("balance > :min").value(":min", 1000),
    )
    .unwrap()
    .return_prior_on_failure();
    tx.delete("order", Key::partition("o1"), None).unwrap();

    let err = tx.commit().unwrap_err();
    let failure = err.condition_failure().expect("condition failure");
    assert_eq!(failure.operation, Some(0));
    let prior: Option<Account> = failure.prior_as().unwrap();
    assert_eq!(prior.map(|a| a.balance), Some(100));
    assert_eq!(status(&store, "o1"), "pending");
}

#[test]
fn puts_and_deletes() {
    let (store, db) = seeded();
    let mut tx = store.transaction();
    tx.put(
        &Order {
            id: "o2".into(),
            status: "new".into(),
        },
        Some(ConditionSpec::new("attribute_not_exists(id)")),
    )
    .unwrap();
    tx.delete("order", Key::partition("o1"), None).unwrap();
    tx.commit().unwrap();

    assert_eq!(db.item_count("order"), Some(1));
    assert_eq!(status(&store, "o2"), "new");
}

#[test]
fn put_creates_missing_table() {
    let (store, db) = fixture();
    let mut tx = store.transaction();
    tx.put(
        &Account {
            id: "a1".into(),
            balance: 5,
        },
        None,
    )
    .unwrap();
    tx.commit().unwrap();

    assert_eq!(db.item_count("account"), Some(1));
    assert_eq!(balance(&store, "a1"), 5);
}

#[test]
fn builder_misuse_is_configuration() {
    let (store, _db) = seeded();

    let err = store.transaction().commit().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let mut tx = store.transaction();
    tx.delete("order", Key::partition("o1"), None).unwrap();
    let err = tx
        .get("account", Key::partition("a1"))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let mut tx = store.transaction();
    tx.delete("order", Key::partition("o1"), None).unwrap();
    let err = tx
        .update("order", Key::partition("o1"), "SET #s = :paid", Some(mark_paid()))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn reads_see_one_snapshot() {
    let (store, _db) = seeded();
    let mut tx = store.transaction();
    tx.get("account", Key::partition("a1")).unwrap();
    tx.get("account", Key::partition("missing")).unwrap();
    tx.get("order", Key::partition("o1")).unwrap();
    let outcome = tx.commit().unwrap();

    assert_eq!(outcome.len(), 3);
    let first: Option<Account> = outcome.item(0).unwrap();
    assert_eq!(first.map(|a| a.balance), Some(100));
    assert_eq!(outcome.item::<Account>(1).unwrap(), None);
    let order: Option<Order> = outcome.item(2).unwrap();
    assert_eq!(order.map(|o| o.status), Some("pending".to_string()));
}

#[test]
fn oversized_transaction_is_rejected() {
    let (store, _db) = fixture_with(MemoryConfig {
        transaction_limit: 1,
        ..MemoryConfig::default()
    });
    let accounts = store.table::<Account>();
    accounts.ensure_ready().unwrap();

    let mut tx = store.transaction();
    tx.delete("account", Key::partition("a1"), None).unwrap();
    tx.delete("account", Key::partition("a2"), None).unwrap();
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
}
