//! Batch reads and writes against the in-memory dialect.

mod common;

use common::{book, fixture, fixture_with, Account, Book};
use odm_engine::{BatchGet, BatchWrite, Error, Key, Store};
use odm_memory::MemoryConfig;

fn ready(store: &Store) {
    store.table::<Book>().ensure_ready().unwrap();
    store.table::<Account>().ensure_ready().unwrap();
}

fn account(id: &str, balance: i64) -> Account {
    Account {
        id: id.into(),
        balance,
    }
}

#[test]
fn results_are_routed_by_table() {
    let (store, db) = fixture();
    ready(&store);

    let written = store
        .batch_write(vec![
            BatchWrite::new("book")
                .put(&book("Jack", "Book0", 1))
                .unwrap()
                .put(&book("Jack", "Book1", 2))
                .unwrap(),
            BatchWrite::new("account")
                .put(&account("a1", 100))
                .unwrap(),
        ])
        .unwrap();
    assert!(written.is_complete());
    assert_eq!(db.item_count("book"), Some(2));
    assert_eq!(db.item_count("account"), Some(1));

    let read = store
        .batch_get(vec![
            BatchGet::new("account").key(Key::partition("a1")),
            BatchGet::new("book").keys([
                Key::composite("Jack", "Book1"),
                Key::composite("Jack", "Missing"),
            ]),
        ])
        .unwrap();
    assert!(read.is_complete());

    let books: Vec<Book> = read.items("book").unwrap();
    assert_eq!(books, vec![book("Jack", "Book1", 2)]);
    let accounts: Vec<Account> = read.items("account").unwrap();
    assert_eq!(accounts, vec![account("a1", 100)]);
}

#[test]
fn empty_entries_are_skipped() {
    let (store, _db) = fixture();
    ready(&store);
    store
        .table::<Book>()
        .put_item(&book("Jack", "Book0", 1), None)
        .unwrap();

    // "shelf" does not exist; an empty entry never reaches the store
    let read = store
        .batch_get(vec![
            BatchGet::new("shelf"),
            BatchGet::new("book").key(Key::composite("Jack", "Book0")),
        ])
        .unwrap();
    assert!(read.is_complete());
    assert!(!read.responses.contains_key("shelf"));
    assert_eq!(read.items::<Book>("book").unwrap().len(), 1);

    let written = store
        .batch_write(vec![BatchWrite::new("shelf"), BatchWrite::new("book")])
        .unwrap();
    assert!(written.is_complete());
}

#[test]
fn duplicate_table_fails_before_writing() {
    let (store, db) = fixture();
    ready(&store);

    let err = store
        .batch_write(vec![
            BatchWrite::new("book").put(&book("Jack", "A", 1)).unwrap(),
            BatchWrite::new("book").put(&book("Jack", "B", 1)).unwrap(),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err:?}");
    assert_eq!(db.item_count("book"), Some(0));
}

#[test]
fn deletes_in_batch() {
    let (store, db) = fixture();
    ready(&store);
    let books = store.table::<Book>();
    books.put_item(&book("Jack", "Book0", 1), None).unwrap();
    books.put_item(&book("Jack", "Book1", 1), None).unwrap();

    store
        .batch_write(vec![BatchWrite::new("book")
            .delete(Key::composite("Jack", "Book0"))
            .put(&book("Jack", "Book2", 3))
            .unwrap()])
        .unwrap();
    assert_eq!(db.item_count("book"), Some(2));
    assert_eq!(
        books
            .get_item(&Key::composite("Jack", "Book0"), None)
            .unwrap(),
        None
    );
}

#[test]
fn capacity_leaves_remainder_unprocessed() {
    let (store, db) = fixture_with(MemoryConfig::default().with_batch_capacity(2));
    ready(&store);

    let batch = BatchWrite::new("book")
        .put(&book("Jack", "Book0", 0))
        .unwrap()
        .put(&book("Jack", "Book1", 1))
        .unwrap()
        .put(&book("Jack", "Book2", 2))
        .unwrap();
    let first = store.batch_write(vec![batch]).unwrap();
    assert_eq!(first.unprocessed.len(), 1);
    assert_eq!(first.unprocessed[0].table, "book");
    assert_eq!(first.unprocessed[0].puts.len(), 1);
    assert_eq!(db.item_count("book"), Some(2));

    let second = store.batch_write(first.unprocessed).unwrap();
    assert!(second.is_complete());
    assert_eq!(db.item_count("book"), Some(3));

    let keys = (0..3).map(|i| Key::composite("Jack", format!("Book{}", i)));
    let read = store
        .batch_get(vec![BatchGet::new("book").keys(keys).consistent()])
        .unwrap();
    assert_eq!(read.items::<Book>("book").unwrap().len(), 2);
    assert_eq!(read.unprocessed.len(), 1);
    assert_eq!(
        read.unprocessed[0].keys,
        vec![Key::composite("Jack", "Book2")]
    );
    assert!(read.unprocessed[0].consistent);

    let rest = store.batch_get(read.unprocessed).unwrap();
    assert!(rest.is_complete());
    assert_eq!(rest.items::<Book>("book").unwrap(), vec![book("Jack", "Book2", 2)]);
}

#[test]
fn oversized_batch_is_rejected() {
    let (store, db) = fixture();
    ready(&store);

    let mut batch = BatchWrite::new("book");
    for i in 0..26 {
        batch = batch.put(&book("Jack", &format!("Book{}", i), i)).unwrap();
    }
    let err = store.batch_write(vec![batch]).unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert_eq!(db.item_count("book"), Some(0));
}

#[test]
fn unknown_table_is_not_found() {
    let (store, _db) = fixture();
    let err = store
        .batch_get(vec![BatchGet::new("shelf").key(Key::partition("x"))])
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err:?}");
}
