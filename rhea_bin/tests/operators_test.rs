use rhea_bin::aggregate::{AggregateExecutor, AggregateOp};
use rhea_bin::delete::DeleteExecutor;
use rhea_bin::executor::{Executor, TupleIterator};
use rhea_bin::insert::InsertExecutor;
use rhea_bin::scan::SeqScanExecutor;
use serial_test::serial;
use strata::buffer_pool::BufferPool;
use strata::error::DbError;
use strata::heap_file::DbFile;
use strata::transaction::TransactionId;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};

mod common;

/// Restores the default page size even when an assertion unwinds.
struct PageSizeGuard;

impl Drop for PageSizeGuard {
    fn drop(&mut self) {
        BufferPool::reset_page_size();
    }
}

fn drain_ints(exec: &mut dyn Executor) -> Vec<i32> {
    let mut out = Vec::new();
    while let Some(t) = exec.next().unwrap() {
        out.push(common::int_value(&t));
    }
    out
}

#[test]
#[serial]
fn insert_scan_and_aggregate_round_trip() {
    let (_dir, db, tables) = common::open_db(8, 1);
    let tid = TransactionId::new();

    let tuples: Vec<Tuple> = (1..=5).map(common::int_tuple).collect();
    let child = TupleIterator::new(common::int_desc(), tuples);
    let mut insert = InsertExecutor::new(&db.pool, tid, tables[0], Box::new(child)).unwrap();
    let count = insert.next().unwrap().unwrap();
    assert_eq!(common::int_value(&count), 5);
    assert!(insert.next().unwrap().is_none());

    let mut scan = SeqScanExecutor::new(&db.pool, tid, tables[0]).unwrap();
    let mut values = drain_ints(&mut scan);
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    scan.rewind().unwrap();
    let mut sum = AggregateExecutor::new(Box::new(scan), 0, None, AggregateOp::Sum).unwrap();
    assert_eq!(common::int_value(&sum.next().unwrap().unwrap()), 15);

    db.pool.transaction_complete(tid, true).unwrap();
}

#[test]
#[serial]
fn delete_empties_what_a_scan_found() {
    let (_dir, db, tables) = common::open_db(8, 1);
    let writer = TransactionId::new();
    for v in 0..4 {
        db.pool.insert_tuple(writer, tables[0], common::int_tuple(v)).unwrap();
    }
    db.pool.transaction_complete(writer, true).unwrap();

    let tid = TransactionId::new();
    let mut scan = SeqScanExecutor::new(&db.pool, tid, tables[0]).unwrap();
    let mut stored = Vec::new();
    while let Some(t) = scan.next().unwrap() {
        stored.push(t);
    }
    assert_eq!(stored.len(), 4);

    let child = TupleIterator::new(common::int_desc(), stored);
    let mut delete = DeleteExecutor::new(&db.pool, tid, Box::new(child));
    let count = delete.next().unwrap().unwrap();
    assert_eq!(common::int_value(&count), 4);
    db.pool.transaction_complete(tid, true).unwrap();

    let reader = TransactionId::new();
    let mut scan = SeqScanExecutor::new(&db.pool, reader, tables[0]).unwrap();
    assert!(drain_ints(&mut scan).is_empty());
    db.pool.transaction_complete(reader, true).unwrap();
}

#[test]
#[serial]
fn insert_rejects_a_mismatched_child_schema() {
    let (_dir, db, tables) = common::open_db(8, 1);
    let tid = TransactionId::new();

    let wrong = TupleDesc::new(vec![(FieldType::Str, "v")]);
    let child = TupleIterator::new(wrong, Vec::new());
    let err = InsertExecutor::new(&db.pool, tid, tables[0], Box::new(child)).unwrap_err();
    assert!(matches!(err, DbError::SchemaMismatch(_)));
}

#[test]
#[serial]
fn a_scan_walks_every_page_under_a_small_page_size() {
    let _guard = PageSizeGuard;
    BufferPool::set_page_size(128);

    let (_dir, db, tables) = common::open_db(8, 1);
    let tid = TransactionId::new();

    let tuples: Vec<Tuple> = (0..40).map(common::int_tuple).collect();
    let child = TupleIterator::new(common::int_desc(), tuples);
    let mut insert = InsertExecutor::new(&db.pool, tid, tables[0], Box::new(child)).unwrap();
    assert_eq!(common::int_value(&insert.next().unwrap().unwrap()), 40);

    let file = db.catalog.get_file(tables[0]).unwrap();
    assert!(
        file.num_pages().unwrap() >= 2,
        "40 tuples should not fit one 128-byte page"
    );

    let mut scan = SeqScanExecutor::new(&db.pool, tid, tables[0]).unwrap();
    let mut values = drain_ints(&mut scan);
    values.sort_unstable();
    assert_eq!(values, (0..40).collect::<Vec<i32>>());

    db.pool.transaction_complete(tid, true).unwrap();
}

#[test]
#[serial]
fn aggregates_group_rows_fetched_through_the_pool() {
    let (_dir, db, tables) = common::open_db(8, 1);
    let writer = TransactionId::new();
    for v in [1, 1, 2, 3, 3, 3] {
        db.pool.insert_tuple(writer, tables[0], common::int_tuple(v)).unwrap();
    }
    db.pool.transaction_complete(writer, true).unwrap();

    let reader = TransactionId::new();
    let scan = SeqScanExecutor::new(&db.pool, reader, tables[0]).unwrap();
    let mut counts =
        AggregateExecutor::new(Box::new(scan), 0, Some(0), AggregateOp::Count).unwrap();

    let mut out = Vec::new();
    while let Some(t) = counts.next().unwrap() {
        let group = common::int_value(&t);
        let count = match t.field(1) {
            Field::Int(v) => *v,
            other => panic!("unexpected count {other:?}"),
        };
        out.push((group, count));
    }
    out.sort_unstable();
    assert_eq!(out, vec![(1, 2), (2, 1), (3, 3)]);
    db.pool.transaction_complete(reader, true).unwrap();
}
