#![allow(dead_code)]

use rhea_bin::Database;
use std::sync::Arc;
use strata::heap_file::HeapFile;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};
use tempfile::TempDir;

pub fn int_desc() -> TupleDesc {
    TupleDesc::new(vec![(FieldType::Int, "v")])
}

pub fn int_tuple(v: i32) -> Tuple {
    Tuple::new(int_desc(), vec![Field::Int(v)]).unwrap()
}

pub fn int_value(t: &Tuple) -> i32 {
    match t.field(0) {
        Field::Int(v) => *v,
        other => panic!("unexpected field {other:?}"),
    }
}

/// A database in a fresh tempdir with `tables` single-int-column tables.
pub fn open_db(capacity: usize, tables: usize) -> (TempDir, Database, Vec<u32>) {
    let dir = TempDir::new().unwrap();
    let db = Database::with_capacity(dir.path(), capacity).unwrap();
    let ids = (0..tables)
        .map(|i| {
            let file = Arc::new(
                HeapFile::open(dir.path().join(format!("t{i}.dat")), int_desc()).unwrap(),
            );
            db.catalog.add_table(file, &format!("t{i}"))
        })
        .collect();
    (dir, db, ids)
}
