//! A small demo workload: create a table, load it, scan it, aggregate it.

use rhea_bin::aggregate::{AggregateExecutor, AggregateOp};
use rhea_bin::executor::{Executor, TupleIterator};
use rhea_bin::insert::InsertExecutor;
use rhea_bin::scan::SeqScanExecutor;
use rhea_bin::Database;
use std::sync::Arc;
use strata::error::DbError;
use strata::heap_file::HeapFile;
use strata::transaction::TransactionId;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};

fn main() -> Result<(), DbError> {
    let data_dir = std::env::var("RHEA_DATA_DIR").unwrap_or("rhea-data".to_string());
    let db = Database::open(&data_dir)?;

    let td = TupleDesc::new(vec![(FieldType::Str, "city"), (FieldType::Int, "population")]);
    let file = Arc::new(HeapFile::open(
        std::path::Path::new(&data_dir).join("cities.dat"),
        td.clone(),
    )?);
    let table_id = db.catalog.add_table(file, "cities");

    let rows = [
        ("reykjavik", 139_000),
        ("wellington", 215_000),
        ("ljubljana", 295_000),
    ];
    let tuples = rows
        .iter()
        .map(|(city, population)| {
            Tuple::new(
                td.clone(),
                vec![Field::Str(city.to_string()), Field::Int(*population)],
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let loader = TransactionId::new();
    let mut insert = InsertExecutor::new(
        &db.pool,
        loader,
        table_id,
        Box::new(TupleIterator::new(td.clone(), tuples)),
    )?;
    if let Some(count) = insert.next()? {
        println!("inserted {count} row(s)");
    }
    db.pool.transaction_complete(loader, true)?;

    let reader = TransactionId::new();
    let mut scan = SeqScanExecutor::new(&db.pool, reader, table_id)?;
    println!("{}", scan.tuple_desc());
    while let Some(tuple) = scan.next()? {
        println!("{tuple}");
    }

    let scan = SeqScanExecutor::new(&db.pool, reader, table_id)?;
    let population = td.index_of("population").ok_or_else(|| {
        DbError::SchemaMismatch("cities has no population column".to_string())
    })?;
    let mut total = AggregateExecutor::new(Box::new(scan), population, None, AggregateOp::Sum)?;
    if let Some(tuple) = total.next()? {
        println!("total population: {tuple}");
    }
    db.pool.transaction_complete(reader, true)?;

    db.pool.flush_all()?;
    Ok(())
}
