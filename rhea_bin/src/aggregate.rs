//! A materializing hash aggregate over a single column, with an optional
//! single group-by column.

use crate::executor::Executor;
use std::collections::HashMap;
use std::fmt;
use strata::error::DbError;
use strata::tuple::{Field, FieldType, Tuple, TupleDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default)]
struct AggregateState {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl AggregateState {
    fn merge(&mut self, field: &Field) {
        self.count += 1;
        if let Field::Int(v) = field {
            let v = *v;
            self.sum += v as i64;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn result(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count as i32,
            AggregateOp::Sum => self.sum as i32,
            AggregateOp::Avg if self.count == 0 => 0,
            AggregateOp::Avg => (self.sum / self.count) as i32,
            AggregateOp::Min => self.min.unwrap_or_default(),
            AggregateOp::Max => self.max.unwrap_or_default(),
        }
    }
}

/// Consumes its whole child on the first `next`, then streams one result
/// tuple per group: `(group, value)` when grouping, a lone `(value)`
/// otherwise. String columns only admit `count`.
pub struct AggregateExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    afield: usize,
    gfield: Option<usize>,
    op: AggregateOp,
    td: TupleDesc,
    results: Option<std::vec::IntoIter<Tuple>>,
}

impl<'a> fmt::Debug for AggregateExecutor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateExecutor")
            .field("afield", &self.afield)
            .field("gfield", &self.gfield)
            .field("op", &self.op)
            .field("td", &self.td)
            .finish()
    }
}

impl<'a> AggregateExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        afield: usize,
        gfield: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        let child_td = child.tuple_desc();
        if child_td.field_type(afield) == FieldType::Str && op != AggregateOp::Count {
            return Err(DbError::SchemaMismatch(format!(
                "{op} is not defined over string fields"
            )));
        }

        let aname = child_td.field_name(afield).to_string();
        let value_name = format!("{op}({aname})");
        let td = match gfield {
            Some(g) => {
                let gname = child_td.field_name(g).to_string();
                TupleDesc::new(vec![
                    (child_td.field_type(g), gname),
                    (FieldType::Int, value_name),
                ])
            }
            None => TupleDesc::new(vec![(FieldType::Int, value_name)]),
        };

        Ok(Self {
            child,
            afield,
            gfield,
            op,
            td,
            results: None,
        })
    }

    fn materialize(&mut self) -> Result<std::vec::IntoIter<Tuple>, DbError> {
        let mut groups: HashMap<Option<Field>, AggregateState> = HashMap::new();
        while let Some(tuple) = self.child.next()? {
            let key = self.gfield.map(|g| tuple.field(g).clone());
            groups
                .entry(key)
                .or_default()
                .merge(tuple.field(self.afield));
        }

        let mut tuples = Vec::with_capacity(groups.len().max(1));
        if self.gfield.is_some() {
            for (key, state) in groups {
                let Some(group) = key else { continue };
                tuples.push(Tuple::new(
                    self.td.clone(),
                    vec![group, Field::Int(state.result(self.op))],
                )?);
            }
        } else {
            let state = groups.remove(&None).unwrap_or_default();
            tuples.push(Tuple::new(
                self.td.clone(),
                vec![Field::Int(state.result(self.op))],
            )?);
        }
        Ok(tuples.into_iter())
    }
}

impl Executor for AggregateExecutor<'_> {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if self.results.is_none() {
            let results = self.materialize()?;
            self.results = Some(results);
        }
        Ok(self.results.as_mut().and_then(|iter| iter.next()))
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.child.rewind()?;
        self.results = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TupleIterator;

    fn scores_desc() -> TupleDesc {
        TupleDesc::new(vec![(FieldType::Str, "name"), (FieldType::Int, "score")])
    }

    fn scores() -> TupleIterator {
        let td = scores_desc();
        let rows = [("ada", 3), ("ada", 5), ("grace", 10)];
        let tuples = rows
            .iter()
            .map(|(name, score)| {
                Tuple::new(
                    td.clone(),
                    vec![Field::Str(name.to_string()), Field::Int(*score)],
                )
                .unwrap()
            })
            .collect();
        TupleIterator::new(td, tuples)
    }

    fn drain(mut exec: AggregateExecutor<'_>) -> Vec<(Option<Field>, i32)> {
        let mut out = Vec::new();
        while let Some(t) = exec.next().unwrap() {
            let value = match t.field(t.tuple_desc().num_fields() - 1) {
                Field::Int(v) => *v,
                other => panic!("unexpected aggregate value {other:?}"),
            };
            let group = if t.tuple_desc().num_fields() == 2 {
                Some(t.field(0).clone())
            } else {
                None
            };
            out.push((group, value));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn ungrouped_sum_folds_everything() {
        let exec =
            AggregateExecutor::new(Box::new(scores()), 1, None, AggregateOp::Sum).unwrap();
        assert_eq!(drain(exec), vec![(None, 18)]);
    }

    #[test]
    fn ungrouped_aggregates_over_no_rows_yield_zero() {
        for op in [AggregateOp::Count, AggregateOp::Sum, AggregateOp::Avg] {
            let empty = TupleIterator::new(scores_desc(), Vec::new());
            let exec = AggregateExecutor::new(Box::new(empty), 1, None, op).unwrap();
            assert_eq!(drain(exec), vec![(None, 0)], "op {op}");
        }
    }

    #[test]
    fn grouped_aggregates_track_each_group() {
        let cases = [
            (AggregateOp::Count, vec![2, 1]),
            (AggregateOp::Sum, vec![8, 10]),
            (AggregateOp::Avg, vec![4, 10]),
            (AggregateOp::Min, vec![3, 10]),
            (AggregateOp::Max, vec![5, 10]),
        ];
        for (op, expected) in cases {
            let exec = AggregateExecutor::new(Box::new(scores()), 1, Some(0), op).unwrap();
            let results = drain(exec);
            let values: Vec<i32> = results.iter().map(|(_, v)| *v).collect();
            assert_eq!(values, expected, "op {op}");
            assert_eq!(
                results[0].0,
                Some(Field::Str("ada".to_string())),
                "op {op}"
            );
        }
    }

    #[test]
    fn counting_a_string_column_is_allowed() {
        let exec =
            AggregateExecutor::new(Box::new(scores()), 0, None, AggregateOp::Count).unwrap();
        assert_eq!(drain(exec), vec![(None, 3)]);
    }

    #[test]
    fn string_columns_reject_numeric_aggregates() {
        let err = AggregateExecutor::new(Box::new(scores()), 0, None, AggregateOp::Sum)
            .unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch(_)));
    }

    #[test]
    fn rewind_recomputes_the_aggregate() {
        let mut exec =
            AggregateExecutor::new(Box::new(scores()), 1, None, AggregateOp::Max).unwrap();
        assert!(exec.next().unwrap().is_some());
        assert!(exec.next().unwrap().is_none());
        exec.rewind().unwrap();
        let t = exec.next().unwrap().unwrap();
        assert_eq!(t.field(0), &Field::Int(10));
    }
}
