//! Persistence executors.
//!
//! A [`PersistenceExecutor`] carries out planned writes against some storage.
//! The tracking engine never performs I/O itself: a record hands its
//! [`WriteOperation`] to an executor and, depending on the outcome, calls back
//! into its own `write_succeeded` / `write_failed` paths.
//!
//! [`MemoryExecutor`] keeps rows in memory, enforces optimistic lock
//! conditions the way a SQL `UPDATE ... WHERE lock_version = $n` would, and
//! records every write statement it runs so callers can count them.

use crate::error::TrackingError;
use crate::planner::WriteOperation;
use crate::value::RawValue;
use sea_query::{Alias, Expr, ExprTrait, PostgresQueryBuilder, Query, Value};
use std::cell::RefCell;
use std::collections::HashMap;

/// A row as stored: column name and storage value pairs
pub type StoredRow = Vec<(String, Value)>;

/// Storage backend for planned writes
///
/// Implementations take `&self`; executors that mutate shared state use
/// interior mutability.
pub trait PersistenceExecutor {
    /// Run a planned insert
    ///
    /// # Returns
    ///
    /// The generated primary key, if storage assigned one.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Persistence` if the write fails.
    fn insert(&self, operation: &WriteOperation) -> Result<Option<RawValue>, TrackingError>;

    /// Run a planned update, enforcing its lock condition
    ///
    /// # Returns
    ///
    /// Number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `StaleRecord` when the lock condition does not hold,
    /// `RecordNotFound` when no row has the key, or `Persistence`.
    fn update(&self, operation: &WriteOperation) -> Result<u64, TrackingError>;

    /// Read one row by key
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Persistence` if the read fails.
    fn fetch(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<StoredRow>, TrackingError>;

    /// Write columns directly, outside of any change tracking
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` when no row has the key, or `Persistence`.
    fn update_columns(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        columns: &[(String, Value)],
    ) -> Result<u64, TrackingError>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<StoredRow>,
    defaults: Vec<(String, Value)>,
    next_id: i64,
}

impl MemoryTable {
    fn find_mut(&mut self, key_column: &str, key: &Value) -> Option<&mut StoredRow> {
        self.rows
            .iter_mut()
            .find(|row| column_value(row, key_column) == Some(key))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    statements: Vec<String>,
    fail_next: Option<String>,
}

impl MemoryState {
    fn take_failure(&mut self) -> Result<(), TrackingError> {
        match self.fail_next.take() {
            Some(msg) => Err(TrackingError::Persistence(msg)),
            None => Ok(()),
        }
    }
}

/// In-memory executor
///
/// Primary keys missing from an insert are generated from a per-table
/// counter; columns missing from an insert receive the table's configured
/// defaults, like database column defaults would.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    state: RefCell<MemoryState>,
}

impl MemoryExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Column default applied to inserts that leave `column` out
    #[must_use]
    pub fn with_column_default(self, table: &str, column: &str, value: impl Into<Value>) -> Self {
        self.state
            .borrow_mut()
            .tables
            .entry(table.to_string())
            .or_default()
            .defaults
            .push((column.to_string(), value.into()));
        self
    }

    /// Make the next insert or update fail with `TrackingError::Persistence`
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_next = Some(message.into());
    }

    /// Rendered SQL of every write statement executed so far
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.borrow().statements.clone()
    }

    /// Number of write statements executed so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.borrow().statements.len()
    }

    /// Change a stored column behind every record's back (a concurrent writer)
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` when no row has the key.
    pub fn overwrite(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.borrow_mut();
        let row = state
            .tables
            .get_mut(table)
            .and_then(|t| t.find_mut(key_column, key))
            .ok_or(TrackingError::RecordNotFound)?;
        set_column(row, column, value.into());
        Ok(())
    }
}

impl PersistenceExecutor for MemoryExecutor {
    fn insert(&self, operation: &WriteOperation) -> Result<Option<RawValue>, TrackingError> {
        let sql = operation.insert_statement()?.build(PostgresQueryBuilder).0;
        let mut state = self.state.borrow_mut();
        state.take_failure()?;

        let table = state.tables.entry(operation.table.clone()).or_default();
        let mut row: StoredRow = operation.columns.clone();
        for (column, value) in &table.defaults {
            if column_value(&row, column).is_none() {
                row.push((column.clone(), value.clone()));
            }
        }

        let mut generated = None;
        if let Some(pk) = &operation.primary_key {
            match column_value(&row, pk).and_then(as_i64) {
                Some(id) => table.next_id = Ord::max(table.next_id, id),
                None if column_value(&row, pk).map_or(true, is_null) => {
                    table.next_id += 1;
                    set_column(&mut row, pk, Value::BigInt(Some(table.next_id)));
                    generated = Some(RawValue::Int(table.next_id));
                }
                None => {}
            }
        }
        table.rows.push(row);

        log::debug!("{}", sql);
        state.statements.push(sql);
        Ok(generated)
    }

    fn update(&self, operation: &WriteOperation) -> Result<u64, TrackingError> {
        let sql = operation.update_statement()?.build(PostgresQueryBuilder).0;
        let (pk, key) = match (&operation.primary_key, &operation.key) {
            (Some(pk), Some(key)) => (pk, key),
            _ => return Err(TrackingError::PrimaryKeyRequired),
        };
        let mut state = self.state.borrow_mut();
        state.take_failure()?;

        let row = state
            .tables
            .get_mut(&operation.table)
            .and_then(|t| t.find_mut(pk, key))
            .ok_or(TrackingError::RecordNotFound)?;
        if let Some(lock) = &operation.lock {
            let stored = column_value(row, &lock.column).and_then(as_i64).unwrap_or(0);
            if stored != lock.expected {
                log::warn!(
                    "stale {} row: expected {} = {}, found {}",
                    operation.table,
                    lock.column,
                    lock.expected,
                    stored
                );
                return Err(TrackingError::StaleRecord {
                    table: operation.table.clone(),
                    lock_version: lock.expected,
                });
            }
        }
        for (column, value) in &operation.columns {
            set_column(row, column, value.clone());
        }

        log::debug!("{}", sql);
        state.statements.push(sql);
        Ok(1)
    }

    fn fetch(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<StoredRow>, TrackingError> {
        let state = self.state.borrow();
        Ok(state.tables.get(table).and_then(|t| {
            t.rows
                .iter()
                .find(|row| column_value(row, key_column) == Some(key))
                .cloned()
        }))
    }

    fn update_columns(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        columns: &[(String, Value)],
    ) -> Result<u64, TrackingError> {
        let mut query = Query::update();
        query.table(Alias::new(table));
        for (name, value) in columns {
            query.value(Alias::new(name.as_str()), Expr::val(value.clone()));
        }
        query.and_where(Expr::col(Alias::new(key_column)).eq(key.clone()));
        let sql = query.build(PostgresQueryBuilder).0;

        let mut state = self.state.borrow_mut();
        state.take_failure()?;
        let row = state
            .tables
            .get_mut(table)
            .and_then(|t| t.find_mut(key_column, key))
            .ok_or(TrackingError::RecordNotFound)?;
        for (name, value) in columns {
            set_column(row, name, value.clone());
        }

        log::debug!("{}", sql);
        state.statements.push(sql);
        Ok(1)
    }
}

fn column_value<'r>(row: &'r [(String, Value)], column: &str) -> Option<&'r Value> {
    row.iter().find(|(n, _)| n == column).map(|(_, v)| v)
}

fn set_column(row: &mut StoredRow, column: &str, value: Value) {
    match row.iter_mut().find(|(n, _)| n == column) {
        Some((_, v)) => *v = value,
        None => row.push((column.to_string(), value)),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(v)) => Some(i64::from(*v)),
        Value::SmallInt(Some(v)) => Some(i64::from(*v)),
        Value::Int(Some(v)) => Some(i64::from(*v)),
        Value::BigInt(Some(v)) => Some(*v),
        _ => None,
    }
}

fn is_null(value: &Value) -> bool {
    matches!(RawValue::try_from(value.clone()), Ok(RawValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::LockCondition;

    fn insert_op(columns: Vec<(String, Value)>) -> WriteOperation {
        let mut op = WriteOperation::new("pirates", Some("id".to_string()));
        op.columns = columns;
        op
    }

    #[test]
    fn test_insert_generates_keys_and_applies_defaults() {
        let executor = MemoryExecutor::new().with_column_default("pirates", "parrot_id", 9i64);
        let generated = executor
            .insert(&insert_op(vec![("catchphrase".to_string(), Value::from("Yar"))]))
            .unwrap();
        assert_eq!(generated, Some(RawValue::Int(1)));

        let row = executor
            .fetch("pirates", "id", &Value::BigInt(Some(1)))
            .unwrap()
            .unwrap();
        assert_eq!(column_value(&row, "parrot_id"), Some(&Value::BigInt(Some(9))));
        assert_eq!(executor.write_count(), 1);
        assert!(executor.statements()[0].starts_with("INSERT INTO \"pirates\""));
    }

    #[test]
    fn test_explicit_key_advances_sequence() {
        let executor = MemoryExecutor::new();
        let explicit = executor
            .insert(&insert_op(vec![("id".to_string(), Value::BigInt(Some(7)))]))
            .unwrap();
        assert_eq!(explicit, None);
        let generated = executor.insert(&insert_op(Vec::new())).unwrap();
        assert_eq!(generated, Some(RawValue::Int(8)));
    }

    #[test]
    fn test_update_enforces_lock_condition() {
        let executor = MemoryExecutor::new();
        executor
            .insert(&insert_op(vec![("lock_version".to_string(), Value::BigInt(Some(0)))]))
            .unwrap();
        let mut op = insert_op(vec![("lock_version".to_string(), Value::BigInt(Some(1)))]);
        op.key = Some(Value::BigInt(Some(1)));
        op.lock = Some(LockCondition {
            column: "lock_version".to_string(),
            expected: 0,
        });
        assert_eq!(executor.update(&op).unwrap(), 1);
        assert_eq!(
            executor.update(&op).unwrap_err(),
            TrackingError::StaleRecord {
                table: "pirates".to_string(),
                lock_version: 0
            }
        );
        assert_eq!(executor.write_count(), 2);
    }

    #[test]
    fn test_missing_row_and_injected_failure() {
        let executor = MemoryExecutor::new();
        let mut op = insert_op(Vec::new());
        op.key = Some(Value::BigInt(Some(42)));
        assert_eq!(executor.update(&op).unwrap_err(), TrackingError::RecordNotFound);

        executor.fail_next_write("connection reset");
        assert_eq!(
            executor.insert(&insert_op(Vec::new())).unwrap_err(),
            TrackingError::Persistence("connection reset".to_string())
        );
        assert!(executor.insert(&insert_op(Vec::new())).is_ok());
    }
}
