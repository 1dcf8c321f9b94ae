use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

/// Raw API record keyed by field name, in server order.
pub type Record = Map<String, Value>;

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Signed 64-bit integer.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Boolean value.
    Boolean(bool),
    /// Timestamp carrying its original offset.
    DateTime(DateTime<FixedOffset>),
    /// Timestamp normalized to UTC with the offset dropped.
    NaiveDateTime(NaiveDateTime),
    /// Array or object left nested.
    Json(Value),
    /// Null or absent value.
    Null,
}

impl Cell {
    /// Convert a JSON value into a cell.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else if let Some(u) = n.as_u64() {
                    match i64::try_from(u) {
                        Ok(i) => Cell::Int(i),
                        Err(_) => Cell::Float(u as f64),
                    }
                } else {
                    n.as_f64().map(Cell::Float).unwrap_or(Cell::Null)
                }
            }
            Value::String(s) => Cell::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Cell::Json(value.clone()),
        }
    }
}

/// Column-ordered table of cells. Every row has one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create a table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records. Columns appear in first-seen order and
    /// fields a record lacks become `Null`.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = vec![];
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in records {
            for key in record.keys() {
                if !index.contains_key(key.as_str()) {
                    index.insert(key.as_str(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut row = vec![Cell::Null; columns.len()];
                for (key, value) in record {
                    if let Some(&i) = index.get(key.as_str()) {
                        row[i] = Cell::from_json(value);
                    }
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Cell at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let i = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(i))
    }

    /// Rewrite every cell of the named column in place. Missing columns are ignored.
    pub(crate) fn map_column(&mut self, column: &str, f: impl Fn(&Cell) -> Cell) {
        let Some(i) = self.column_index(column) else {
            return;
        };
        for row in &mut self.rows {
            row[i] = f(&row[i]);
        }
    }
}

/// The named tables produced by one extraction run, in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    tables: Vec<(String, Table)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table, keeping its original position on replace.
    pub fn insert(&mut self, name: &str, table: Table) {
        match self.tables.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = table,
            None => self.tables.push((name.to_string(), table)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, table)| table)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
