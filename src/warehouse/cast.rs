use crate::powerbi::table::{Cell, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    String,
    Boolean,
    DateTime,
    Json,
}

fn kind_of(cell: &Cell) -> Option<Kind> {
    match cell {
        Cell::Int(_) => Some(Kind::Int),
        Cell::Float(_) => Some(Kind::Float),
        Cell::String(_) => Some(Kind::String),
        Cell::Boolean(_) => Some(Kind::Boolean),
        Cell::DateTime(_) | Cell::NaiveDateTime(_) => Some(Kind::DateTime),
        Cell::Json(_) => Some(Kind::Json),
        Cell::Null => None,
    }
}

/// Give every column a single primitive type.
///
/// - timestamps become timezone-naive UTC
/// - integer and float mixes become float
/// - nested JSON or otherwise mixed columns become text, compact JSON for
///   arrays and objects
///
/// Nulls are preserved, so booleans stay nullable.
pub fn cast_for_warehouse(table: &Table) -> Table {
    let columns = table.columns().to_vec();
    let mut rows = table.rows().to_vec();

    for i in 0..columns.len() {
        let mut kinds: Vec<Kind> = vec![];
        for row in &rows {
            if let Some(kind) = kind_of(&row[i]) {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }

        let convert: fn(&Cell) -> Cell = match kinds.as_slice() {
            [Kind::DateTime] => to_naive,
            [Kind::Int, Kind::Float] | [Kind::Float, Kind::Int] => to_float,
            [] | [Kind::Int] | [Kind::Float] | [Kind::String] | [Kind::Boolean] => continue,
            _ => to_text,
        };
        for row in &mut rows {
            row[i] = convert(&row[i]);
        }
    }

    Table::from_parts(columns, rows)
}

fn to_naive(cell: &Cell) -> Cell {
    match cell {
        Cell::DateTime(dt) => Cell::NaiveDateTime(dt.naive_utc()),
        other => other.clone(),
    }
}

fn to_float(cell: &Cell) -> Cell {
    match cell {
        Cell::Int(i) => Cell::Float(*i as f64),
        other => other.clone(),
    }
}

fn to_text(cell: &Cell) -> Cell {
    match cell {
        Cell::Null => Cell::Null,
        Cell::String(s) => Cell::String(s.clone()),
        Cell::Int(i) => Cell::String(i.to_string()),
        Cell::Float(f) => Cell::String(f.to_string()),
        Cell::Boolean(b) => Cell::String(b.to_string()),
        Cell::DateTime(dt) => Cell::String(dt.naive_utc().to_string()),
        Cell::NaiveDateTime(dt) => Cell::String(dt.to_string()),
        Cell::Json(value) => Cell::String(value.to_string()),
    }
}
