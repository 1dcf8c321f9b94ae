use chrono::DateTime;
use log::warn;
use serde_json::Value;

use crate::powerbi::table::{Cell, Record, Table};

/// Separator used when a list of admins collapses into one cell.
const LIST_SEPARATOR: &str = ", ";

/// Replace `.` and spaces with `_` so the name is a valid warehouse identifier.
pub fn sanitize_column_name(name: &str) -> String {
    name.replace(['.', ' '], "_")
}

/// Declarative recipe turning raw API records into one output table.
///
/// Steps run in field order: `keep_only`, `drop`, `join_lists`, `hoist`,
/// `json_text`, then column sanitation, then `datetimes` on the built table.
#[derive(Debug, Clone, Copy)]
pub struct TableShape {
    pub name: &'static str,
    /// Retain exactly these fields, in this order, filling gaps with null.
    pub keep_only: Option<&'static [&'static str]>,
    pub drop: &'static [&'static str],
    /// List fields collapsed into a `", "`-joined string.
    pub join_lists: &'static [&'static str],
    /// Object fields promoted to `<field>_<subkey>` columns, one level deep.
    pub hoist: &'static [&'static str],
    /// List fields serialized to compact JSON text.
    pub json_text: &'static [&'static str],
    /// Columns parsed as RFC 3339 timestamps; unparsable values become null.
    pub datetimes: &'static [&'static str],
}

impl TableShape {
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            keep_only: None,
            drop: &[],
            join_lists: &[],
            hoist: &[],
            json_text: &[],
            datetimes: &[],
        }
    }

    pub const fn keep_only(mut self, fields: &'static [&'static str]) -> Self {
        self.keep_only = Some(fields);
        self
    }

    pub const fn without(mut self, fields: &'static [&'static str]) -> Self {
        self.drop = fields;
        self
    }

    pub const fn join_lists(mut self, fields: &'static [&'static str]) -> Self {
        self.join_lists = fields;
        self
    }

    pub const fn hoist(mut self, fields: &'static [&'static str]) -> Self {
        self.hoist = fields;
        self
    }

    pub const fn json_text(mut self, fields: &'static [&'static str]) -> Self {
        self.json_text = fields;
        self
    }

    pub const fn datetimes(mut self, fields: &'static [&'static str]) -> Self {
        self.datetimes = fields;
        self
    }

    /// Shape a single record.
    pub fn shape_record(&self, record: Record) -> Record {
        let mut record: Record = match self.keep_only {
            Some(fields) => fields
                .iter()
                .map(|field| {
                    let value = record.get(*field).cloned().unwrap_or(Value::Null);
                    (field.to_string(), value)
                })
                .collect(),
            None => record,
        };

        for field in self.drop {
            record.shift_remove(*field);
        }
        for field in self.join_lists {
            join_list(&mut record, field);
        }
        for field in self.hoist {
            hoist_object(&mut record, field);
        }
        for field in self.json_text {
            list_to_json_text(&mut record, field);
        }

        sanitize_record(record)
    }

    /// Shape every record and build the table.
    pub fn build(&self, records: Vec<Record>) -> Table {
        let shaped: Vec<Record> = records
            .into_iter()
            .map(|record| self.shape_record(record))
            .collect();
        let mut table = Table::from_records(&shaped);
        for column in self.datetimes {
            table.map_column(&sanitize_column_name(column), parse_datetime);
        }
        table
    }
}

/// Promote the keys of an object-valued field to `<field>_<subkey>` columns.
///
/// A null field is dropped. Scalars and lists are left untouched. Nested
/// objects below the first level stay as JSON. A hoisted key that collides
/// with an existing column is dropped in favor of the existing value.
pub fn hoist_object(record: &mut Record, field: &str) {
    match record.get(field) {
        Some(Value::Object(_)) | Some(Value::Null) => {}
        _ => return,
    }
    if let Some(Value::Object(inner)) = record.shift_remove(field) {
        for (key, value) in inner {
            let column = format!("{}_{}", field, key);
            if record.contains_key(&column) {
                warn!(
                    "Hoisted column '{}' collides with an existing field; keeping the existing value",
                    column
                );
                continue;
            }
            record.insert(column, value);
        }
    }
}

fn join_list(record: &mut Record, field: &str) {
    if let Some(slot) = record.get_mut(field) {
        if let Value::Array(items) = slot {
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR);
            *slot = Value::String(joined);
        }
    }
}

fn list_to_json_text(record: &mut Record, field: &str) {
    if let Some(slot) = record.get_mut(field) {
        if slot.is_array() {
            *slot = Value::String(slot.to_string());
        }
    }
}

/// Sanitize every key. On a collision the first value wins.
fn sanitize_record(record: Record) -> Record {
    let mut sanitized = Record::new();
    for (key, value) in record {
        let column = sanitize_column_name(&key);
        if sanitized.contains_key(&column) {
            warn!("Column '{}' sanitizes to existing column '{}'; dropping it", key, column);
            continue;
        }
        sanitized.insert(column, value);
    }
    sanitized
}

fn parse_datetime(cell: &Cell) -> Cell {
    match cell {
        Cell::String(s) => DateTime::parse_from_rfc3339(s)
            .map(Cell::DateTime)
            .unwrap_or(Cell::Null),
        Cell::DateTime(_) | Cell::Null => cell.clone(),
        _ => Cell::Null,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sanitizes_dots_and_spaces() {
        assert_eq!(sanitize_column_name("Last Update.Time"), "Last_Update_Time");
        assert_eq!(sanitize_column_name("plain"), "plain");
    }

    #[test]
    fn hoists_profile_one_level() {
        let shape = TableShape::named("users").hoist(&["profile"]);
        let shaped = shape.shape_record(record(json!({
            "id": "u1",
            "profile": {"email": "a@b.com", "extra": {"deep": 1}}
        })));
        assert_eq!(shaped.get("id"), Some(&json!("u1")));
        assert_eq!(shaped.get("profile_email"), Some(&json!("a@b.com")));
        assert_eq!(shaped.get("profile_extra"), Some(&json!({"deep": 1})));
        assert!(shaped.get("profile").is_none());
    }

    #[test]
    fn hoisted_keys_are_sanitized() {
        let shape = TableShape::named("ds").hoist(&["credentialDetails"]);
        let shaped = shape.shape_record(record(json!({
            "credentialDetails": {"use End User.OAuth2": false}
        })));
        assert_eq!(
            shaped.keys().collect::<Vec<_>>(),
            ["credentialDetails_use_End_User_OAuth2"]
        );
    }

    #[test]
    fn null_hoist_target_is_dropped_and_scalars_kept() {
        let shape = TableShape::named("users").hoist(&["profile"]);
        let shaped = shape.shape_record(record(json!({"id": "u1", "profile": null})));
        assert!(shaped.get("profile").is_none());

        let shaped = shape.shape_record(record(json!({"profile": "opaque"})));
        assert_eq!(shaped.get("profile"), Some(&json!("opaque")));
    }

    #[test]
    fn colliding_names_keep_the_first_value() {
        let shape = TableShape::named("users").hoist(&["profile"]);
        let shaped = shape.shape_record(record(json!({
            "a.b": 1,
            "a_b": 2,
            "profile_email": "top",
            "profile": {"email": "nested", "name": "N"}
        })));
        assert_eq!(
            shaped.keys().collect::<Vec<_>>(),
            ["a_b", "profile_email", "profile_name"]
        );
        assert_eq!(shaped.get("a_b"), Some(&json!(1)));
        assert_eq!(shaped.get("profile_email"), Some(&json!("top")));
        assert_eq!(shaped.get("profile_name"), Some(&json!("N")));
    }

    #[test]
    fn joins_admin_lists() {
        let shape = TableShape::named("capacities").join_lists(&["admins"]);
        let shaped = shape.shape_record(record(json!({"admins": ["a@x.com", "b@x.com"]})));
        assert_eq!(shaped.get("admins"), Some(&json!("a@x.com, b@x.com")));

        let shaped = shape.shape_record(record(json!({"admins": null})));
        assert_eq!(shaped.get("admins"), Some(&Value::Null));
    }

    #[test]
    fn serializes_problem_lists_compactly() {
        let shape = TableShape::named("datasets").json_text(&["qnaQuestions"]);
        let shaped = shape.shape_record(record(json!({"qnaQuestions": [{"q": 1}, 2]})));
        assert_eq!(shaped.get("qnaQuestions"), Some(&json!(r#"[{"q":1},2]"#)));
    }

    #[test]
    fn keep_only_fills_missing_fields() {
        let shape = TableShape::named("workspaces").keep_only(&["id", "name", "capacityId"]);
        let shaped = shape.shape_record(record(json!({
            "name": "WS", "id": "w1", "users": []
        })));
        assert_eq!(shaped.keys().collect::<Vec<_>>(), ["id", "name", "capacityId"]);
        assert_eq!(shaped.get("capacityId"), Some(&Value::Null));
    }

    #[test]
    fn drop_preserves_remaining_order() {
        let shape = TableShape::named("gateways").without(&["publicKey"]);
        let shaped = shape.shape_record(record(json!({
            "id": "g", "publicKey": {"e": "AQAB"}, "name": "gw"
        })));
        assert_eq!(shaped.keys().collect::<Vec<_>>(), ["id", "name"]);
    }

    #[test]
    fn datetimes_coerce_bad_values_to_null() {
        let shape = TableShape::named("apps").datetimes(&["lastUpdateDateTime"]);
        let table = shape.build(vec![
            record(json!({"lastUpdateDateTime": "2024-01-02T03:04:05.123Z"})),
            record(json!({"lastUpdateDateTime": "yesterday"})),
        ]);
        assert!(matches!(table.get(0, "lastUpdateDateTime"), Some(Cell::DateTime(_))));
        assert_eq!(table.get(1, "lastUpdateDateTime"), Some(&Cell::Null));
    }
}
