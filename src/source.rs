//! Loading order tables from JSON.
//!
//! Accepts either a JSON array of objects or JSON Lines (one object per line). Columns are
//! the union of all object keys in first-seen order; a key absent from a row reads as null.

use crate::model::{Table, Value};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::path::Path;

pub fn load_json_table(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_json_table(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_json_table(text: &str) -> Result<Table> {
    let objects = if text.trim_start().starts_with('[') {
        array_objects(text)?
    } else {
        line_objects(text)?
    };

    let mut columns: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns.iter().cloned())?;
    for mut object in objects {
        let row = columns
            .iter()
            .map(|column| object.remove(column).map(Value::from).unwrap_or_default())
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}

fn array_objects(text: &str) -> Result<Vec<Map<String, JsonValue>>> {
    let rows: Vec<JsonValue> = serde_json::from_str(text).context("invalid JSON array")?;
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| into_object(row, idx + 1))
        .collect()
}

fn line_objects(text: &str) -> Result<Vec<Map<String, JsonValue>>> {
    let mut objects = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: JsonValue =
            serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        objects.push(into_object(row, idx + 1)?);
    }
    Ok(objects)
}

fn into_object(row: JsonValue, position: usize) -> Result<Map<String, JsonValue>> {
    match row {
        JsonValue::Object(object) => Ok(object),
        other => bail!("record {position} is not an object: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordId;
    use std::io::Write;

    #[test]
    fn test_array_with_sparse_keys() {
        let table = parse_json_table(
            r#"[
                {"buyer_id": 1, "recipient_phone_": "0900000001"},
                {"buyer_id": 2, "create_time": "2024-01-01 10:00:00"}
            ]"#,
        )
        .unwrap();
        assert_eq!(table.columns(), ["buyer_id", "recipient_phone_", "create_time"]);
        let record = table.record(RecordId(1)).unwrap();
        assert_eq!(record.get("recipient_phone_"), Some(&Value::Null));
        assert_eq!(record.get("buyer_id"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_json_lines() {
        let table = parse_json_table("{\"a\": \"x\"}\n\n{\"a\": null, \"b\": true}\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(
            table.record(RecordId(1)).unwrap().get("b"),
            Some(&Value::text("true"))
        );
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(parse_json_table("[1, 2]").is_err());
        assert!(parse_json_table("{\"a\": 1}\nnot json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[{{\"buyer_id\": \"7\"}}]").unwrap();
        let table = load_json_table(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(load_json_table(Path::new("/nonexistent/orders.json")).is_err());
    }
}
