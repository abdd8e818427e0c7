use ringfinder::{Evaluation, Table, Value};

/// Build a table from string cells; empty strings become nulls.
#[allow(dead_code)]
pub fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    Table::with_rows(
        columns.iter().copied(),
        rows.iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            Value::Null
                        } else {
                            Value::text(*cell)
                        }
                    })
                    .collect()
            })
            .collect(),
    )
    .expect("well-formed test table")
}

/// Flagged identifiers of an evaluation, sorted; empty for empty or failed outcomes.
#[allow(dead_code)]
pub fn flagged(evaluation: &Evaluation) -> Vec<String> {
    evaluation
        .flagged()
        .map(|ids| ids.to_strings())
        .unwrap_or_default()
}

#[allow(dead_code)]
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
