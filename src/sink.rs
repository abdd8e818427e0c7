//! Output collaborators: where flagged identifiers go once an evaluation completes.

use crate::engine::{Completion, Evaluation};
use crate::model::FlaggedIdSet;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives the single-column output of one successful evaluation.
pub trait FlaggedIdSink {
    fn write_ids(&mut self, header: &str, ids: &FlaggedIdSet) -> io::Result<()>;
}

/// Writes the header then one identifier per line, CSV-quoted where needed.
pub struct ColumnWriterSink<W: Write> {
    writer: W,
}

impl<W: Write> ColumnWriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ColumnWriterSink<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FlaggedIdSink for ColumnWriterSink<W> {
    fn write_ids(&mut self, header: &str, ids: &FlaggedIdSet) -> io::Result<()> {
        writeln!(self.writer, "{}", csv_field(header))?;
        for id in ids {
            writeln!(self.writer, "{}", csv_field(id.as_str()))?;
        }
        self.writer.flush()
    }
}

/// Keeps every written column in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub outputs: Vec<(String, Vec<String>)>,
}

impl FlaggedIdSink for MemorySink {
    fn write_ids(&mut self, header: &str, ids: &FlaggedIdSet) -> io::Result<()> {
        self.outputs.push((header.to_string(), ids.to_strings()));
        Ok(())
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Hand a flagged evaluation to the sink; returns whether anything was written.
///
/// Empty and failed evaluations write nothing.
pub fn write_evaluation(sink: &mut dyn FlaggedIdSink, evaluation: &Evaluation) -> io::Result<bool> {
    match evaluation.flagged() {
        Some(ids) => {
            sink.write_ids(&evaluation.output_header, ids)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Write `<rule>.csv` into `dir` when the evaluation flagged anything.
pub fn write_evaluation_file(dir: &Path, evaluation: &Evaluation) -> Result<Option<PathBuf>> {
    if evaluation.flagged().is_none() {
        return Ok(None);
    }
    let path = dir.join(format!("{}.csv", evaluation.rule));
    let mut sink = ColumnWriterSink::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_evaluation(&mut sink, evaluation)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(Some(path))
}

/// Human-readable account of one evaluation.
pub fn export_text_summary(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    let stats = &evaluation.stats;
    let _ = writeln!(out, "Rule: {}", evaluation.rule);
    let _ = writeln!(
        out,
        "Rows: {} ({} excluded), units scanned: {}",
        stats.rows, stats.excluded_rows, stats.units
    );
    match &evaluation.completion {
        Completion::Flagged(ids) => {
            let _ = writeln!(
                out,
                "Flagged {} identities across {} clusters",
                ids.len(),
                stats.clusters_flagged
            );
            for cluster in &evaluation.clusters {
                let members: Vec<&str> = cluster.identities.iter().map(|id| id.as_str()).collect();
                let _ = writeln!(
                    out,
                    "  {} ({} records): {}",
                    cluster.id,
                    cluster.records.len(),
                    members.join(", ")
                );
            }
        }
        Completion::Empty => {
            let _ = writeln!(out, "No groups found");
        }
        Completion::Failed(err) => {
            let _ = writeln!(out, "Processing failed: {err}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleEngine;
    use crate::model::{IdentityKey, Table, Value};
    use crate::rules::RulePreset;

    fn evaluation(rows: &[(&str, &str)]) -> Evaluation {
        let engine = RuleEngine::default();
        let rule = RulePreset::SameRecipientPhone.build(engine.config());
        let table = Table::with_rows(
            ["recipient_phone_", "buyer_id"],
            rows.iter()
                .map(|(phone, buyer)| vec![Value::text(*phone), Value::text(*buyer)])
                .collect(),
        )
        .unwrap();
        engine.evaluate(&rule, &table)
    }

    #[test]
    fn test_column_writer_quotes_fields() {
        let ids: FlaggedIdSet = [IdentityKey::new("7"), IdentityKey::new("a,\"b\"")]
            .into_iter()
            .collect();
        let mut sink = ColumnWriterSink::new(Vec::new());
        sink.write_ids("ID", &ids).unwrap();
        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "ID\n7\n\"a,\"\"b\"\"\"\n");
    }

    #[test]
    fn test_empty_evaluation_writes_nothing() {
        let mut sink = MemorySink::default();
        let empty = evaluation(&[("1", "a"), ("2", "b")]);
        assert!(!write_evaluation(&mut sink, &empty).unwrap());
        assert!(sink.outputs.is_empty());

        let flagged = evaluation(&[("1", "a"), ("1", "b"), ("1", "c")]);
        assert!(write_evaluation(&mut sink, &flagged).unwrap());
        assert_eq!(
            sink.outputs,
            vec![("ID".to_string(), vec!["a".into(), "b".into(), "c".into()])]
        );
    }

    #[test]
    fn test_evaluation_file() {
        let dir = tempfile::tempdir().unwrap();
        let flagged = evaluation(&[("1", "a"), ("1", "b"), ("1", "c")]);
        let path = write_evaluation_file(dir.path(), &flagged).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "ID\na\nb\nc\n");

        let empty = evaluation(&[("1", "a")]);
        assert!(write_evaluation_file(dir.path(), &empty).unwrap().is_none());
    }

    #[test]
    fn test_text_summary_distinguishes_outcomes() {
        let flagged = export_text_summary(&evaluation(&[("1", "a"), ("1", "b"), ("1", "c")]));
        assert!(flagged.contains("Flagged 3 identities across 1 clusters"));
        assert!(flagged.contains("C0 (3 records): a, b, c"));
        assert!(export_text_summary(&evaluation(&[("1", "a")])).contains("No groups found"));
    }
}
