//! Append-only audit of every run decision, plus tabular and JSON exporters.

use crate::collaborators::AuditSink;
use dripfeed_core::{ActionRecord, AuditError, Outcome};
use std::io::Write;
use std::sync::{Arc, RwLock};

pub const CSV_HEADER: &[&str] = &[
    "timestamp",
    "subreddit",
    "thread_id",
    "outcome",
    "reason",
    "error_code",
    "error",
    "dry_run",
    "text",
];

/// In-memory record list owned by the run controller.
#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    records: Vec<ActionRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ActionRecord> {
        self.records
    }
}

impl AuditSink for AuditLog {
    fn append(&mut self, record: &ActionRecord) -> Result<(), AuditError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Cloneable log that other tasks can read while a run is in progress.
/// `snapshot` always returns a consistent prefix of the run's records.
#[derive(Debug, Default, Clone)]
pub struct SharedAuditLog {
    inner: Arc<RwLock<Vec<ActionRecord>>>,
}

impl SharedAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ActionRecord> {
        match self.inner.read() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for SharedAuditLog {
    fn append(&mut self, record: &ActionRecord) -> Result<(), AuditError> {
        match self.inner.write() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}

/// Writes one CSV row per record, header first.
pub struct CsvAuditSink<W: Write + Send> {
    writer: W,
    header_written: bool,
}

impl<W: Write + Send> CsvAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_row(&mut self, fields: &[String]) -> Result<(), AuditError> {
        let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        writeln!(self.writer, "{}", row.join(","))?;
        Ok(())
    }
}

impl<W: Write + Send> AuditSink for CsvAuditSink<W> {
    fn append(&mut self, record: &ActionRecord) -> Result<(), AuditError> {
        if !self.header_written {
            let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
            self.write_row(&header)?;
            self.header_written = true;
        }
        self.write_row(&csv_fields(record))
    }

    fn flush(&mut self) -> Result<(), AuditError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesAuditSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn append(&mut self, record: &ActionRecord) -> Result<(), AuditError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AuditError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Exports a finished run's records as CSV.
pub fn write_csv<W: Write + Send>(records: &[ActionRecord], writer: W) -> Result<W, AuditError> {
    let mut sink = CsvAuditSink::new(writer);
    for record in records {
        sink.append(record)?;
    }
    sink.flush()?;
    Ok(sink.into_inner())
}

fn csv_fields(record: &ActionRecord) -> Vec<String> {
    let (reason, error_code, error) = match &record.outcome {
        Outcome::Skipped { reason } => (reason.to_string(), String::new(), String::new()),
        Outcome::Failed { code, message } => (String::new(), code.clone(), message.clone()),
        Outcome::Queued | Outcome::Posted => (String::new(), String::new(), String::new()),
    };

    vec![
        record.timestamp.to_rfc3339(),
        record.subreddit.clone(),
        record.thread_id.clone(),
        record.outcome.label().to_string(),
        reason,
        error_code,
        error,
        record.dry_run.to_string(),
        record.text.clone().unwrap_or_default(),
    ]
}

// RFC 4180: quote fields holding separators, quotes or line breaks.
fn csv_escape(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dripfeed_core::{Candidate, SkipReason};

    fn records() -> Vec<ActionRecord> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let candidate = Candidate::new("ReferralCodes", "abc123");
        vec![
            ActionRecord::skipped(at, &candidate, SkipReason::NotMegathread, false),
            ActionRecord::dispatched(
                at,
                &candidate,
                Outcome::Posted,
                "Hi, \"friends\"\n\nUse SAVE20".to_string(),
                false,
            ),
            ActionRecord::dispatched(
                at,
                &candidate,
                Outcome::Failed {
                    code: "REDDIT_THREAD_LOCKED".to_string(),
                    message: "Thread is locked: abc123".to_string(),
                },
                "text".to_string(),
                false,
            ),
        ]
    }

    #[test]
    fn test_csv_export() {
        let bytes = write_csv(&records(), Vec::new()).unwrap();
        let csv = String::from_utf8(bytes).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "timestamp,subreddit,thread_id,outcome,reason,error_code,error,dry_run,text"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-05-01T12:00:00+00:00,ReferralCodes,abc123,skipped,not_megathread,,,false,"
        );
        assert!(csv.contains("posted,,,,false,\"Hi, \"\"friends\"\"\n\nUse SAVE20\""));
        assert!(csv.contains("failed,,REDDIT_THREAD_LOCKED,Thread is locked: abc123,false,text"));
    }

    #[test]
    fn test_empty_export_has_no_header() {
        let bytes = write_csv(&[], Vec::new()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_json_lines_round_trip() {
        let mut sink = JsonLinesAuditSink::new(Vec::new());
        for record in records() {
            sink.append(&record).unwrap();
        }
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let parsed: Vec<ActionRecord> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, records());
        assert!(output.lines().next().unwrap().contains("\"outcome\":\"skipped\""));
    }

    #[test]
    fn test_shared_log_snapshot_is_prefix() {
        let log = SharedAuditLog::new();
        let mut writer = log.clone();
        let all = records();

        writer.append(&all[0]).unwrap();
        let early = log.snapshot();
        writer.append(&all[1]).unwrap();

        assert_eq!(early.len(), 1);
        assert_eq!(log.snapshot()[..1], early[..]);
        assert_eq!(log.len(), 2);
    }
}
