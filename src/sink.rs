//! Destinations for generation records
//!
//! Records are append-only. The in-memory sink is bounded and evicts the
//! oldest entry when full; the CSV sink appends every record to disk.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::error::SinkError;
use crate::types::GenerationRecord;

pub const DEFAULT_CAPACITY: usize = 100_000;

/// Append-only record destination
pub trait RecordSink: Send {
    fn append(&mut self, record: GenerationRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Bounded in-memory buffer
#[derive(Debug, Clone)]
pub struct MemorySink {
    records: VecDeque<GenerationRecord>,
    capacity: usize,
    evicted: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped to stay within capacity
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn records(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records.iter()
    }

    pub fn drain(&mut self) -> Vec<GenerationRecord> {
        self.records.drain(..).collect()
    }

    /// Write all buffered records to a CSV file with a header
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!("Exported {} records to {}", self.records.len(), path.display());
        Ok(path.to_path_buf())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: GenerationRecord) -> Result<(), SinkError> {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
            self.evicted += 1;
            if self.evicted == 1 || self.evicted % 1_000 == 0 {
                warn!(
                    "Record buffer full ({}), evicted {} oldest record(s)",
                    self.capacity, self.evicted
                );
            }
        }
        self.records.push_back(record);
        Ok(())
    }
}

/// Append-only CSV log
pub struct CsvSink {
    writer: csv::Writer<std::fs::File>,
    path: PathBuf,
    written: usize,
}

impl CsvSink {
    /// Open `path` for appending; the header is written only to a new file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let has_content = std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!has_content)
            .from_writer(file);

        Ok(Self {
            writer,
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: GenerationRecord) -> Result<(), SinkError> {
        self.writer.serialize(&record)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink shared between owners, e.g. a generator and the code exporting it
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedSink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Run `f` against the locked sink
    pub fn with<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, SinkError> {
        let mut guard = self.inner.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RecordSink> RecordSink for SharedSink<S> {
    fn append(&mut self, record: GenerationRecord) -> Result<(), SinkError> {
        self.with(|sink| sink.append(record))?
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.with(|sink| sink.flush())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartKind;
    use crate::frequency::Frequency;
    use crate::types::Ticker;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn record(n: u32) -> GenerationRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        GenerationRecord {
            image_id: Uuid::new_v4(),
            ticker: Ticker::new(format!("T{}", n)),
            chart_kind: ChartKind::Line,
            frequency: Frequency::Day1,
            window_start: start,
            window_end: start + chrono::Duration::days(n as i64),
        }
    }

    #[test]
    fn test_memory_sink_evicts_oldest() {
        let mut sink = MemorySink::new(2);
        for n in 0..3 {
            sink.append(record(n)).unwrap();
        }

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        let tickers: Vec<_> = sink.records().map(|r| r.ticker.to_string()).collect();
        assert_eq!(tickers, vec!["T1", "T2"]);
    }

    #[test]
    fn test_memory_sink_export() {
        let mut sink = MemorySink::default();
        sink.append(record(1)).unwrap();
        sink.append(record(2)).unwrap();

        let path = std::env::temp_dir().join(format!("chart-synth-{}.csv", Uuid::new_v4()));
        sink.export_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<GenerationRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows, sink.records().cloned().collect::<Vec<_>>());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_csv_sink_appends_with_single_header() {
        let path = std::env::temp_dir().join(format!("chart-synth-{}.csv", Uuid::new_v4()));

        let mut first = CsvSink::open(&path).unwrap();
        first.append(record(1)).unwrap();
        drop(first);

        let mut second = CsvSink::open(&path).unwrap();
        second.append(record(2)).unwrap();
        assert_eq!(second.written(), 1);
        drop(second);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert_eq!(contents.matches("image_id").count(), 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_shared_sink() {
        let shared = SharedSink::new(MemorySink::new(10));
        let mut writer = shared.clone();
        writer.append(record(1)).unwrap();

        assert_eq!(shared.with(|s| s.len()).unwrap(), 1);
    }
}
