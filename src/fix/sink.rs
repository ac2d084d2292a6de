//! Destinations for count-atoms result lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// One finalized sample window.
#[derive(Clone, Debug, PartialEq)]
pub struct CountRecord {
    pub step: u64,
    /// Mean entity count per measurement.
    pub count: f64,
    pub velocity: [f64; 3],
    /// `velocity · direction`.
    pub directional: f64,
}

impl std::fmt::Display for CountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [vx, vy, vz] = self.velocity;
        write!(
            f,
            "{} {} {} {} {} {}",
            self.step, self.count, vx, vy, vz, self.directional
        )
    }
}

pub trait ResultSink {
    fn write_record(&mut self, record: &CountRecord);
}

/// Keeps records in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub records: Vec<CountRecord>,
}

impl ResultSink for MemorySink {
    fn write_record(&mut self, record: &CountRecord) {
        self.records.push(record.clone());
    }
}

/// Prints records to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink;

impl ResultSink for ConsoleSink {
    fn write_record(&mut self, record: &CountRecord) {
        println!("{record}");
    }
}

/// Appends records to a file, falling back to the console when the file
/// cannot be opened or written.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
    warned: bool,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            warned: false,
        }
    }

    fn append(&self, record: &CountRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{record}")?;
        file.flush()
    }
}

impl ResultSink for FileSink {
    fn write_record(&mut self, record: &CountRecord) {
        if let Err(e) = self.append(record) {
            if !self.warned {
                log::warn!(
                    "cannot write {}: {e}; writing results to the console",
                    self.path.display()
                );
                self.warned = true;
            }
            ConsoleSink.write_record(record);
        }
    }
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn write_record(&mut self, record: &CountRecord) {
        (**self).write_record(record);
    }
}
