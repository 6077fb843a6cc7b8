use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::Result;

/// Where a record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One optimization step.
    Opt,
    /// One pass over the validation set.
    Eval,
}

/// A flat set of named scalars, tagged with its mode and epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub mode: Mode,
    pub epoch: usize,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl MetricsRecord {
    /// Creates a new record.
    ///
    /// # Arguments
    /// * `mode` - Where the record comes from.
    /// * `epoch` - The epoch it belongs to.
    /// * `values` - The named scalars.
    pub fn new(mode: Mode, epoch: usize, values: BTreeMap<String, f64>) -> Self {
        Self {
            mode,
            epoch,
            values,
        }
    }

    /// Returns the value named `key`.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// A sink for metrics records.
pub trait MetricsLogger {
    fn log(&mut self, record: &MetricsRecord) -> Result<()>;
}

impl<T: MetricsLogger + ?Sized> MetricsLogger for &mut T {
    fn log(&mut self, record: &MetricsRecord) -> Result<()> {
        (**self).log(record)
    }
}

impl MetricsLogger for Vec<MetricsRecord> {
    fn log(&mut self, record: &MetricsRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes every record as one JSON object per line.
pub struct JsonLinesLogger<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesLogger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesLogger<BufWriter<File>> {
    /// Creates a logger that appends to `<directory>/<tag>_train.txt`.
    ///
    /// # Arguments
    /// * `directory` - The output directory, created if missing.
    /// * `tag` - The run's name.
    ///
    /// # Returns
    /// The logger or an error if the file can't be opened.
    pub fn to_file(directory: impl AsRef<Path>, tag: &str) -> Result<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let file = File::options()
            .create(true)
            .append(true)
            .open(directory.join(format!("{tag}_train.txt")))?;

        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> MetricsLogger for JsonLinesLogger<W> {
    fn log(&mut self, record: &MetricsRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
