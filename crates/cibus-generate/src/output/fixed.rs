use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Open the flat output file, creating parent directories as needed.
pub fn create_output(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Sink that writes records and counts what reached the inner writer.
pub struct RecordWriter<W: Write> {
    inner: W,
    bytes: u64,
    records: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            records: 0,
        }
    }

    pub fn write_record(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(line)?;
        self.bytes = self.bytes.saturating_add(line.len() as u64);
        self.records += 1;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn finish(mut self) -> std::io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
