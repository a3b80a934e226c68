use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// One logged value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f32,
    pub step: usize,
}

/// A sink for `(tag, value, step)` scalars.
pub trait ScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends every scalar as a JSON line to `<dir>/scalars.jsonl`.
pub struct JsonlScalarWriter {
    out: BufWriter<File>,
}

impl JsonlScalarWriter {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    /// Opens, or creates, the scalar file inside `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = File::options()
            .create(true)
            .append(true)
            .open(dir.join(Self::FILE_NAME))?;

        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl ScalarWriter for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        };

        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for JsonlScalarWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

/// Keeps every scalar in memory.
#[derive(Debug, Default)]
pub struct MemoryScalarWriter {
    pub records: Vec<ScalarRecord>,
}

impl MemoryScalarWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The steps `tag` was logged at, in logging order.
    pub fn steps(&self, tag: &str) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.step)
            .collect()
    }
}

impl ScalarWriter for MemoryScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        self.records.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
        Ok(())
    }
}
