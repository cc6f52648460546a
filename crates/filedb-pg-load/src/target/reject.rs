//! Per-table reject files.
//!
//! Rows that fail format validation before they are sent land in
//! `<root-dir>/<table>.dat`, one per line, with the reason on the matching
//! line of `<table>.err`. Files are created lazily so a clean run leaves no
//! empty artifacts behind.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::value::{Row, SqlValue};

/// Append-only writer pair for one table's rejected rows.
pub struct RejectLog {
    table: String,
    dat_path: PathBuf,
    err_path: PathBuf,
    dat: Option<BufWriter<File>>,
    err: Option<BufWriter<File>>,
}

impl RejectLog {
    /// Prepare a reject log rooted at `root_dir`. No files are touched yet.
    pub fn new(root_dir: &Path, table: &str) -> Self {
        Self {
            table: table.to_string(),
            dat_path: root_dir.join(format!("{}.dat", table)),
            err_path: root_dir.join(format!("{}.err", table)),
            dat: None,
            err: None,
        }
    }

    /// Record one rejected row and its reason.
    pub fn log(&mut self, row: &Row, reason: &str) -> std::io::Result<()> {
        warn!("{}: rejecting row: {}", self.table, reason);

        if self.dat.is_none() {
            if let Some(parent) = self.dat_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.dat = Some(BufWriter::new(append(&self.dat_path)?));
            self.err = Some(BufWriter::new(append(&self.err_path)?));
        }

        let dat = self.dat.as_mut().expect("dat writer opened above");
        let err = self.err.as_mut().expect("err writer opened above");

        let rendered: Vec<String> = row.iter().map(render_raw).collect();
        writeln!(dat, "{}", rendered.join("\t"))?;
        writeln!(err, "{}", reason.replace('\n', " "))?;
        dat.flush()?;
        err.flush()?;
        Ok(())
    }

    /// Paths of the reject files (whether or not they exist yet).
    pub fn paths(&self) -> (&Path, &Path) {
        (&self.dat_path, &self.err_path)
    }
}

fn append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Render a raw value for the `.dat` file, close to how it arrived.
fn render_raw(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bytes(b) => {
            let mut out = String::with_capacity(2 + b.len() * 2);
            out.push_str("\\x");
            for byte in b {
                out.push_str(&format!("{:02x}", byte));
            }
            out
        }
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
    }
}
