//! DBF (dBase III/IV) file reader.
//!
//! The format is a fixed header followed by fixed-width records:
//!
//! ```text
//! offset  size  field
//! 0       1     version byte
//! 1       3     last update (YY MM DD)
//! 4       4     record count (u32 LE)
//! 8       2     header length (u16 LE)
//! 10      2     record length (u16 LE)
//! 32      32*n  field descriptors, terminated by 0x0D
//! ```
//!
//! Each field descriptor carries an 11-byte NUL-padded name, a one-character
//! type, a one-byte width and a one-byte decimal count. Records are one
//! deletion-flag byte (0x20 live, 0x2A deleted) followed by the fields at
//! their declared widths; text is right-padded with spaces.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Encoding;
use crate::core::schema::{Column, Table, TypeTag};
use crate::core::value::{Row, SqlValue};
use crate::error::{LoadError, Result};
use crate::pipeline::queue::RowSender;
use crate::source::StreamOutcome;

const HEADER_SIZE: usize = 32;
const DESCRIPTOR_SIZE: usize = 32;
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;
const FLAG_LIVE: u8 = b' ';
const FLAG_DELETED: u8 = b'*';

/// One field descriptor from the DBF header.
#[derive(Debug, Clone)]
pub struct DbfField {
    pub name: String,
    pub tag: char,
    pub length: u8,
    pub decimals: u8,
}

/// An open DBF file, header parsed, positioned at the first record.
#[derive(Debug)]
pub struct DbfFile {
    path: PathBuf,
    reader: BufReader<File>,
    encoding: Encoding,
    record_count: u32,
    record_len: u16,
    fields: Vec<DbfField>,
}

impl DbfFile {
    /// Open a DBF file and parse its header.
    pub fn open(path: &Path, encoding: Encoding) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let short = |_| LoadError::source_format(path, "file too short for DBF header");

        let version = reader.read_u8().map_err(short)?;
        let mut update = [0u8; 3];
        reader.read_exact(&mut update).map_err(short)?;
        let (yy, mm, dd) = (update[0], update[1], update[2]);
        let record_count = reader.read_u32::<LittleEndian>().map_err(short)?;
        let header_len = reader.read_u16::<LittleEndian>().map_err(short)?;
        let record_len = reader.read_u16::<LittleEndian>().map_err(short)?;
        let mut reserved = [0u8; HEADER_SIZE - 12];
        reader.read_exact(&mut reserved).map_err(short)?;

        if (header_len as usize) < HEADER_SIZE + 1 {
            return Err(LoadError::source_format(
                path,
                format!("implausible header length {}", header_len),
            ));
        }

        debug!(
            "{}: dbf version 0x{:02x}, last update {:02}-{:02}-{:02}, {} records",
            path.display(),
            version,
            yy,
            mm,
            dd,
            record_count
        );

        let fields = read_field_descriptors(&mut reader, path, header_len)?;
        if fields.is_empty() {
            return Err(LoadError::source_format(path, "no field descriptors"));
        }

        let expected_len = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();
        if expected_len != record_len as usize {
            return Err(LoadError::source_format(
                path,
                format!(
                    "record length {} does not match field widths (expected {})",
                    record_len, expected_len
                ),
            ));
        }

        // Skip any vendor bytes between the descriptor terminator and the
        // first record.
        reader.seek(SeekFrom::Start(header_len as u64))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            encoding,
            record_count,
            record_len,
            fields,
        })
    }

    /// Declared record count from the header.
    pub fn record_count(&self) -> u64 {
        self.record_count as u64
    }

    /// Schema for this file: one table named after the file stem.
    pub fn table(&self) -> Table {
        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dbf".to_string());

        let columns = self
            .fields
            .iter()
            .map(|f| Column {
                name: f.name.clone(),
                tag: TypeTag::Dbf(f.tag),
                length: f.length as u16,
                decimals: f.decimals,
                not_null: false,
            })
            .collect();

        Table {
            name,
            columns,
            indexes: Vec::new(),
            row_count: Some(self.record_count as u64),
        }
    }

    /// Stream exactly `record_count` rows into the queue.
    ///
    /// Runs on a blocking thread and owns the file handle until it returns.
    /// A short read is a format error; cancellation and a departed consumer
    /// both end the stream early with the rows emitted so far.
    pub fn stream_rows(mut self, tx: &RowSender, cancel: &CancellationToken) -> StreamOutcome {
        let mut emitted = 0u64;
        let mut buf = vec![0u8; self.record_len as usize];

        for record in 0..self.record_count {
            if cancel.is_cancelled() {
                debug!("{}: cancelled after {} rows", self.path.display(), emitted);
                break;
            }

            if let Err(e) = self.reader.read_exact(&mut buf) {
                return StreamOutcome {
                    rows: emitted,
                    error: Some(LoadError::source_format(
                        &self.path,
                        format!(
                            "truncated record {} of {}: {}",
                            record + 1,
                            self.record_count,
                            e
                        ),
                    )),
                };
            }

            let flag = buf[0];
            if flag != FLAG_LIVE && flag != FLAG_DELETED {
                return StreamOutcome {
                    rows: emitted,
                    error: Some(LoadError::source_format(
                        &self.path,
                        format!("bad deletion flag 0x{:02x} in record {}", flag, record + 1),
                    )),
                };
            }
            if flag == FLAG_DELETED {
                warn!(
                    "{}: record {} carries the deleted flag; loading it anyway",
                    self.path.display(),
                    record + 1
                );
            }

            let row = self.decode_record(&buf[1..]);
            if tx.blocking_send(row).is_err() {
                // Sink is gone; it reports its own error.
                break;
            }
            emitted += 1;
        }

        StreamOutcome {
            rows: emitted,
            error: None,
        }
    }

    fn decode_record(&self, body: &[u8]) -> Row {
        let mut row = Vec::with_capacity(self.fields.len());
        let mut offset = 0usize;
        for field in &self.fields {
            let end = offset + field.length as usize;
            row.push(SqlValue::Text(decode_text(&body[offset..end], self.encoding)));
            offset = end;
        }
        row
    }
}

fn read_field_descriptors(
    reader: &mut BufReader<File>,
    path: &Path,
    header_len: u16,
) -> Result<Vec<DbfField>> {
    let max_fields = (header_len as usize - HEADER_SIZE - 1) / DESCRIPTOR_SIZE;
    let mut fields = Vec::new();

    loop {
        let mut first = [0u8; 1];
        reader
            .read_exact(&mut first)
            .map_err(|_| LoadError::source_format(path, "header ends inside field descriptors"))?;
        if first[0] == DESCRIPTOR_TERMINATOR {
            return Ok(fields);
        }
        if fields.len() >= max_fields {
            return Err(LoadError::source_format(
                path,
                "field descriptors overrun the declared header length",
            ));
        }

        let mut rest = [0u8; DESCRIPTOR_SIZE - 1];
        reader
            .read_exact(&mut rest)
            .map_err(|_| LoadError::source_format(path, "truncated field descriptor"))?;

        let mut name_bytes = vec![first[0]];
        name_bytes.extend_from_slice(&rest[..10]);
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let tag = rest[10] as char;
        let length = rest[15];
        let decimals = rest[16];

        if name.is_empty() {
            return Err(LoadError::source_format(path, "field with empty name"));
        }

        fields.push(DbfField {
            name,
            tag,
            length,
            decimals,
        });
    }
}

fn decode_text(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::queue;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a minimal dBase III file in memory.
    pub(crate) fn build_dbf(fields: &[(&str, char, u8, u8)], records: &[&[&str]]) -> Vec<u8> {
        let record_len: usize = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();
        let header_len = HEADER_SIZE + fields.len() * DESCRIPTOR_SIZE + 1;

        let mut out = Vec::new();
        out.push(0x03u8); // dBase III, no memo
        out.extend_from_slice(&[24, 1, 15]); // last update
        out.extend_from_slice(&(records.len() as u32).to_le_bytes());
        out.extend_from_slice(&(header_len as u16).to_le_bytes());
        out.extend_from_slice(&(record_len as u16).to_le_bytes());
        out.resize(HEADER_SIZE, 0);

        for (name, tag, length, decimals) in fields {
            let mut descriptor = [0u8; DESCRIPTOR_SIZE];
            descriptor[..name.len()].copy_from_slice(name.as_bytes());
            descriptor[11] = *tag as u8;
            descriptor[16] = *length;
            descriptor[17] = *decimals;
            out.extend_from_slice(&descriptor);
        }
        out.push(DESCRIPTOR_TERMINATOR);

        for record in records {
            out.push(FLAG_LIVE);
            for ((_, _, length, _), value) in fields.iter().zip(record.iter()) {
                let mut bytes = value.as_bytes().to_vec();
                bytes.resize(*length as usize, b' ');
                out.extend_from_slice(&bytes);
            }
        }
        out
    }

    pub(crate) fn write_dbf(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    fn people_fields() -> Vec<(&'static str, char, u8, u8)> {
        vec![("NAME", 'C', 10, 0), ("AGE", 'N', 3, 0), ("ACTIVE", 'L', 1, 0)]
    }

    #[test]
    fn test_open_parses_header() {
        let dir = TempDir::new().unwrap();
        let bytes = build_dbf(
            &people_fields(),
            &[&["Alice", "42", "Y"], &["Bob", "37", "N"]],
        );
        let path = write_dbf(&dir, "people.dbf", &bytes);

        let dbf = DbfFile::open(&path, Encoding::Utf8).unwrap();
        assert_eq!(dbf.record_count(), 2);
        let table = dbf.table();
        assert_eq!(table.name, "people");
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[0].name, "NAME");
        assert_eq!(table.columns[0].tag, TypeTag::Dbf('C'));
        assert_eq!(table.columns[1].length, 3);
        assert_eq!(table.row_count, Some(2));
    }

    #[test]
    fn test_open_rejects_truncated_header() {
        let dir = TempDir::new().unwrap();
        let path = write_dbf(&dir, "short.dbf", &[0x03, 0x00, 0x01]);
        let err = DbfFile::open(&path, Encoding::Utf8).unwrap_err();
        assert!(matches!(err, LoadError::SourceFormat { .. }));
    }

    #[test]
    fn test_open_rejects_record_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut bytes = build_dbf(&people_fields(), &[]);
        // Corrupt the declared record length.
        bytes[10] = 99;
        bytes[11] = 0;
        let path = write_dbf(&dir, "bad.dbf", &bytes);
        let err = DbfFile::open(&path, Encoding::Utf8).unwrap_err();
        assert!(matches!(err, LoadError::SourceFormat { .. }));
    }

    #[tokio::test]
    async fn test_stream_rows_produces_declared_count() {
        let dir = TempDir::new().unwrap();
        let bytes = build_dbf(
            &people_fields(),
            &[
                &["Alice", "42", "Y"],
                &["Bob", "37", "N"],
                &["?", "0", "?"],
            ],
        );
        let path = write_dbf(&dir, "people.dbf", &bytes);

        let (tx, mut rx) = queue::bounded(8);
        let cancel = CancellationToken::new();
        let reader = tokio::task::spawn_blocking(move || {
            let dbf = DbfFile::open(&path, Encoding::Utf8).unwrap();
            dbf.stream_rows(&tx, &cancel)
        });

        let mut rows = Vec::new();
        while let Some(row) = rx.recv().await {
            rows.push(row);
        }
        let outcome = reader.await.unwrap();

        assert_eq!(outcome.rows, 3);
        assert!(outcome.error.is_none());
        assert_eq!(rows.len(), 3);
        // Values arrive raw; trimming is the transforms' job.
        assert_eq!(rows[0][0], SqlValue::Text("Alice     ".into()));
        assert_eq!(rows[0][1], SqlValue::Text("42 ".into()));
        assert_eq!(rows[2][2], SqlValue::Text("?".into()));
    }

    #[tokio::test]
    async fn test_stream_rows_reports_truncated_body() {
        let dir = TempDir::new().unwrap();
        let mut bytes = build_dbf(&people_fields(), &[&["Alice", "42", "Y"]]);
        // Claim a second record that is not there.
        bytes[4] = 2;
        let path = write_dbf(&dir, "people.dbf", &bytes);

        let (tx, mut rx) = queue::bounded(8);
        let cancel = CancellationToken::new();
        let reader = tokio::task::spawn_blocking(move || {
            let dbf = DbfFile::open(&path, Encoding::Utf8).unwrap();
            dbf.stream_rows(&tx, &cancel)
        });

        let mut rows = 0;
        while rx.recv().await.is_some() {
            rows += 1;
        }
        let outcome = reader.await.unwrap();

        assert_eq!(rows, 1);
        assert_eq!(outcome.rows, 1);
        assert!(matches!(outcome.error, Some(LoadError::SourceFormat { .. })));
    }

    #[tokio::test]
    async fn test_stream_rows_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let bytes = build_dbf(&people_fields(), &[&["Alice", "42", "Y"], &["Bob", "37", "N"]]);
        let path = write_dbf(&dir, "people.dbf", &bytes);

        let (tx, _rx) = queue::bounded(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = tokio::task::spawn_blocking(move || {
            let dbf = DbfFile::open(&path, Encoding::Utf8).unwrap();
            dbf.stream_rows(&tx, &cancel)
        })
        .await
        .unwrap();

        assert_eq!(outcome.rows, 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_latin1_decoding() {
        assert_eq!(decode_text(&[0xC9, b'l', b'a'], Encoding::Latin1), "Éla");
    }
}
