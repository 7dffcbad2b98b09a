//! JSON-lines packet streams
//!
//! One `TracePacket` per line. Blank lines and `#` comments are skipped.

use crate::error::{ProcessorError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracery_shared::types::events::TracePacket;

/// Iterator over the packets of a stream, in file order
pub struct PacketReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl PacketReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for PacketReader<R> {
    type Item = Result<TracePacket>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed).map_err(|source| ProcessorError::Decode {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

/// Read a whole stream, failing on the first malformed line.
pub fn read_packets<R: BufRead>(reader: R) -> Result<Vec<TracePacket>> {
    PacketReader::new(reader).collect()
}
