use crate::types::Sample;
use anyhow::{Context, Result};
use nalgebra::Vector3;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Header row of the raw sample log.
pub const HEADER: &str = "counter,dt,ax,ay,az,gx,gy,gz";
const FIELD_COUNT: usize = 8;

/// One row of the raw sample log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub counter: u16,
    /// Seconds since the previous row; absent on the first.
    pub dt: Option<f64>,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

impl LogRecord {
    pub fn sample(&self) -> Sample {
        Sample {
            counter: self.counter,
            accel: self.accel,
            gyro: self.gyro,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("line {line}: {reason}")]
pub struct MalformedRecord {
    pub line: usize,
    pub reason: String,
}

/// Streaming parser for the raw sample log.
///
/// Feed bytes via `push_data`, then drain records via `next_record`. Call
/// `finish` once the input is exhausted to flush a final unterminated line.
pub struct SampleLogParser {
    buffer: Vec<u8>,
    line: usize,
}

impl SampleLogParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(8192),
            line: 0,
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next record from complete lines in the buffer.
    /// Returns `None` once no complete data line is available.
    pub fn next_record(&mut self) -> Option<Result<LogRecord, MalformedRecord>> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n')?;
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(result) = self.parse_raw(&raw) {
                return Some(result);
            }
        }
    }

    /// Parse whatever remains in the buffer as a final line.
    pub fn finish(&mut self) -> Option<Result<LogRecord, MalformedRecord>> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        self.parse_raw(&raw)
    }

    /// `None` for blank and header lines.
    fn parse_raw(&mut self, raw: &[u8]) -> Option<Result<LogRecord, MalformedRecord>> {
        self.line += 1;
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() || text == HEADER {
            return None;
        }
        Some(parse_line(text, self.line))
    }
}

impl Default for SampleLogParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(text: &str, line: usize) -> Result<LogRecord, MalformedRecord> {
    let malformed = |reason: String| MalformedRecord { line, reason };

    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() < FIELD_COUNT {
        return Err(malformed(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }

    let counter = fields[0]
        .parse::<u16>()
        .map_err(|_| malformed(format!("invalid counter {:?}", fields[0])))?;

    let dt = match fields[1] {
        "" | "None" => None,
        s => Some(
            s.parse::<f64>()
                .map_err(|_| malformed(format!("invalid dt {s:?}")))?,
        ),
    };

    let mut values = [0.0; 6];
    for (i, (value, field)) in values.iter_mut().zip(&fields[2..FIELD_COUNT]).enumerate() {
        *value = field
            .parse::<f64>()
            .map_err(|_| malformed(format!("invalid value {field:?} in column {}", i + 2)))?;
    }

    Ok(LogRecord {
        counter,
        dt,
        accel: Vector3::new(values[0], values[1], values[2]),
        gyro: Vector3::new(values[3], values[4], values[5]),
    })
}

/// Read a whole sample log, skipping header, blank and malformed rows.
pub fn read_sample_log(path: &Path) -> Result<Vec<LogRecord>> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let mut parser = SampleLogParser::new();
    parser.push_data(&data);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut push = |result: Result<LogRecord, MalformedRecord>| match result {
        Ok(record) => records.push(record),
        Err(e) => {
            tracing::debug!(%e, "Skipping malformed row");
            skipped += 1;
        }
    };
    while let Some(result) = parser.next_record() {
        push(result);
    }
    if let Some(result) = parser.finish() {
        push(result);
    }

    if skipped > 0 {
        tracing::warn!(?path, skipped, "Skipped malformed sample rows");
    }
    tracing::info!(?path, records = records.len(), "Loaded sample log");
    Ok(records)
}

/// Writes the raw sample log, header first.
pub struct SampleLogWriter<W: Write> {
    inner: W,
}

impl<W: Write> SampleLogWriter<W> {
    pub fn new(mut inner: W) -> std::io::Result<Self> {
        writeln!(inner, "{HEADER}")?;
        Ok(Self { inner })
    }

    pub fn write_record(&mut self, record: &LogRecord) -> std::io::Result<()> {
        let dt = record.dt.map(|dt| dt.to_string()).unwrap_or_default();
        let (a, g) = (&record.accel, &record.gyro);
        writeln!(
            self.inner,
            "{},{},{},{},{},{},{},{}",
            record.counter, dt, a.x, a.y, a.z, g.x, g.y, g.z
        )
    }

    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "counter,dt,ax,ay,az,gx,gy,gz\n\
                       100,,12,-40,4100,3,-2,1\n\
                       356,0.02,15,-38,4096,4,-1,0\n";

    #[test]
    fn parse_log_with_header() {
        let mut parser = SampleLogParser::new();
        parser.push_data(LOG.as_bytes());

        let first = parser.next_record().unwrap().unwrap();
        assert_eq!(first.counter, 100);
        assert_eq!(first.dt, None);
        assert_eq!(first.accel, Vector3::new(12.0, -40.0, 4100.0));

        let second = parser.next_record().unwrap().unwrap();
        assert_eq!(second.dt, Some(0.02));
        assert_eq!(second.gyro, Vector3::new(4.0, -1.0, 0.0));

        assert!(parser.next_record().is_none());
        assert!(parser.finish().is_none());
    }

    #[test]
    fn parse_fragmented_data() {
        let bytes = LOG.as_bytes();
        let mid = 40;

        let mut parser = SampleLogParser::new();
        parser.push_data(&bytes[..mid]);
        assert!(parser.next_record().is_none());

        parser.push_data(&bytes[mid..]);
        assert_eq!(parser.next_record().unwrap().unwrap().counter, 100);
        assert_eq!(parser.next_record().unwrap().unwrap().counter, 356);
    }

    #[test]
    fn unterminated_last_line_is_flushed() {
        let mut parser = SampleLogParser::new();
        parser.push_data(b"7,None,1,2,3,4,5,6");
        assert!(parser.next_record().is_none());
        let record = parser.finish().unwrap().unwrap();
        assert_eq!(record.counter, 7);
        assert_eq!(record.dt, None);
    }

    #[test]
    fn malformed_rows_are_reported_with_line() {
        let mut parser = SampleLogParser::new();
        parser.push_data(b"counter,dt,ax,ay,az,gx,gy,gz\n1,,x,2,3,4,5,6\n70000,,1,2,3,4,5,6\n1,2,3\n");

        let err = parser.next_record().unwrap().unwrap_err();
        assert_eq!(err.line, 2);
        assert!(parser.next_record().unwrap().is_err());
        assert!(parser.next_record().unwrap().is_err());
        assert!(parser.next_record().is_none());
    }

    #[test]
    fn read_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        std::fs::write(&path, format!("{LOG}garbage\n\n512,0.02,1,2,3,4,5,6")).unwrap();

        let records = read_sample_log(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].counter, 512);
    }

    #[test]
    fn writer_output_parses_back() {
        let records = vec![
            LogRecord {
                counter: 65535,
                dt: None,
                accel: Vector3::new(1.5, -2.0, 4096.0),
                gyro: Vector3::new(0.0, 3.0, -7.0),
            },
            LogRecord {
                counter: 255,
                dt: Some(0.02),
                accel: Vector3::new(1.0, -2.0, 4095.0),
                gyro: Vector3::new(1.0, 3.0, -7.0),
            },
        ];

        let mut writer = SampleLogWriter::new(Vec::new()).unwrap();
        for record in &records {
            writer.write_record(record).unwrap();
        }
        let bytes = writer.into_inner().unwrap();
        assert!(bytes.starts_with(HEADER.as_bytes()));

        let mut parser = SampleLogParser::new();
        parser.push_data(&bytes);
        let parsed: Vec<_> = std::iter::from_fn(|| parser.next_record())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(parsed, records);
    }
}
