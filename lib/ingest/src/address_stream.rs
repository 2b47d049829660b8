//! Length-prefixed address record stream.
//!
//! A record is four fields in order: label, latitude, longitude (decimal
//! text) and the embedding (raw `f32` in native byte order). Every field is
//! an 8-byte big-endian length followed by that many bytes. The stream ends
//! cleanly at a record boundary.

use bytes::{BufMut, BytesMut};
use nearspot_core::{AddressRecord, Error, GeoPoint, Result, Vector};
use std::io::{self, Read, Write};

/// Fields longer than this are treated as corruption
pub const MAX_FIELD_LEN: u64 = 256 * 1024 * 1024;

const FIELDS: [&str; 4] = ["label", "lat", "lon", "embedding"];

/// One framed but not yet decoded record
#[derive(Debug, Clone, PartialEq)]
pub struct RawAddressFrame {
    pub ordinal: u64,
    pub label: Vec<u8>,
    pub lat: Vec<u8>,
    pub lon: Vec<u8>,
    pub embedding: Vec<u8>,
}

impl RawAddressFrame {
    /// Decode into a record whose id is the frame ordinal
    pub fn decode(&self) -> Result<AddressRecord> {
        let corrupt = |reason: String| Error::IngestionRecordCorrupt {
            record: self.ordinal,
            reason,
        };

        let label = std::str::from_utf8(&self.label)
            .map_err(|e| corrupt(format!("label is not utf-8: {e}")))?;
        let lat = parse_degrees(&self.lat).map_err(|e| corrupt(format!("lat: {e}")))?;
        let lon = parse_degrees(&self.lon).map_err(|e| corrupt(format!("lon: {e}")))?;
        let coordinate = GeoPoint::new(lat, lon).map_err(|e| corrupt(e.to_string()))?;

        if self.embedding.len() % 4 != 0 {
            return Err(corrupt(format!(
                "embedding length {} is not a multiple of 4",
                self.embedding.len()
            )));
        }
        let embedding: Vec<f32> = self
            .embedding
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(AddressRecord::new(
            self.ordinal,
            label,
            coordinate,
            Vector::new(embedding),
        ))
    }
}

fn parse_degrees(raw: &[u8]) -> std::result::Result<f64, String> {
    let text = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| format!("{e} ({text:?})"))
}

/// Splits a byte stream into [`RawAddressFrame`]s.
///
/// Yields `Err(IngestionRecordCorrupt)` at most once, for a truncated or
/// oversized trailing record, and stops after it. Framing cannot resume past
/// a bad length prefix.
pub struct AddressStreamReader<R> {
    reader: R,
    next_ordinal: u64,
    finished: bool,
}

impl<R: Read> AddressStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            next_ordinal: 0,
            finished: false,
        }
    }

    /// Number of frames produced so far
    pub fn frames_read(&self) -> u64 {
        self.next_ordinal
    }

    fn read_frame(&mut self) -> Result<Option<RawAddressFrame>> {
        let ordinal = self.next_ordinal;
        let mut fields: [Vec<u8>; 4] = Default::default();

        for (i, name) in FIELDS.iter().enumerate() {
            let mut prefix = [0u8; 8];
            let got = read_full(&mut self.reader, &mut prefix)?;
            if got == 0 && i == 0 {
                return Ok(None);
            }
            if got < prefix.len() {
                return Err(Error::IngestionRecordCorrupt {
                    record: ordinal,
                    reason: format!("truncated length prefix for {name}"),
                });
            }

            let len = u64::from_be_bytes(prefix);
            if len > MAX_FIELD_LEN {
                return Err(Error::IngestionRecordCorrupt {
                    record: ordinal,
                    reason: format!("{name} length {len} exceeds {MAX_FIELD_LEN}"),
                });
            }

            let field = &mut fields[i];
            (&mut self.reader).take(len).read_to_end(field)?;
            if (field.len() as u64) < len {
                return Err(Error::IngestionRecordCorrupt {
                    record: ordinal,
                    reason: format!("{name} truncated: expected {len} bytes, got {}", field.len()),
                });
            }
        }

        self.next_ordinal += 1;
        let [label, lat, lon, embedding] = fields;
        Ok(Some(RawAddressFrame {
            ordinal,
            label,
            lat,
            lon,
            embedding,
        }))
    }
}

impl<R: Read> Iterator for AddressStreamReader<R> {
    type Item = Result<RawAddressFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encodes address records in the stream format
pub struct AddressStreamWriter<W: Write> {
    writer: W,
    buf: BytesMut,
    written: u64,
}

impl<W: Write> AddressStreamWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BytesMut::with_capacity(8 * 1024),
            written: 0,
        }
    }

    /// Append one record. Coordinates are written as shortest round-trip text.
    pub fn write_record(&mut self, label: &str, coordinate: &GeoPoint, embedding: &[f32]) -> Result<()> {
        self.buf.clear();
        put_field(&mut self.buf, label.as_bytes());
        put_field(&mut self.buf, coordinate.lat().to_string().as_bytes());
        put_field(&mut self.buf, coordinate.lon().to_string().as_bytes());

        self.buf.put_u64(embedding.len() as u64 * 4);
        for x in embedding {
            self.buf.put_slice(&x.to_ne_bytes());
        }

        self.writer.write_all(&self.buf)?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn put_field(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
}
