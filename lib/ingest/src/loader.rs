use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use nearspot_core::{AddressRecord, EmbeddingProvider, Error, PointOfInterest, Vector};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{info, warn};
use crate::address_stream::{AddressStreamReader, RawAddressFrame};
use crate::poi_stream::parse_poi_line;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];
const UTF16LE_BOM: [u8; 2] = [0xff, 0xfe];

/// Ingestion settings
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Frames decoded per parallel batch
    pub batch_size: usize,
    /// Skip address records whose embedding has a different length
    pub expected_dim: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            expected_dim: None,
        }
    }
}

/// Counts from one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub decoded: usize,
    /// Records dropped because they could not be decoded
    pub skipped_corrupt: usize,
    /// Records dropped on purpose (non-public points of interest)
    pub filtered: usize,
    /// The stream ended inside a record
    pub truncated: bool,
}

/// Open a file for reading, decompressing it when it starts with the gzip magic
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let head = reader
        .fill_buf()
        .with_context(|| format!("reading {}", path.display()))?;

    if head.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(BufReader::new(GzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Decode an address stream.
///
/// Frames are cut sequentially and decoded in parallel batches. Records that
/// fail to decode are logged and skipped; a truncated tail ends the stream.
/// Read failures of the underlying source are returned as errors.
pub fn read_addresses<R: Read>(reader: R, config: &LoaderConfig) -> Result<(Vec<AddressRecord>, IngestReport)> {
    let batch_size = config.batch_size.max(1);
    let mut frames = AddressStreamReader::new(reader);
    let mut records = Vec::new();
    let mut report = IngestReport::default();
    let mut batch: Vec<RawAddressFrame> = Vec::with_capacity(batch_size);

    loop {
        batch.clear();
        let mut stream_error = None;
        for frame in frames.by_ref() {
            match frame {
                Ok(frame) => {
                    batch.push(frame);
                    if batch.len() == batch_size {
                        break;
                    }
                }
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            }
        }
        let exhausted = batch.len() < batch_size;

        let decoded: Vec<Result<AddressRecord, Error>> = batch
            .par_iter()
            .map(|frame| {
                let record = frame.decode()?;
                match config.expected_dim {
                    Some(dim) if record.embedding.dim() != dim => Err(Error::IngestionRecordCorrupt {
                        record: frame.ordinal,
                        reason: format!("embedding has {} dimensions, expected {dim}", record.embedding.dim()),
                    }),
                    _ => Ok(record),
                }
            })
            .collect();

        for result in decoded {
            match result {
                Ok(record) => {
                    records.push(record);
                    report.decoded += 1;
                }
                Err(e) => {
                    warn!(error = %e, "skipping address record");
                    report.skipped_corrupt += 1;
                }
            }
        }

        match stream_error {
            Some(e @ Error::IngestionRecordCorrupt { .. }) => {
                warn!(error = %e, "address stream ended inside a record");
                report.skipped_corrupt += 1;
                report.truncated = true;
                break;
            }
            Some(e) => {
                return Err(e).with_context(|| {
                    format!("reading address stream after {} records", frames.frames_read())
                });
            }
            None => {}
        }
        if exhausted {
            break;
        }
    }

    Ok((records, report))
}

/// Load an address stream file (optionally gzip-compressed)
pub fn load_addresses<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<(Vec<AddressRecord>, IngestReport)> {
    let path = path.as_ref();
    let reader = open_input(path)?;
    let (records, report) =
        read_addresses(reader, config).with_context(|| format!("loading {}", path.display()))?;
    info!(
        path = %path.display(),
        decoded = report.decoded,
        skipped = report.skipped_corrupt,
        truncated = report.truncated,
        "loaded address stream"
    );
    Ok((records, report))
}

/// Lowest cosine similarity between the stored embedding of the first
/// `sample` records and `embedder`'s embedding of their labels.
///
/// Streams encoded with `embedder` score close to 1.0. `None` when there is
/// nothing to compare.
pub fn embedder_agreement(
    records: &[AddressRecord],
    embedder: &dyn EmbeddingProvider,
    sample: usize,
) -> nearspot_core::Result<Option<f32>> {
    let mut lowest: Option<f32> = None;
    for record in records.iter().take(sample) {
        let fresh = Vector::new(embedder.embed(&record.label)?);
        let similarity = record.embedding.cosine_similarity(&fresh);
        lowest = Some(lowest.map_or(similarity, |l| l.min(similarity)));
    }
    Ok(lowest)
}

/// Decode raw bytes as text, honoring a UTF-16LE or UTF-8 byte order mark
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(&UTF16LE_BOM) {
        if rest.len() % 2 != 0 {
            anyhow::bail!("invalid UTF-16LE text: odd number of bytes");
        }
        let units = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .collect::<std::result::Result<String, _>>()
            .context("invalid UTF-16LE text");
    }
    let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    String::from_utf8(body.to_vec()).context("invalid UTF-8 text")
}

/// Parse a point of interest export held in memory.
///
/// Ids are line ordinals, counting every line. Lines are parsed in parallel.
pub fn read_pois(text: &str) -> (Vec<PointOfInterest>, IngestReport) {
    let lines: Vec<&str> = text.lines().collect();
    let parsed: Vec<_> = lines
        .par_iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_poi_line(i as u64, line))
        .collect();

    let mut pois = Vec::with_capacity(parsed.len());
    let mut report = IngestReport::default();
    for result in parsed {
        match result {
            Ok(Some(poi)) => {
                pois.push(poi);
                report.decoded += 1;
            }
            Ok(None) => report.filtered += 1,
            Err(e) => {
                warn!(error = %e, "skipping point of interest");
                report.skipped_corrupt += 1;
            }
        }
    }
    (pois, report)
}

/// Load a point of interest export file (UTF-8 or UTF-16LE, optionally gzip-compressed)
pub fn load_pois<P: AsRef<Path>>(path: P) -> Result<(Vec<PointOfInterest>, IngestReport)> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    open_input(path)?
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading {}", path.display()))?;
    let text = decode_text(&bytes).with_context(|| format!("decoding {}", path.display()))?;

    let (pois, report) = read_pois(&text);
    info!(
        path = %path.display(),
        decoded = report.decoded,
        filtered = report.filtered,
        skipped = report.skipped_corrupt,
        "loaded points of interest"
    );
    Ok((pois, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_stream::AddressStreamWriter;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use nearspot_core::GeoPoint;
    use std::io::Write;

    fn stream(n: usize, dim: usize) -> Vec<u8> {
        let mut writer = AddressStreamWriter::new(Vec::new());
        for i in 0..n {
            let coord = GeoPoint::new(40.0 + i as f64 * 0.001, 2.0).unwrap();
            writer
                .write_record(&format!("{i} Main Street"), &coord, &vec![i as f32; dim])
                .unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_batches_keep_ordinals() {
        let bytes = stream(25, 4);
        let config = LoaderConfig { batch_size: 7, expected_dim: Some(4) };
        let (records, report) = read_addresses(bytes.as_slice(), &config).unwrap();
        assert_eq!(report.decoded, 25);
        assert!(!report.truncated);
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..25).collect::<Vec<u64>>());
    }

    #[test]
    fn test_batch_boundary_at_end() {
        let (records, report) = read_addresses(
            stream(14, 2).as_slice(),
            &LoaderConfig { batch_size: 7, expected_dim: None },
        )
        .unwrap();
        assert_eq!(records.len(), 14);
        assert_eq!(report.skipped_corrupt, 0);
    }

    #[test]
    fn test_truncated_tail_and_wrong_dim() {
        let mut bytes = stream(3, 4);
        let mut writer = AddressStreamWriter::new(Vec::new());
        writer
            .write_record("short", &GeoPoint::new(1.0, 1.0).unwrap(), &[1.0, 2.0])
            .unwrap();
        bytes.extend(writer.finish().unwrap());
        bytes.extend(stream(1, 4));
        bytes.truncate(bytes.len() - 3);

        let config = LoaderConfig { batch_size: 2, expected_dim: Some(4) };
        let (records, report) = read_addresses(bytes.as_slice(), &config).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(report.decoded, 3);
        // the 2-dim record and the cut-off tail
        assert_eq!(report.skipped_corrupt, 2);
        assert!(report.truncated);
    }

    /// Serves the wrapped bytes, then fails every read
    struct FailingReader {
        data: std::io::Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_read_error_is_not_a_truncated_tail() {
        let reader = FailingReader { data: std::io::Cursor::new(stream(1, 4)) };
        let err = read_addresses(reader, &LoaderConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("disk gone"));
        assert!(err.to_string().contains("after 1 records"));
    }

    #[test]
    fn test_embedder_agreement() {
        use nearspot_core::HashingEmbedder;

        let embedder = HashingEmbedder::new(8);
        let coord = GeoPoint::new(1.0, 1.0).unwrap();
        let own: Vec<AddressRecord> = ["1 Rue Haute", "2 Rue Basse"]
            .iter()
            .enumerate()
            .map(|(i, label)| AddressRecord::new(i as u64, *label, coord, Vector::new(embedder.embed(label).unwrap())))
            .collect();
        let agreement = embedder_agreement(&own, &embedder, 16).unwrap().unwrap();
        assert!(agreement > 0.999);

        // a stream from some other model
        let foreign = (0..2u64)
            .map(|i| {
                let mut embedding = embedder.embed(&own[i as usize].label).unwrap();
                embedding.iter_mut().for_each(|x| *x = -*x);
                AddressRecord::new(i, own[i as usize].label.clone(), coord, Vector::new(embedding))
            })
            .collect::<Vec<_>>();
        assert!(embedder_agreement(&foreign, &embedder, 16).unwrap().unwrap() < 0.0);
        assert_eq!(embedder_agreement(&[], &embedder, 16).unwrap(), None);
    }

    #[test]
    fn test_gzip_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.bin.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&stream(5, 3)).unwrap();
        encoder.finish().unwrap();

        let (records, report) = load_addresses(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(report.decoded, 5);
    }

    #[test]
    fn test_missing_file() {
        let err = load_pois("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("opening"));
    }

    #[test]
    fn test_decode_text_boms() {
        assert_eq!(decode_text(b"\xef\xbb\xbfabc").unwrap(), "abc");

        let mut utf16 = UTF16LE_BOM.to_vec();
        for unit in "h\u{e9}".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&utf16).unwrap(), "h\u{e9}");
        assert!(decode_text(&[0xff, 0xff, 0x00]).is_err());

        // a dangling half code unit
        utf16.push(b'x');
        assert!(decode_text(&utf16).is_err());
    }

    #[test]
    fn test_read_pois_counts() {
        let text = [
            r#"{"type":"node","lat":48.85,"lon":2.35,"tags":{"fee":"no"}}"#,
            "",
            r#"{"type":"node","lat":48.86,"lon":2.36,"tags":{"access":"private"}}"#,
            "garbage",
            r#"{"type":"way","centroid":{"lat":48.87,"lon":2.37},"tags":{}}"#,
        ]
        .join("\n");
        let (pois, report) = read_pois(&text);
        assert_eq!(pois.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(report, IngestReport { decoded: 2, skipped_corrupt: 1, filtered: 1, truncated: false });
    }

    #[test]
    fn test_load_utf16_pois() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toilets.json");
        let text = "{\"type\":\"node\",\"lat\":1.5,\"lon\":2.5,\"tags\":{\"wheelchair\":\"yes\"}}\r\n";
        let mut bytes = UTF16LE_BOM.to_vec();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let (pois, report) = load_pois(&path).unwrap();
        assert_eq!(report.decoded, 1);
        assert_eq!(pois[0].coordinate, GeoPoint::new(1.5, 2.5).unwrap());
    }
}
