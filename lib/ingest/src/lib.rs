//! # nearspot Ingest
//!
//! Bulk loading for the nearspot indexes:
//!
//! - [`AddressStreamReader`] / [`AddressStreamWriter`] - the length-prefixed
//!   address record stream
//! - [`parse_poi_line`] - OpenStreetMap-shaped point of interest exports
//! - [`load_addresses`] / [`load_pois`] - file loaders with gzip and byte
//!   order mark detection, parallel decoding and per-record error accounting

pub mod address_source;
pub mod address_stream;
pub mod loader;
pub mod poi_stream;

pub use address_source::{parse_address_line, AddressLine, AddressLineFormat};
pub use address_stream::{AddressStreamReader, AddressStreamWriter, RawAddressFrame, MAX_FIELD_LEN};
pub use loader::{
    decode_text, embedder_agreement, load_addresses, load_pois, open_input, read_addresses,
    read_pois, IngestReport, LoaderConfig,
};
pub use poi_stream::parse_poi_line;
