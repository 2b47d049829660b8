//! Plain-text address sources that feed the encoder.

use std::str::FromStr;

/// Layout of a semicolon separated address file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressLineFormat {
    /// `label;lat;lon`, no header
    #[default]
    Simple,
    /// French national address base export: header line, label built from
    /// number, street name, city and postcode, `lon` in column 12 and `lat`
    /// in column 13
    Ban,
}

impl AddressLineFormat {
    /// Whether the first line of the file is a header to skip
    pub fn has_header(&self) -> bool {
        matches!(self, AddressLineFormat::Ban)
    }
}

impl FromStr for AddressLineFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(AddressLineFormat::Simple),
            "ban" => Ok(AddressLineFormat::Ban),
            other => Err(format!("unknown address format: {other}")),
        }
    }
}

/// An address waiting to be embedded
#[derive(Debug, Clone, PartialEq)]
pub struct AddressLine {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

/// Parse one line; `None` for blank or malformed lines
pub fn parse_address_line(line: &str, format: AddressLineFormat) -> Option<AddressLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let cols: Vec<&str> = line.split(';').collect();

    let (label, lat, lon) = match format {
        AddressLineFormat::Simple => {
            // Labels may contain ';', so coordinates are taken from the right
            if cols.len() < 3 {
                return None;
            }
            let n = cols.len();
            (cols[..n - 2].join(";"), cols[n - 2], cols[n - 1])
        }
        AddressLineFormat::Ban => {
            if cols.len() < 14 {
                return None;
            }
            let parts = [cols[2], cols[4], cols[7], cols[5]];
            let label = parts
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (label, cols[13], cols[12])
        }
    };

    let label = label.trim().to_string();
    if label.is_empty() {
        return None;
    }
    Some(AddressLine {
        label,
        lat: lat.trim().parse().ok()?,
        lon: lon.trim().parse().ok()?,
    })
}
