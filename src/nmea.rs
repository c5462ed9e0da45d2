//! NMEA-0183 sentence codec.
//!
//! A sentence keeps its raw comma separated fields so that an untouched
//! sentence renders back byte for byte. Known sentence types get a name
//! table mapping field names to positions.
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
/// Failures of the NMEA codec
pub enum NmeaError {
    /// Sentence contains non ASCII bytes
    #[error("Sentence is not valid ASCII")]
    NotAscii,
    /// Sentence does not have the NMEA shape
    #[error("Pattern not found")]
    PatternNotFound,
    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum {
        /// Checksum carried by the sentence
        expected: u8,
        /// Checksum of the sentence body
        computed: u8,
    },
    /// Field name not in the sentence layout
    #[error("{sentence} has no field '{field}'")]
    UnknownField {
        /// Sentence address
        sentence: String,
        /// Requested field
        field: String,
    },
    /// Value would break the sentence framing
    #[error("Value '{value}' for field '{field}' contains a delimiter")]
    InvalidValue {
        /// Field name
        field: String,
        /// Rejected value
        value: String,
    },
}

const GGA: &[&str] = &[
    "time",
    "lat",
    "lat_dir",
    "lon",
    "lon_dir",
    "quality",
    "num_sats",
    "hdop",
    "alt",
    "alt_ref",
    "geo_sep",
    "geo_sep_units",
    "diff_age",
    "diff_station",
];
const GLL: &[&str] = &["lat", "lat_dir", "lon", "lon_dir", "time", "status", "mode"];
const RMC: &[&str] = &[
    "time",
    "status",
    "lat",
    "lat_dir",
    "lon",
    "lon_dir",
    "speed",
    "course",
    "date",
    "mag_var",
    "mag_var_dir",
    "mode",
    "nav_status",
];
const GNS: &[&str] = &[
    "time",
    "lat",
    "lat_dir",
    "lon",
    "lon_dir",
    "mode",
    "num_sats",
    "hdop",
    "alt",
    "geo_sep",
    "diff_age",
    "diff_station",
    "nav_status",
];
const DTM: &[&str] = &[
    "datum",
    "sub_datum",
    "lat",
    "lat_dir",
    "lon",
    "lon_dir",
    "alt",
    "ref_datum",
];
const VTG: &[&str] = &[
    "cog_true",
    "cog_true_ref",
    "cog_mag",
    "cog_mag_ref",
    "sog_knots",
    "sog_knots_unit",
    "sog_kmh",
    "sog_kmh_unit",
    "mode",
];
const GSA: &[&str] = &[
    "op_mode", "nav_mode", "sv_1", "sv_2", "sv_3", "sv_4", "sv_5", "sv_6", "sv_7", "sv_8", "sv_9",
    "sv_10", "sv_11", "sv_12", "pdop", "hdop", "vdop", "system_id",
];
const GSV: &[&str] = &["num_msgs", "msg_num", "num_svs"];
const ZDA: &[&str] = &["time", "day", "month", "year", "ltz_hours", "ltz_minutes"];
const GST: &[&str] = &[
    "time",
    "range_rms",
    "std_major",
    "std_minor",
    "orientation",
    "std_lat",
    "std_lon",
    "std_alt",
];
const PUBX_POSITION: &[&str] = &[
    "msg_id",
    "time",
    "lat",
    "lat_dir",
    "lon",
    "lon_dir",
    "alt",
    "nav_stat",
    "h_acc",
    "v_acc",
    "sog",
    "cog",
    "v_vel",
    "diff_age",
    "hdop",
    "vdop",
    "tdop",
    "num_svs",
    "reserved",
    "dr",
];

fn standard_schema(sentence_type: &str) -> Option<&'static [&'static str]> {
    Some(match sentence_type {
        "GGA" => GGA,
        "GLL" => GLL,
        "RMC" => RMC,
        "GNS" => GNS,
        "DTM" => DTM,
        "VTG" => VTG,
        "GSA" => GSA,
        "GSV" => GSV,
        "ZDA" => ZDA,
        "GST" => GST,
        _ => return None,
    })
}

fn proprietary_schema(manufacturer: &str, msg_id: Option<&str>) -> Option<&'static [&'static str]> {
    match (manufacturer, msg_id) {
        ("UBX", Some("00")) => Some(PUBX_POSITION),
        _ => None,
    }
}

/// XOR of every byte, as used between the start delimiter and `*`
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, &x| acc ^ x)
}

#[derive(Debug, Clone, PartialEq)]
/// A parsed NMEA sentence
pub struct NmeaSentence {
    start: char,
    talker: String,
    sentence_type: String,
    manufacturer: Option<String>,
    fields: Vec<String>,
    has_data: bool,
    has_checksum: bool,
    lowercase_checksum: bool,
    names: Option<&'static [&'static str]>,
}

impl NmeaSentence {
    /// Parse one complete sentence, delimiters and `\r\n` included.
    ///
    /// A present checksum must match; a missing one is accepted and stays
    /// missing on render. The hex case of the checksum is kept.
    pub fn parse(frame: &[u8]) -> Result<Self, NmeaError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(
                r"^(?P<start>[$!])(?P<body>(?P<address>[A-Z0-9]+)(?P<data>,[^*\r\n]*)?)(?:\*(?P<cksum>[0-9A-Fa-f]{2}))?\r\n$"
            ).expect("Failed to compile regex");
        }
        if !frame.is_ascii() {
            return Err(NmeaError::NotAscii);
        }
        let text = std::str::from_utf8(frame).map_err(|_| NmeaError::NotAscii)?;
        let caps = RE.captures(text).ok_or(NmeaError::PatternNotFound)?;
        let lowercase_checksum = caps
            .name("cksum")
            .is_some_and(|cksum| cksum.as_str().bytes().any(|b| b.is_ascii_lowercase()));
        let has_checksum = match caps.name("cksum") {
            Some(cksum) => {
                let expected =
                    u8::from_str_radix(cksum.as_str(), 16).map_err(|_| NmeaError::PatternNotFound)?;
                let computed = checksum(caps["body"].as_bytes());
                if expected != computed {
                    return Err(NmeaError::Checksum { expected, computed });
                }
                true
            }
            None => false,
        };
        let start = if &caps["start"] == "!" { '!' } else { '$' };
        let address = &caps["address"];
        let (has_data, fields) = match caps.name("data") {
            Some(data) => (
                true,
                data.as_str()[1..].split(',').map(str::to_string).collect(),
            ),
            None => (false, Vec::new()),
        };
        let (talker, sentence_type, manufacturer, names) = if start == '$' && address.starts_with('P') {
            let split = address.len().min(4);
            let manufacturer = address[1..split].to_string();
            let names = proprietary_schema(&manufacturer, fields.first().map(String::as_str));
            (
                "P".to_string(),
                address[split..].to_string(),
                Some(manufacturer),
                names,
            )
        } else {
            let split = address.len().min(2);
            let sentence_type = &address[split..];
            (
                address[..split].to_string(),
                sentence_type.to_string(),
                None,
                standard_schema(sentence_type),
            )
        };
        Ok(Self {
            start,
            talker,
            sentence_type,
            manufacturer,
            fields,
            has_data,
            has_checksum,
            lowercase_checksum,
            names,
        })
    }

    /// Talker id, `P` for proprietary sentences
    pub fn talker(&self) -> &str {
        &self.talker
    }

    /// Sentence formatter such as `GGA`
    pub fn sentence_type(&self) -> &str {
        &self.sentence_type
    }

    /// Manufacturer code of a proprietary sentence
    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    /// Whether this is a `$P...` sentence
    pub fn is_proprietary(&self) -> bool {
        self.manufacturer.is_some()
    }

    /// Raw data fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Address field as it appears on the wire
    pub fn address(&self) -> String {
        match &self.manufacturer {
            Some(manufacturer) => format!("P{}{}", manufacturer, self.sentence_type),
            None => format!("{}{}", self.talker, self.sentence_type),
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names?
            .iter()
            .position(|&n| n == name)
            .filter(|&idx| idx < self.fields.len())
    }

    /// Whether the sentence has a field called `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Value of the field called `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index_of(name).map(|idx| self.fields[idx].as_str())
    }

    /// Replace the field called `name`
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), NmeaError> {
        let idx = self.index_of(name).ok_or_else(|| NmeaError::UnknownField {
            sentence: self.address(),
            field: name.to_string(),
        })?;
        if value.contains(|c| matches!(c, ',' | '*' | '\r' | '\n')) {
            return Err(NmeaError::InvalidValue {
                field: name.to_string(),
                value: value.to_string(),
            });
        }
        self.fields[idx] = value.to_string();
        Ok(())
    }

    /// Wire form with a freshly computed checksum
    pub fn render(&self) -> Vec<u8> {
        let mut body = self.address();
        if self.has_data {
            body.push(',');
            body.push_str(&self.fields.join(","));
        }
        let mut out = format!("{}{}", self.start, body);
        if self.has_checksum {
            let sum = checksum(body.as_bytes());
            if self.lowercase_checksum {
                out.push_str(&format!("*{sum:02x}"));
            } else {
                out.push_str(&format!("*{sum:02X}"));
            }
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}
