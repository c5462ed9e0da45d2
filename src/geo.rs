//! Geographic value types and coordinate extraction.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GnssError, OperationError},
    formats,
    message::{Message, ParsedPayload},
    nmea::NmeaSentence,
    ubx::UbxMessage,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Latitude and longitude in degrees, altitude in meters.
///
/// Also used for offsets, in which case each component is a delta.
pub struct GeoCoordinates {
    /// Latitude, north positive
    pub lat: Decimal,
    /// Longitude, east positive
    pub lon: Decimal,
    /// Altitude
    #[serde(default)]
    pub alt: Decimal,
}

impl GeoCoordinates {
    /// Coordinates from their components
    pub fn new(lat: Decimal, lon: Decimal, alt: Decimal) -> Self {
        Self { lat, lon, alt }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Orientation in radians
pub struct EulerAngles {
    /// Rotation about the vertical axis
    pub yaw: Decimal,
    /// Rotation about the lateral axis
    pub pitch: Decimal,
    /// Rotation about the longitudinal axis
    pub roll: Decimal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Per-axis scale between meters and degrees at some location
pub struct ConversionFactor {
    /// Latitude factor
    pub lat: Decimal,
    /// Longitude factor
    pub lon: Decimal,
}

fn missing(owner: String, field: &str) -> GnssError {
    OperationError::InvalidOperation(format!("{owner} has no '{field}' field")).into()
}

fn nmea_field<'a>(sentence: &'a NmeaSentence, name: &str) -> Result<&'a str, GnssError> {
    sentence
        .get(name)
        .ok_or_else(|| missing(sentence.address(), name))
}

fn ubx_field(message: &UbxMessage, name: &str) -> Result<i64, GnssError> {
    message
        .get(name)
        .ok_or_else(|| missing(message.identity(), name))
}

/// Position carried by an NMEA sentence
pub fn extract_nmea(sentence: &NmeaSentence) -> Result<GeoCoordinates, GnssError> {
    let lat = formats::nmea::degmins_to_decdeg(
        nmea_field(sentence, "lat")?,
        nmea_field(sentence, "lat_dir")?,
    )?;
    let lon = formats::nmea::degmins_to_decdeg(
        nmea_field(sentence, "lon")?,
        nmea_field(sentence, "lon_dir")?,
    )?;
    let alt = match sentence.get("alt") {
        Some(alt) => formats::nmea::height_from_field(alt)?,
        None => Decimal::ZERO,
    };
    Ok(GeoCoordinates { lat, lon, alt })
}

/// Position carried by a UBX message, refinements included when present
pub fn extract_ubx(message: &UbxMessage) -> Result<GeoCoordinates, GnssError> {
    let lat = formats::ubx::integer_to_decdeg(
        ubx_field(message, "lat")?,
        message.get("latHp").unwrap_or(0),
    );
    let lon = formats::ubx::integer_to_decdeg(
        ubx_field(message, "lon")?,
        message.get("lonHp").unwrap_or(0),
    );
    let alt = match message.get("height") {
        Some(height) => {
            formats::ubx::height_from_field(height, message.get("heightHp").unwrap_or(0))
        }
        None => Decimal::ZERO,
    };
    Ok(GeoCoordinates { lat, lon, alt })
}

/// Canonical position of any supported message
pub fn extract(message: &Message) -> Result<GeoCoordinates, GnssError> {
    if message.proto != message.payload.protocol() {
        return Err(GnssError::UnsupportedProtocol(message.proto));
    }
    match &message.payload {
        ParsedPayload::Nmea(sentence) => extract_nmea(sentence),
        ParsedPayload::Ubx(msg) => extract_ubx(msg),
    }
}
