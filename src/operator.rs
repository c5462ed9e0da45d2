//! Coordinate offset operators.
//!
//! Each operator reads the position of a message, adds the current offset
//! and writes the result back through the editor in the message's own
//! encoding.
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::{
    editor,
    error::GnssError,
    formats::{self, Axis},
    geo::{self, GeoCoordinates},
    math::{self, allow_inexact},
    message::{FieldValue, Message, ParsedPayload, ProtocolTag},
    nmea::NmeaSentence,
    offset::OffsetProvider,
    status::Status,
    ubx::UbxMessage,
};

/// Transformation applied to a message that passed its policy
pub trait Operator: Send + Sync {
    /// Transform `message`; on failure the message comes back unchanged
    fn operate(&self, message: Message) -> (Status, Message);
}

fn shifted(
    position: GeoCoordinates,
    offset: GeoCoordinates,
) -> Result<GeoCoordinates, GnssError> {
    allow_inexact(|| -> Result<GeoCoordinates, GnssError> {
        Ok(GeoCoordinates {
            lat: math::add(position.lat, offset.lat)?,
            lon: math::add(position.lon, offset.lon)?,
            alt: math::add(position.alt, offset.alt)?,
        })
    })
}

fn unsupported(message: &Message) -> GnssError {
    GnssError::UnsupportedProtocol(message.proto)
}

/// Offsets the degree-minute position and altitude of NMEA sentences
pub struct NmeaOffsetOperator {
    offset: Arc<dyn OffsetProvider>,
}

impl NmeaOffsetOperator {
    /// Operator adding the offset reported by `offset`
    pub fn new(offset: Arc<dyn OffsetProvider>) -> Self {
        Self { offset }
    }

    fn apply(&self, message: &mut Message) -> Result<(), GnssError> {
        let sentence: &NmeaSentence = match &message.payload {
            ParsedPayload::Nmea(sentence) => sentence,
            _ => return Err(unsupported(message)),
        };
        let (raw_lat, raw_lon) = (
            sentence.get("lat").unwrap_or_default(),
            sentence.get("lon").unwrap_or_default(),
        );
        if raw_lat.is_empty() || raw_lon.is_empty() {
            log::trace!("{} carries no fix, left untouched", sentence.address());
            return Ok(());
        }
        let hipres = formats::nmea::is_highpres(raw_lat) || formats::nmea::is_highpres(raw_lon);
        let position = shifted(geo::extract_nmea(sentence)?, self.offset.get_offset()?)?;
        let (lat, lat_dir) = formats::nmea::decdeg_to_degmins(position.lat, Axis::Lat, hipres)?;
        let (lon, lon_dir) = formats::nmea::decdeg_to_degmins(position.lon, Axis::Lon, hipres)?;
        let mut fields: Vec<(&str, FieldValue)> = vec![
            ("lat", lat.into()),
            ("lat_dir", lat_dir.into()),
            ("lon", lon.into()),
            ("lon_dir", lon_dir.into()),
        ];
        if let Some(alt) = sentence.get("alt").filter(|alt| !alt.is_empty()) {
            fields.push(("alt", formats::nmea::height_to_field(position.alt, alt).into()));
            if sentence.has_field("alt_ref") {
                fields.push(("alt_ref", "M".into()));
            }
        }
        editor::set_fields(message, &fields)
    }
}

impl Operator for NmeaOffsetOperator {
    fn operate(&self, mut message: Message) -> (Status, Message) {
        let status = Status::from(&self.apply(&mut message));
        (status, message)
    }
}

fn ubx_payload(message: &Message) -> Result<&UbxMessage, GnssError> {
    match &message.payload {
        ParsedPayload::Ubx(msg) => Ok(msg),
        _ => Err(unsupported(message)),
    }
}

/// Nearest single integer in 1e-7 degrees
fn angle_to_base(value: Decimal) -> Result<i64, GnssError> {
    let (base, hires) = formats::ubx::decdeg_to_integer(value)?;
    Ok(formats::ubx::minimize_correction(base, hires, formats::ubx::LATLON_MIDPOINT)?.0)
}

/// Nearest single integer in millimeters
fn height_to_base(value: Decimal) -> Result<i64, GnssError> {
    let (base, hires) = formats::ubx::height_to_field(value)?;
    Ok(formats::ubx::minimize_correction(base, hires, formats::ubx::HEIGHT_MIDPOINT)?.0)
}

/// Offsets the 1e-7 degree and millimeter fields of UBX messages
pub struct UbxOffsetOperator {
    offset: Arc<dyn OffsetProvider>,
}

impl UbxOffsetOperator {
    /// Operator adding the offset reported by `offset`
    pub fn new(offset: Arc<dyn OffsetProvider>) -> Self {
        Self { offset }
    }

    fn apply(&self, message: &mut Message) -> Result<(), GnssError> {
        let msg = ubx_payload(message)?;
        let offset = self.offset.get_offset()?;
        let position = shifted(geo::extract_ubx(msg)?, offset)?;
        let mut fields: Vec<(&str, FieldValue)> = vec![
            ("lat", angle_to_base(position.lat)?.into()),
            ("lon", angle_to_base(position.lon)?.into()),
        ];
        if msg.has_field("height") {
            fields.push(("height", height_to_base(position.alt)?.into()));
        }
        if let Some(msl) = msg.get("hMSL") {
            let msl = allow_inexact(|| {
                math::add(formats::ubx::height_from_field(msl, 0), offset.alt)
            })?;
            fields.push(("hMSL", height_to_base(msl)?.into()));
        }
        editor::set_fields(message, &fields)
    }
}

impl Operator for UbxOffsetOperator {
    fn operate(&self, mut message: Message) -> (Status, Message) {
        let status = Status::from(&self.apply(&mut message));
        (status, message)
    }
}

/// Offsets the `(base, refinement)` pairs of high precision UBX messages
pub struct UbxHiResOffsetOperator {
    offset: Arc<dyn OffsetProvider>,
}

impl UbxHiResOffsetOperator {
    /// Operator adding the offset reported by `offset`
    pub fn new(offset: Arc<dyn OffsetProvider>) -> Self {
        Self { offset }
    }

    fn push_height(
        fields: &mut Vec<(&'static str, FieldValue)>,
        msg: &UbxMessage,
        names: (&'static str, &'static str),
        delta: Decimal,
    ) -> Result<(), GnssError> {
        let (Some(base), Some(hires)) = (msg.get(names.0), msg.get(names.1)) else {
            return Ok(());
        };
        let height = allow_inexact(|| {
            math::add(formats::ubx::height_from_field(base, hires), delta)
        })?;
        let (base, hires) = formats::ubx::height_to_field(height)?;
        let (base, hires) =
            formats::ubx::minimize_correction(base, hires, formats::ubx::HEIGHT_MIDPOINT)?;
        fields.push((names.0, base.into()));
        fields.push((names.1, hires.into()));
        Ok(())
    }

    fn apply(&self, message: &mut Message) -> Result<(), GnssError> {
        let msg = ubx_payload(message)?;
        let offset = self.offset.get_offset()?;
        let position = shifted(geo::extract_ubx(msg)?, offset)?;
        let mut fields: Vec<(&'static str, FieldValue)> = Vec::with_capacity(8);
        for (names, value) in [(("lat", "latHp"), position.lat), (("lon", "lonHp"), position.lon)] {
            let (base, hires) = formats::ubx::decdeg_to_integer(value)?;
            let (base, hires) =
                formats::ubx::minimize_correction(base, hires, formats::ubx::LATLON_MIDPOINT)?;
            fields.push((names.0, base.into()));
            fields.push((names.1, hires.into()));
        }
        Self::push_height(&mut fields, msg, ("height", "heightHp"), offset.alt)?;
        Self::push_height(&mut fields, msg, ("hMSL", "hMSLHp"), offset.alt)?;
        editor::set_fields(message, &fields)
    }
}

impl Operator for UbxHiResOffsetOperator {
    fn operate(&self, mut message: Message) -> (Status, Message) {
        let status = Status::from(&self.apply(&mut message));
        (status, message)
    }
}

/// Picks the operator matching a message's protocol and precision
pub trait OperatorProvider: Send + Sync {
    /// Operator for `message`
    fn get_operator(&self, message: &Message) -> Result<&dyn Operator, GnssError>;
}

/// Offset operators for every supported encoding, sharing one offset source
pub struct OffsetOperatorProvider {
    nmea: NmeaOffsetOperator,
    ubx: UbxOffsetOperator,
    ubx_hires: UbxHiResOffsetOperator,
}

impl OffsetOperatorProvider {
    /// Operators for every encoding, all reading `offset`
    pub fn new(offset: Arc<dyn OffsetProvider>) -> Self {
        Self {
            nmea: NmeaOffsetOperator::new(offset.clone()),
            ubx: UbxOffsetOperator::new(offset.clone()),
            ubx_hires: UbxHiResOffsetOperator::new(offset),
        }
    }
}

impl OperatorProvider for OffsetOperatorProvider {
    fn get_operator(&self, message: &Message) -> Result<&dyn Operator, GnssError> {
        match (message.proto, &message.payload) {
            (ProtocolTag::Nmea, ParsedPayload::Nmea(_)) => Ok(&self.nmea),
            (ProtocolTag::Ubx, ParsedPayload::Ubx(msg)) if msg.is_high_precision() => {
                Ok(&self.ubx_hires)
            }
            (ProtocolTag::Ubx, ParsedPayload::Ubx(_)) => Ok(&self.ubx),
            _ => Err(unsupported(message)),
        }
    }
}
