//! Conversions between wire coordinate encodings and decimal degrees.
pub mod nmea;
pub mod ubx;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Coordinate axis of a degree value
pub enum Axis {
    /// Latitude, `N`/`S`
    Lat,
    /// Longitude, `E`/`W`
    Lon,
}

impl Axis {
    /// Digits used for whole degrees in degree-minute notation
    pub fn degree_width(self) -> u32 {
        match self {
            Axis::Lat => 2,
            Axis::Lon => 3,
        }
    }

    /// Hemisphere letter for a value of the given sign
    pub fn direction(self, negative: bool) -> &'static str {
        match (self, negative) {
            (Axis::Lat, false) => "N",
            (Axis::Lat, true) => "S",
            (Axis::Lon, false) => "E",
            (Axis::Lon, true) => "W",
        }
    }
}
