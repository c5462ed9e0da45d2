//! Offset and meters/degrees conversion providers.
use rust_decimal::Decimal;

use crate::{
    error::GnssError,
    geo::{ConversionFactor, EulerAngles, GeoCoordinates},
    math::{self, allow_inexact},
};

/// Source of the offset added to every qualifying position
pub trait OffsetProvider: Send + Sync {
    /// Current offset
    fn get_offset(&self) -> Result<GeoCoordinates, GnssError>;
}

/// Source of device orientation
pub trait OrientationProvider: Send + Sync {
    /// Current orientation
    fn get_orientation(&self) -> Result<EulerAngles, GnssError>;
}

/// Source of per-axis conversion factors
pub trait ConversionFactorProvider: Send + Sync {
    /// Current factors
    fn get_factor(&self) -> Result<ConversionFactor, GnssError>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Always the same offset
pub struct StaticOffsetProvider(pub GeoCoordinates);

impl OffsetProvider for StaticOffsetProvider {
    fn get_offset(&self) -> Result<GeoCoordinates, GnssError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Always the same orientation
pub struct StaticOrientationProvider(pub EulerAngles);

impl OrientationProvider for StaticOrientationProvider {
    fn get_orientation(&self) -> Result<EulerAngles, GnssError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
/// Always the same factor
pub struct StaticConversionFactorProvider(pub ConversionFactor);

impl ConversionFactorProvider for StaticConversionFactorProvider {
    fn get_factor(&self) -> Result<ConversionFactor, GnssError> {
        Ok(self.0)
    }
}

/// Offset in meters of a point at distance `radius` from the antenna along
/// the device's vertical axis, given the device orientation
pub struct OrientationOffsetProvider<O> {
    orientation: O,
    radius: Decimal,
}

impl<O: OrientationProvider> OrientationOffsetProvider<O> {
    /// Provider for a point `radius` meters away
    pub fn new(orientation: O, radius: Decimal) -> Self {
        Self {
            orientation,
            radius,
        }
    }
}

impl<O: OrientationProvider> OffsetProvider for OrientationOffsetProvider<O> {
    fn get_offset(&self) -> Result<GeoCoordinates, GnssError> {
        let EulerAngles { yaw, pitch, roll } = self.orientation.get_orientation()?;
        let r = self.radius;
        let offset = allow_inexact(|| -> Result<GeoCoordinates, GnssError> {
            let (sin_yaw, cos_yaw) = (math::sin(yaw)?, math::cos(yaw)?);
            let (sin_pitch, cos_pitch) = (math::sin(pitch)?, math::cos(pitch)?);
            let (sin_roll, cos_roll) = (math::sin(roll)?, math::cos(roll)?);
            let lat = math::mul(
                r,
                math::add(
                    math::mul(sin_roll, sin_yaw)?,
                    math::mul(math::mul(cos_roll, cos_yaw)?, sin_pitch)?,
                )?,
            )?;
            let lon = -math::mul(
                r,
                math::sub(
                    math::mul(sin_roll, cos_yaw)?,
                    math::mul(math::mul(cos_roll, sin_pitch)?, sin_yaw)?,
                )?,
            )?;
            let alt = math::mul(r, math::mul(cos_roll, cos_pitch)?)?;
            Ok(GeoCoordinates { lat, lon, alt })
        })?;
        Ok(offset)
    }
}

/// Meters per degree of latitude and longitude around a reference point,
/// measured as the ECEF chord of one arc minute on each axis
#[derive(Debug, Clone, Copy)]
pub struct DistAngleFactorProvider {
    factor: ConversionFactor,
}

impl DistAngleFactorProvider {
    /// Measure the factors at `reference`
    pub fn new(reference: GeoCoordinates) -> Result<Self, GnssError> {
        let factor = allow_inexact(|| -> Result<ConversionFactor, GnssError> {
            let minute = math::div(Decimal::ONE, Decimal::from(60))?;
            let GeoCoordinates { lat, lon, alt } = reference;
            let p0 = math::geodetic_to_ecef(lat, lon, alt)?;
            let p1 = math::geodetic_to_ecef(math::add(lat, minute)?, lon, alt)?;
            let p2 = math::geodetic_to_ecef(lat, math::add(lon, minute)?, alt)?;
            Ok(ConversionFactor {
                lat: math::div(math::distance(&p0, &p1)?, minute)?,
                lon: math::div(math::distance(&p0, &p2)?, minute)?,
            })
        })?;
        log::debug!(
            "Meters per degree at {reference:?}: lat {}, lon {}",
            factor.lat,
            factor.lon
        );
        Ok(Self { factor })
    }
}

impl ConversionFactorProvider for DistAngleFactorProvider {
    fn get_factor(&self) -> Result<ConversionFactor, GnssError> {
        Ok(self.factor)
    }
}

/// Reciprocal of another provider's factors; a zero factor stays zero
pub struct InverseFactorProvider<F>(pub F);

impl<F: ConversionFactorProvider> ConversionFactorProvider for InverseFactorProvider<F> {
    fn get_factor(&self) -> Result<ConversionFactor, GnssError> {
        let ConversionFactor { lat, lon } = self.0.get_factor()?;
        let invert = |value: Decimal| {
            if value.is_zero() {
                Ok(Decimal::ZERO)
            } else {
                allow_inexact(|| math::div(Decimal::ONE, value))
            }
        };
        Ok(ConversionFactor {
            lat: invert(lat)?,
            lon: invert(lon)?,
        })
    }
}

/// Offset whose horizontal components are scaled by a conversion factor
pub struct ConversionOffsetProvider<O, F> {
    offset: O,
    factor: F,
}

impl<O: OffsetProvider, F: ConversionFactorProvider> ConversionOffsetProvider<O, F> {
    /// Scale the offset of `offset` by the factors of `factor`
    pub fn new(offset: O, factor: F) -> Self {
        Self { offset, factor }
    }
}

impl<O: OffsetProvider, F: ConversionFactorProvider> OffsetProvider for ConversionOffsetProvider<O, F> {
    fn get_offset(&self) -> Result<GeoCoordinates, GnssError> {
        let offset = self.offset.get_offset()?;
        let factor = self.factor.get_factor()?;
        allow_inexact(|| -> Result<GeoCoordinates, GnssError> {
            Ok(GeoCoordinates {
                lat: math::mul(offset.lat, factor.lat)?,
                lon: math::mul(offset.lon, factor.lon)?,
                alt: offset.alt,
            })
        })
    }
}
