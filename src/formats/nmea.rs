//! NMEA degree-minute notation (`ddmm.mmmmm`, `dddmm.mmmmm`).
use std::str::FromStr;

use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use super::Axis;
use crate::{
    error::OperationError,
    math::{self, adjust, allow_inexact, integer_digits, normalize_fraction},
};

/// Fractional minute digits in standard sentences
pub const STANDARD_PRECISION: u32 = 5;
/// Fractional minute digits in high precision mode
pub const HIGH_PRECISION: u32 = 7;

const MINUTES_PER_DEGREE: Decimal = Decimal::from_parts(60, 0, 0, false, 0);

fn parse_decimal(value: &str) -> Result<Decimal, OperationError> {
    Decimal::from_str(value)
        .map_err(|e| OperationError::InvalidOperation(format!("'{value}' is not a number: {e}")))
}

/// Whether a degree-minute string carries more than the standard five
/// fractional minute digits
pub fn is_highpres(value: &str) -> bool {
    value
        .split_once('.')
        .map(|(_, fraction)| fraction.len() > STANDARD_PRECISION as usize)
        .unwrap_or(false)
}

/// `dddmm.mmmmm` plus hemisphere to signed decimal degrees.
///
/// The last two integer digits are minutes, everything before them degrees.
/// Empty input reads as zero.
pub fn degmins_to_decdeg(value: &str, direction: &str) -> Result<Decimal, OperationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let integer_len = value.find('.').unwrap_or(value.len());
    let split = integer_len.saturating_sub(2);
    let (degrees, minutes) = value.split_at(split);
    let degrees = if degrees.is_empty() {
        Decimal::ZERO
    } else {
        parse_decimal(degrees)?
    };
    let minutes = parse_decimal(minutes)?;
    let decdeg = allow_inexact(|| math::add(degrees, math::div(minutes, MINUTES_PER_DEGREE)?))?;
    Ok(match direction {
        "S" | "W" => -decdeg,
        _ => decdeg,
    })
}

/// Signed decimal degrees to a degree-minute string and hemisphere.
///
/// Minutes are written with 5 fractional digits, or 7 when `hipres` is set,
/// rounded half-even.
pub fn decdeg_to_degmins(
    value: Decimal,
    axis: Axis,
    hipres: bool,
) -> Result<(String, &'static str), OperationError> {
    let direction = axis.direction(value.is_sign_negative() && !value.is_zero());
    let places = if hipres {
        HIGH_PRECISION
    } else {
        STANDARD_PRECISION
    };
    let absolute = value.abs();
    let mut degrees = absolute.trunc();
    let fraction = math::sub(absolute, degrees)?;
    let minutes = allow_inexact(|| math::mul(fraction, MINUTES_PER_DEGREE))?;
    let mut minutes = adjust(minutes, 2, places)?;
    if minutes >= MINUTES_PER_DEGREE {
        // rounding pushed the minutes over, carry into the degrees
        minutes = adjust(minutes - MINUTES_PER_DEGREE, 2, places)?;
        degrees += Decimal::ONE;
    }
    let width = axis.degree_width();
    if integer_digits(degrees) > width {
        return Err(OperationError::Precision(format!(
            "{value} does not fit in {width} degree digits"
        )));
    }
    let degrees = degrees.to_u32().ok_or(OperationError::Overflow)?;
    let formatted = format!(
        "{:0dw$}{:0>mw$}",
        degrees,
        minutes.to_string(),
        dw = width as usize,
        mw = 3 + places as usize
    );
    Ok((formatted, direction))
}

/// Altitude field in meters
pub fn height_from_field(value: &str) -> Result<Decimal, OperationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    parse_decimal(value)
}

/// Meters to an altitude field replacing `current`.
///
/// The field keeps at least as many fractional digits as `current` has, and
/// never less than one. Up to three are written when the value needs them.
pub fn height_to_field(value: Decimal, current: &str) -> String {
    let places = current
        .trim()
        .split_once('.')
        .map_or(1, |(_, fraction)| fraction.len() as u32)
        .max(1);
    normalize_fraction(value, places, places.max(3)).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn high_precision_detection() {
        assert!(is_highpres("12319.943281"));
        assert!(!is_highpres("4238.96342"));
        assert!(!is_highpres(""));
        assert!(!is_highpres("4238"));
    }

    #[test]
    fn degree_minutes_to_decimal() {
        let value = degmins_to_decdeg("12319.943281", "E").unwrap();
        assert!((value - dec("123.33238801666666666")).abs() < dec("1e-17"));
        let value = degmins_to_decdeg("4238.96342", "S").unwrap();
        assert!((value + dec("42.649390333333333")).abs() < dec("1e-15"));
        assert_eq!(degmins_to_decdeg("", "N").unwrap(), Decimal::ZERO);
        assert_eq!(degmins_to_decdeg("0000.00000", "W").unwrap(), Decimal::ZERO);
        assert_eq!(degmins_to_decdeg("30.0", "N").unwrap(), dec("0.5"));
        assert!(degmins_to_decdeg("12x19.9", "N").is_err());
    }

    #[test]
    fn decimal_to_degree_minutes() {
        let value = degmins_to_decdeg("12319.943281", "E").unwrap();
        assert_eq!(
            decdeg_to_degmins(value, Axis::Lon, true).unwrap(),
            ("12319.9432810".to_string(), "E")
        );
        assert_eq!(
            decdeg_to_degmins(dec("-5.5"), Axis::Lat, false).unwrap(),
            ("0530.00000".to_string(), "S")
        );
        assert_eq!(
            decdeg_to_degmins(Decimal::ZERO, Axis::Lon, false).unwrap(),
            ("00000.00000".to_string(), "E")
        );
    }

    #[test]
    fn minute_rounding_carries_into_degrees() {
        assert_eq!(
            decdeg_to_degmins(dec("10.9999999999"), Axis::Lat, false).unwrap(),
            ("1100.00000".to_string(), "N")
        );
    }

    #[test]
    fn too_many_degree_digits_fail() {
        assert!(matches!(
            decdeg_to_degmins(dec("123.5"), Axis::Lat, false),
            Err(OperationError::Precision(_))
        ));
    }

    #[test]
    fn round_trip_at_advertised_precision() {
        for (field, direction, axis, hipres) in [
            ("4238.96342", "N", Axis::Lat, false),
            ("07118.97943", "W", Axis::Lon, false),
            ("0000.00001", "S", Axis::Lat, false),
            ("17959.99999", "E", Axis::Lon, false),
            ("8959.9999999", "S", Axis::Lat, true),
            ("00000.0000001", "W", Axis::Lon, true),
        ] {
            let decdeg = degmins_to_decdeg(field, direction).unwrap();
            assert_eq!(
                decdeg_to_degmins(decdeg, axis, hipres).unwrap(),
                (field.to_string(), direction)
            );
        }
    }

    #[test]
    fn height_fields() {
        assert_eq!(height_from_field("36.7").unwrap(), dec("36.7"));
        assert_eq!(height_from_field("").unwrap(), Decimal::ZERO);
        assert_eq!(height_to_field(dec("36.7"), "36.7"), "36.7");
        assert_eq!(height_to_field(dec("37.95"), "36.7"), "37.95");
        assert_eq!(height_to_field(dec("-33"), "-33.0"), "-33.0");
        assert_eq!(height_to_field(dec("-33"), "-33"), "-33.0");
        assert_eq!(height_to_field(dec("1.23456"), "1.2"), "1.235");
    }

    #[test]
    fn height_field_keeps_its_fraction_width() {
        assert_eq!(height_to_field(dec("36.700"), "36.700"), "36.700");
        assert_eq!(height_to_field(dec("37.950"), "36.700"), "37.950");
        assert_eq!(height_to_field(dec("1.23456"), "0.00000"), "1.23456");
        assert_eq!(height_to_field(dec("12"), "11.0000"), "12.0000");
    }
}
