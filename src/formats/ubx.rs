//! UBX integer coordinate fields.
//!
//! Angles are a 32-bit base in 1e-7 degrees plus, in the high precision
//! messages, an 8-bit refinement in 1e-9 degrees. Heights are a base in
//! millimeters plus a refinement in tenths of a millimeter.
use num_traits::{Signed, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::OperationError;

/// Refinement magnitude at which lat/lon corrections fold into the base
pub const LATLON_MIDPOINT: i64 = 50;
/// Refinement magnitude at which height corrections fold into the base
pub const HEIGHT_MIDPOINT: i64 = 5;

const ANGLE_SCALE: u32 = 7;
const ANGLE_HP_SCALE: u32 = 9;
const HEIGHT_SCALE: u32 = 3;
const HEIGHT_HP_SCALE: u32 = 4;

/// `base * 1e-7 + hires * 1e-9` degrees
pub fn integer_to_decdeg(base: i64, hires: i64) -> Decimal {
    Decimal::new(base, ANGLE_SCALE) + Decimal::new(hires, ANGLE_HP_SCALE)
}

/// `base_mm * 1e-3 + hires * 1e-4` meters
pub fn height_from_field(base_mm: i64, hires: i64) -> Decimal {
    Decimal::new(base_mm, HEIGHT_SCALE) + Decimal::new(hires, HEIGHT_HP_SCALE)
}

/// Multiply by `10^digits` without touching the mantissa when possible
fn shift_left(value: Decimal, digits: u32) -> Result<Decimal, OperationError> {
    if value.scale() >= digits {
        let mut shifted = value;
        shifted
            .set_scale(value.scale() - digits)
            .map_err(|e| OperationError::InvalidOperation(e.to_string()))?;
        Ok(shifted)
    } else {
        value
            .checked_mul(Decimal::from(10i64.pow(digits)))
            .ok_or(OperationError::Overflow)
    }
}

/// Split `value * 10^base_digits` into its integer part and the fraction
/// scaled by `10^hires_digits`, rounded half-even.
///
/// A fraction that rounds up to a whole unit carries into the base. Both
/// components keep the sign of `value`.
fn split(value: Decimal, base_digits: u32, hires_digits: u32) -> Result<(i64, i64), OperationError> {
    let scaled = shift_left(value, base_digits)?;
    let mut base = scaled.trunc();
    let fraction = scaled - base;
    let mut hires = shift_left(fraction, hires_digits)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    let unit = Decimal::from(10i64.pow(hires_digits));
    if hires.abs() >= unit {
        let carry = hires.signum();
        base += carry;
        hires -= carry * unit;
    }
    Ok((
        base.to_i64().ok_or(OperationError::Overflow)?,
        hires.to_i64().ok_or(OperationError::Overflow)?,
    ))
}

/// Degrees to `(base, hires)` in 1e-7 and 1e-9 degrees
pub fn decdeg_to_integer(value: Decimal) -> Result<(i64, i64), OperationError> {
    split(value, ANGLE_SCALE, ANGLE_HP_SCALE - ANGLE_SCALE)
}

/// Meters to `(base_mm, hires)` in millimeters and tenths of a millimeter
pub fn height_to_field(value: Decimal) -> Result<(i64, i64), OperationError> {
    split(value, HEIGHT_SCALE, HEIGHT_HP_SCALE - HEIGHT_SCALE)
}

/// Fold a refinement of magnitude `midpoint` or more into the base.
///
/// The base moves one unit away from zero and the refinement by
/// `2 * midpoint` towards it, so the represented value is unchanged. Bases at
/// the i32 limits are left alone. Base and refinement signs must agree.
pub fn minimize_correction(base: i64, hires: i64, midpoint: i64) -> Result<(i64, i64), OperationError> {
    if base != 0 && hires != 0 && base.signum() != hires.signum() {
        return Err(OperationError::InvalidOperation(format!(
            "base {base} and correction {hires} have different signs"
        )));
    }
    if hires.abs() < midpoint || base == i32::MAX as i64 || base == i32::MIN as i64 {
        return Ok((base, hires));
    }
    let sign = if base != 0 { base.signum() } else { hires.signum() };
    Ok((base + sign, hires - 2 * midpoint * sign))
}
