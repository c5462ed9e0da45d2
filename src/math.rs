//! Fixed decimal arithmetic.
//!
//! All coordinate math runs on [`Decimal`] through the checked helpers in this
//! module. Results are rounded half-even to the process wide precision and
//! any rounding that drops digits is reported as [`OperationError::Inexact`]
//! unless it happens inside an [`allow_inexact`] scope. Transcendental
//! functions and ratios open such a scope themselves.
use std::{
    cell::Cell,
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use lazy_static::lazy_static;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::OperationError;

/// Significant digits used when no precision is configured
pub const DEFAULT_PRECISION: u32 = 24;
/// Most significant digits a [`Decimal`] can hold
pub const MAX_PRECISION: u32 = 28;
/// Most fractional digits a [`Decimal`] can hold
pub const MAX_SCALE: u32 = 28;
/// WGS-84 semi-major axis in meters
pub const WGS84_EQUATORIAL_RADIUS: Decimal = Decimal::from_parts(6378137, 0, 0, false, 0);
/// WGS-84 semi-minor axis in meters
pub const WGS84_POLAR_RADIUS: Decimal = Decimal::from_parts(2061785018, 1, 0, false, 3);

const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;
const MAX_NEWTON_STEPS: usize = 200;

static PRECISION: AtomicU32 = AtomicU32::new(DEFAULT_PRECISION);

thread_local! {
    static INEXACT_SCOPES: Cell<u32> = const { Cell::new(0) };
}

lazy_static! {
    static ref PI_CACHE: Mutex<HashMap<u32, Decimal>> = Mutex::new(HashMap::new());
}

/// Current precision in significant digits
pub fn precision() -> u32 {
    PRECISION.load(Ordering::Relaxed)
}

/// Set the process wide precision, meant to be called once at startup
pub fn set_precision(digits: u32) -> Result<(), OperationError> {
    if digits == 0 || digits > MAX_PRECISION {
        return Err(OperationError::InvalidOperation(format!(
            "precision must be within 1..={MAX_PRECISION}, got {digits}"
        )));
    }
    PRECISION.store(digits, Ordering::Relaxed);
    Ok(())
}

struct InexactScope;

impl InexactScope {
    fn enter() -> Self {
        INEXACT_SCOPES.with(|scopes| scopes.set(scopes.get() + 1));
        InexactScope
    }
}

impl Drop for InexactScope {
    fn drop(&mut self) {
        INEXACT_SCOPES.with(|scopes| scopes.set(scopes.get().saturating_sub(1)));
    }
}

/// Run `f` with the inexact trap disabled.
///
/// The scope is tied to the current thread, so `f` must not suspend.
pub fn allow_inexact<R>(f: impl FnOnce() -> R) -> R {
    let _scope = InexactScope::enter();
    f()
}

/// Whether the calling code runs inside an [`allow_inexact`] scope
pub fn inexact_allowed() -> bool {
    INEXACT_SCOPES.with(|scopes| scopes.get() > 0)
}

/// Digits of the mantissa, trailing zeros included
fn significant_digits(value: Decimal) -> u32 {
    value
        .mantissa()
        .unsigned_abs()
        .checked_ilog10()
        .map_or(0, |digits| digits + 1)
}

/// Round to the context precision, trapping on lost digits.
///
/// Values already within the precision are returned as is: padding them
/// to the full precision could push small magnitudes past [`MAX_SCALE`].
pub fn round(value: Decimal) -> Result<Decimal, OperationError> {
    if significant_digits(value) <= precision() {
        return Ok(value);
    }
    let rounded = value
        .round_sf_with_strategy(precision(), ROUNDING)
        .filter(|rounded| rounded.scale() <= MAX_SCALE)
        .ok_or(OperationError::Overflow)?;
    if rounded != value && !inexact_allowed() {
        return Err(OperationError::Inexact);
    }
    Ok(rounded)
}

/// Checked `a + b`
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal, OperationError> {
    round(a.checked_add(b).ok_or(OperationError::Overflow)?)
}

/// Checked `a - b`
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal, OperationError> {
    round(a.checked_sub(b).ok_or(OperationError::Overflow)?)
}

/// Checked `a * b`
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal, OperationError> {
    round(a.checked_mul(b).ok_or(OperationError::Overflow)?)
}

/// Checked `a / b`
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal, OperationError> {
    if b.is_zero() {
        return Err(OperationError::DivByZero);
    }
    round(a.checked_div(b).ok_or(OperationError::Overflow)?)
}

/// Pi at the current precision, computed once per precision with Machin's formula
pub fn pi() -> Result<Decimal, OperationError> {
    let digits = precision();
    if let Some(pi) = PI_CACHE.lock().ok().and_then(|cache| cache.get(&digits).copied()) {
        return Ok(pi);
    }
    let pi = allow_inexact(|| {
        let a = atan_inverse(5)?;
        let b = atan_inverse(239)?;
        sub(mul(Decimal::from(16), a)?, mul(Decimal::from(4), b)?)
    })?;
    if let Ok(mut cache) = PI_CACHE.lock() {
        cache.insert(digits, pi);
    }
    Ok(pi)
}

/// `atan(1 / x)` by its Taylor series
fn atan_inverse(x: u32) -> Result<Decimal, OperationError> {
    let x = Decimal::from(x);
    let x2 = mul(x, x)?;
    let mut power = div(Decimal::ONE, x)?;
    let mut sum = power;
    let mut k: u32 = 1;
    loop {
        power = div(power, x2)?;
        let term = div(power, Decimal::from(2 * k + 1))?;
        let next = if k % 2 == 1 {
            sub(sum, term)?
        } else {
            add(sum, term)?
        };
        if next == sum {
            return Ok(sum);
        }
        sum = next;
        k += 1;
    }
}

/// Bring an angle into `[-pi, pi]`
fn reduce_angle(x: Decimal) -> Result<Decimal, OperationError> {
    let pi = pi()?;
    let two_pi = mul(Decimal::TWO, pi)?;
    let mut r = x.checked_rem(two_pi).ok_or(OperationError::Overflow)?;
    if r > pi {
        r = sub(r, two_pi)?;
    } else if r < -pi {
        r = add(r, two_pi)?;
    }
    Ok(r)
}

/// Sum `first + first*f(1) + first*f(1)*f(2) + ...` until the partial sums
/// stop changing at the current precision
fn taylor(
    first: Decimal,
    mut ratio: impl FnMut(u32) -> Result<Decimal, OperationError>,
) -> Result<Decimal, OperationError> {
    let mut term = first;
    let mut sum = first;
    let mut n = 1;
    loop {
        term = mul(term, ratio(n)?)?;
        let next = add(sum, term)?;
        if next == sum {
            return Ok(sum);
        }
        sum = next;
        n += 1;
    }
}

/// Sine of an angle in radians
pub fn sin(x: Decimal) -> Result<Decimal, OperationError> {
    allow_inexact(|| {
        let x = reduce_angle(x)?;
        let x2 = mul(x, x)?;
        taylor(x, |n| {
            let k = Decimal::from(2 * n);
            div(-x2, mul(k, k + Decimal::ONE)?)
        })
    })
}

/// Cosine of an angle in radians
pub fn cos(x: Decimal) -> Result<Decimal, OperationError> {
    allow_inexact(|| {
        let x = reduce_angle(x)?;
        let x2 = mul(x, x)?;
        taylor(Decimal::ONE, |n| {
            let k = Decimal::from(2 * n);
            div(-x2, mul(k - Decimal::ONE, k)?)
        })
    })
}

/// `e` raised to `x`
pub fn exp(x: Decimal) -> Result<Decimal, OperationError> {
    allow_inexact(|| taylor(Decimal::ONE, |n| div(x, Decimal::from(n))))
}

/// Square root by Newton iteration
pub fn sqrt(x: Decimal) -> Result<Decimal, OperationError> {
    if x.is_sign_negative() && !x.is_zero() {
        return Err(OperationError::InvalidOperation(format!(
            "square root of negative number {x}"
        )));
    }
    if x.is_zero() {
        return Ok(Decimal::ZERO);
    }
    allow_inexact(|| {
        let mut guess = x
            .to_f64()
            .and_then(|f| Decimal::from_f64(f.sqrt()))
            .filter(|g| !g.is_zero())
            .unwrap_or(x);
        let mut previous = Decimal::ZERO;
        for _ in 0..MAX_NEWTON_STEPS {
            let next = div(add(guess, div(x, guess)?)?, Decimal::TWO)?;
            // rounding can leave the iteration bouncing between two neighbours
            if next == guess || next == previous {
                return Ok(next.min(guess));
            }
            previous = guess;
            guess = next;
        }
        Ok(guess)
    })
}

/// Degrees to radians
pub fn deg_to_rad(degrees: Decimal) -> Result<Decimal, OperationError> {
    allow_inexact(|| div(mul(degrees, pi()?)?, Decimal::from(180)))
}

/// Round to at most `max_places` fractional digits, strip trailing zeros and
/// pad back to at least `min_places`
pub fn normalize_fraction(value: Decimal, min_places: u32, max_places: u32) -> Decimal {
    let mut normalized = value.round_dp_with_strategy(max_places, ROUNDING).normalize();
    if normalized.scale() < min_places {
        normalized.rescale(min_places);
    }
    normalized
}

/// Number of digits left of the decimal point, zero for values below one
pub fn integer_digits(value: Decimal) -> u32 {
    let mut integer = value.abs().trunc();
    let mut digits = 0;
    while !integer.is_zero() {
        integer = (integer / Decimal::TEN).trunc();
        digits += 1;
    }
    digits
}

/// Fit `value` into a window of `left_digits` integer digits and exactly
/// `right_digits` fractional digits
pub fn adjust(value: Decimal, left_digits: u32, right_digits: u32) -> Result<Decimal, OperationError> {
    let mut adjusted = value.round_dp_with_strategy(right_digits, ROUNDING);
    adjusted.rescale(right_digits);
    let digits = integer_digits(adjusted);
    if digits > left_digits {
        return Err(OperationError::Precision(format!(
            "{value} has {digits} integer digits, at most {left_digits} allowed"
        )));
    }
    Ok(adjusted)
}

/// Geodetic `(lat, lon, alt)` in degrees and meters to WGS-84 ECEF meters
pub fn geodetic_to_ecef(
    lat: Decimal,
    lon: Decimal,
    alt: Decimal,
) -> Result<[Decimal; 3], OperationError> {
    allow_inexact(|| {
        let a = WGS84_EQUATORIAL_RADIUS;
        let b = WGS84_POLAR_RADIUS;
        let e2 = sub(Decimal::ONE, div(mul(b, b)?, mul(a, a)?)?)?;
        let phi = deg_to_rad(lat)?;
        let lambda = deg_to_rad(lon)?;
        let (sin_phi, cos_phi) = (sin(phi)?, cos(phi)?);
        let (sin_lambda, cos_lambda) = (sin(lambda)?, cos(lambda)?);
        let n = div(
            a,
            sqrt(sub(Decimal::ONE, mul(e2, mul(sin_phi, sin_phi)?)?)?)?,
        )?;
        let x = mul(mul(add(n, alt)?, cos_phi)?, cos_lambda)?;
        let y = mul(mul(add(n, alt)?, cos_phi)?, sin_lambda)?;
        let z = mul(add(mul(n, sub(Decimal::ONE, e2)?)?, alt)?, sin_phi)?;
        Ok([x, y, z])
    })
}

/// Euclidean distance between two points of the same arity
pub fn distance(p1: &[Decimal], p2: &[Decimal]) -> Result<Decimal, OperationError> {
    if p1.len() != p2.len() {
        return Err(OperationError::InvalidOperation(format!(
            "cannot measure distance between {}-d and {}-d points",
            p1.len(),
            p2.len()
        )));
    }
    allow_inexact(|| {
        let mut sum = Decimal::ZERO;
        for (a, b) in p1.iter().zip(p2) {
            let d = sub(*a, *b)?;
            sum = add(sum, mul(d, d)?)?;
        }
        sqrt(sum)
    })
}
