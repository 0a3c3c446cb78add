//! Decimal precision handling for gauge readings
//!
//! The gauge reports values with four decimal places. Readings decoded from
//! single-precision floats are rounded to that precision so that 0.75 stays
//! 0.75 instead of becoming 0.7500000000000001 after widening.

/// Number of decimal places kept for measurement values
pub const MEASUREMENT_PRECISION: u8 = 4;

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Widen a decoded single-precision reading and round it to measurement precision
pub fn measurement_value(raw: f32) -> f64 {
    round_to_precision(f64::from(raw), MEASUREMENT_PRECISION)
}
