//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Numeric semantics for the `integer` and `double` datatypes.
//!
//! `integer` is arbitrary precision; division truncates toward zero
//! and `mod` takes the sign of the dividend.  `double` follows
//! IEEE-754 binary64 with round-half-even; division by zero produces
//! an infinity or NaN rather than an error.

use super::LexicalError;
use crate::errors::{EvalResult, Indeterminate};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

/// Parse an XML Schema double lexical form.
pub(crate) fn parse_double(lexical: &str) -> Result<f64, LexicalError> {
    // XSD spells the special values INF/-INF/NaN; Rust's parser
    // accepts "inf"/"NaN" with different casing, so map explicitly.
    match lexical {
        "INF" | "+INF" => return Ok(f64::INFINITY),
        "-INF" => return Ok(f64::NEG_INFINITY),
        "NaN" => return Ok(f64::NAN),
        _ => {}
    }
    if lexical.chars().any(|c| c.is_ascii_alphabetic() && c != 'E' && c != 'e') {
        return Err(LexicalError::new("double", lexical));
    }
    lexical
        .parse::<f64>()
        .map_err(|_| LexicalError::new("double", lexical))
}

/// Print the canonical double form, round-tripping exactly.
#[must_use]
pub(crate) fn print_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d == f64::INFINITY {
        "INF".to_string()
    } else if d == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        let mut s = format!("{d}");
        // keep integral doubles distinguishable from integers
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.push_str(".0");
        }
        s
    }
}

/// Bit pattern used for value identity and hashing: all NaNs collapse
/// to one pattern and negative zero collapses to positive zero.
#[must_use]
pub(crate) fn double_bits(d: f64) -> u64 {
    if d.is_nan() {
        f64::NAN.to_bits()
    } else if d == 0.0 {
        0u64
    } else {
        d.to_bits()
    }
}

/// Integer division, truncating toward zero.
///
/// # Errors
///
/// `ProcessingError` on division by zero.
pub fn integer_divide(dividend: &BigInt, divisor: &BigInt) -> EvalResult<BigInt> {
    if divisor.is_zero() {
        return Err(Indeterminate::processing("integer-divide by zero"));
    }
    Ok(dividend / divisor)
}

/// Integer remainder; the result takes the sign of the dividend.
///
/// # Errors
///
/// `ProcessingError` on a zero divisor.
pub fn integer_mod(dividend: &BigInt, divisor: &BigInt) -> EvalResult<BigInt> {
    if divisor.is_zero() {
        return Err(Indeterminate::processing("integer-mod by zero"));
    }
    Ok(dividend % divisor)
}

#[must_use]
pub fn integer_abs(value: &BigInt) -> BigInt {
    value.abs()
}

/// Round half to even, the IEEE-754 roundTiesToEven rule.
#[must_use]
pub fn double_round(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let rounded = value.round(); // half away from zero
    if (value - value.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - value.signum()
    } else {
        rounded
    }
}

#[must_use]
pub fn double_floor(value: f64) -> f64 {
    value.floor()
}

/// Truncate a double toward zero and widen to integer.
///
/// # Errors
///
/// `ProcessingError` for NaN or infinite input.
pub fn double_to_integer(value: f64) -> EvalResult<BigInt> {
    if !value.is_finite() {
        return Err(Indeterminate::processing(
            "double-to-integer applied to a non-finite value",
        ));
    }
    BigInt::from_f64(value.trunc())
        .ok_or_else(|| Indeterminate::processing("double-to-integer conversion failed"))
}

/// Widen an integer to the nearest double.
#[must_use]
pub fn integer_to_double(value: &BigInt) -> f64 {
    value.to_f64().unwrap_or(f64::INFINITY)
}
