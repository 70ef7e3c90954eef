/// Linear mapping of a value between two closed intervals
///
/// `value' = ((value - a) * (d - c)) / (b - a) + c` for `[a, b]` -> `[c, d]`.
/// The source interval must not be degenerate (`a != b`).
use std::ops::RangeInclusive;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("source range is degenerate, its bounds are equal")]
    DegenerateRange,

    #[error("value or range bound is not a finite number")]
    NotFinite,

    #[error("converted value does not fit the destination type")]
    OutOfBounds,
}

pub trait RangeConvert: Copy {
    fn convert(
        self,
        in_range: RangeInclusive<Self>,
        to_range: RangeInclusive<Self>,
    ) -> Result<Self, RangeError>;
}

macro_rules! impl_float_convert {
    ($($t:ty),*) => {$(
        impl RangeConvert for $t {
            fn convert(
                self,
                in_range: RangeInclusive<Self>,
                to_range: RangeInclusive<Self>,
            ) -> Result<Self, RangeError> {
                let (a, b) = in_range.into_inner();
                let (c, d) = to_range.into_inner();
                if ![self, a, b, c, d].iter().all(|v| v.is_finite()) {
                    return Err(RangeError::NotFinite);
                }
                if a == b {
                    return Err(RangeError::DegenerateRange);
                }
                Ok(((self - a) * (d - c)) / (b - a) + c)
            }
        }
    )*};
}

// Integers go through i128 so `(value - a) * (d - c)` cannot overflow.
macro_rules! impl_int_convert {
    ($($t:ty),*) => {$(
        impl RangeConvert for $t {
            fn convert(
                self,
                in_range: RangeInclusive<Self>,
                to_range: RangeInclusive<Self>,
            ) -> Result<Self, RangeError> {
                let (a, b) = in_range.into_inner();
                let (c, d) = to_range.into_inner();
                if a == b {
                    return Err(RangeError::DegenerateRange);
                }
                let (v, a, b, c, d) = (self as i128, a as i128, b as i128, c as i128, d as i128);
                let mapped = ((v - a) * (d - c)) / (b - a) + c;
                <$t>::try_from(mapped).map_err(|_| RangeError::OutOfBounds)
            }
        }
    )*};
}

impl_float_convert!(f32, f64);
impl_int_convert!(u8, u16, u32, i32, i64);

/// Free-function form of [`RangeConvert::convert`].
pub fn convert<T: RangeConvert>(
    value: T,
    in_range: RangeInclusive<T>,
    to_range: RangeInclusive<T>,
) -> Result<T, RangeError> {
    value.convert(in_range, to_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_unit_range() {
        assert_eq!(convert(0.0_f64, 0.0..=127.0, 0.0..=1.0), Ok(0.0));
        assert_eq!(convert(127.0_f64, 0.0..=127.0, 0.0..=1.0), Ok(1.0));
        let half = convert(8192.0_f64, 0.0..=16383.0, 0.0..=1.0).unwrap();
        assert!((half - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_float_round_trip() {
        for x in [0.0, 12.5, 63.0, 100.25, 127.0_f64] {
            let knob = convert(x, 0.0..=127.0, 0.0..=1.0).unwrap();
            let back = convert(knob, 0.0..=1.0, 0.0..=127.0).unwrap();
            assert!((back - x).abs() < 1e-9, "{x} came back as {back}");
        }
    }

    #[test]
    fn test_degenerate_range_is_rejected() {
        assert_eq!(
            convert(5.0_f64, 3.0..=3.0, 0.0..=1.0),
            Err(RangeError::DegenerateRange)
        );
        assert_eq!(convert(5_u8, 3..=3, 0..=127), Err(RangeError::DegenerateRange));
    }

    #[test]
    fn test_non_finite_is_rejected() {
        assert_eq!(
            convert(f64::NAN, 0.0..=1.0, 0.0..=127.0),
            Err(RangeError::NotFinite)
        );
        assert_eq!(
            convert(0.5_f32, 0.0..=f32::INFINITY, 0.0..=1.0),
            Err(RangeError::NotFinite)
        );
    }

    #[test]
    fn test_integer_wide_destination_does_not_overflow() {
        // 127 * 16383 overflows u16 but not the widened intermediate
        assert_eq!(convert(127_u16, 0..=127, 0..=16383), Ok(16383));
        assert_eq!(convert(64_u16, 0..=127, 0..=16383), Ok(8256));
        assert_eq!(convert(16383_u16, 0..=16383, 0..=127), Ok(127));
    }

    #[test]
    fn test_integer_truncates() {
        // 1 * 127 / 2 = 63.5
        assert_eq!(convert(1_u8, 0..=2, 0..=127), Ok(63));
    }

    #[test]
    fn test_integer_out_of_bounds() {
        assert_eq!(convert(300_u16, 0..=127, 0..=255), Ok(602));
        assert_eq!(convert(200_u8, 0..=127, 0..=255), Err(RangeError::OutOfBounds));
    }

    #[test]
    fn test_descending_destination() {
        assert_eq!(convert(0.25_f64, 0.0..=1.0, 1.0..=0.0), Ok(0.75));
        assert_eq!(convert(0_i32, 0..=10, 10..=-10), Ok(10));
    }
}
