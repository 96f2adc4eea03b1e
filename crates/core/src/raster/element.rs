//! Cell value types a grid can hold.

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Numeric types usable as raster cells.
///
/// Reducers and index math run in f64, so every element must round-trip
/// through [`to_f64`](RasterElement::to_f64). Nodata is a per-raster
/// sentinel; floats additionally treat NaN as nodata whether or not a
/// sentinel is declared.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Sentinel used when a file declares no nodata value of its own.
    fn default_nodata() -> Self;

    /// Whether this value is masked out under the given sentinel.
    fn is_nodata(self, nodata: Option<Self>) -> bool;

    /// Widen to f64 for computation.
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Narrow from f64, if representable.
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

macro_rules! int_element {
    ($($t:ty),+) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(self, nodata: Option<Self>) -> bool {
                nodata.is_some_and(|nd| self == nd)
            }
        }
    )+};
}

macro_rules! float_element {
    ($($t:ty),+) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            // Sentinel comparison is exact, with no tolerance.
            fn is_nodata(self, nodata: Option<Self>) -> bool {
                self.is_nan() || nodata.is_some_and(|nd| self == nd)
            }
        }
    )+};
}

int_element!(i8, i16, i32, i64, u8, u16, u32, u64);
float_element!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(f64::NAN.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn float_sentinel_matches_exactly() {
        assert!((-9999.0f64).is_nodata(Some(-9999.0)));
        assert!(!(-9998.9999f64).is_nodata(Some(-9999.0)));
        assert!(!1.5f64.is_nodata(None));
    }

    #[test]
    fn integer_sentinel() {
        assert!(0u8.is_nodata(Some(0)));
        assert!(!0u8.is_nodata(None));
        assert_eq!(i16::default_nodata(), i16::MIN);
    }
}
