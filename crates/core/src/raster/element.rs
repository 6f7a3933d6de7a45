//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Default no-data sentinel used when a source supplies none.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Trait for types that can be stored in a raster cell.
///
/// Bounds the storage type `T` and the mask element type `M` of a
/// [`Raster`](crate::raster::Raster). Both must be arithmetic types
/// convertible to and from `f64`, since headers and statistics are kept
/// in double precision.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// No-data sentinel to fall back on when a source supplies none
    fn default_nodata() -> Self;

    /// Whether this value equals the no-data sentinel.
    ///
    /// Validity is an exact match against the sentinel, not a tolerance
    /// test: a cell is valid iff `value != nodata`.
    fn is_nodata(&self, nodata: Self) -> bool {
        *self == nodata
    }

    /// Convert self to f64
    fn to_f64(self) -> f64;

    /// Convert an f64 header value into this type, saturating through
    /// `NumCast`; falls back to the default sentinel when the cast fails.
    fn from_f64(v: f64) -> Self {
        NumCast::from(v).unwrap_or_else(Self::default_nodata)
    }
}

macro_rules! impl_raster_element {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                DEFAULT_NODATA as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_raster_element!(i8);
impl_raster_element!(i16);
impl_raster_element!(i32);
impl_raster_element!(i64);
impl_raster_element!(u8);
impl_raster_element!(u16);
impl_raster_element!(u32);
impl_raster_element!(u64);
impl_raster_element!(f32);
impl_raster_element!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodata_exact_match() {
        let nd = f32::default_nodata();
        assert!(nd.is_nodata(nd));
        // A value close to, but not equal to, the sentinel stays valid.
        assert!(!(nd + 0.5).is_nodata(nd));
    }

    #[test]
    fn test_from_f64_roundtrip() {
        assert_eq!(i32::from_f64(-9999.0), -9999);
        assert_eq!(f64::from_f64(2.5), 2.5);
    }

    #[test]
    fn test_unsigned_default_nodata() {
        // -9999 cannot be represented; the cast saturates through NumCast
        // and falls back to the sentinel recursively, so just check it is
        // a stable value.
        assert_eq!(u8::default_nodata(), u8::default_nodata());
    }
}
