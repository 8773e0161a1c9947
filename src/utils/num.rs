//! Numeric utilities: safe and centralized integer conversions.

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    v as u64
}

#[inline]
#[must_use]
pub fn u64_to_usize(v: u64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    if v > u128::from(u64::MAX) { u64::MAX } else { v as u64 }
}

/// Numeric view of a bson value, `None` for non-numbers.
#[must_use]
pub fn bson_as_f64(v: &bson::Bson) -> Option<f64> {
    match v {
        bson::Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        bson::Bson::Int64(i) => Some(*i as f64),
        bson::Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Integer view of a bson value, `None` for non-integers.
#[must_use]
pub fn bson_as_i64(v: &bson::Bson) -> Option<i64> {
    match v {
        bson::Bson::Int32(i) => Some(i64::from(*i)),
        bson::Bson::Int64(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        bson::Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_to_usize_matches_std_try_from() {
        for &v in &[0u64, 1, 42, u64::from(u32::MAX) + 1] {
            assert_eq!(u64_to_usize(v), usize::try_from(v).ok());
        }
    }

    #[test]
    fn u128_to_u64_saturating_edges() {
        assert_eq!(u128_to_u64_saturating(0), 0);
        assert_eq!(u128_to_u64_saturating(u64::MAX as u128 + 1), u64::MAX);
    }

    #[test]
    fn bson_numeric_views() {
        assert_eq!(bson_as_f64(&bson::Bson::Int32(3)), Some(3.0));
        assert_eq!(bson_as_i64(&bson::Bson::Double(4.0)), Some(4));
        assert_eq!(bson_as_i64(&bson::Bson::Double(4.5)), None);
        assert_eq!(bson_as_f64(&bson::Bson::String("x".into())), None);
    }
}
