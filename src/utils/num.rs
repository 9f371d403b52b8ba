//! Numeric utilities: centralized integer conversions for paging values, counts and durations.
//!
//! Guidelines
//! - Prefer saturating conversions when clamping is safer than panicking or truncating
//!   (e.g., a skip value larger than the address space simply skips everything).

#[inline]
#[must_use]
pub fn u64_to_usize_saturating(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[inline]
#[must_use]
pub fn u64_to_i64_saturating(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn i64_to_u64_saturating_nonnegative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
