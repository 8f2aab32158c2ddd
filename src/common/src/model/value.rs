//! Special sample values.

/// Prometheus stale marker - special NaN value indicating a stale sample
/// Bit pattern: 0x7ff0000000000002
pub const STALE_NAN_BITS: u64 = 0x7ff0000000000002;

/// The stale marker as a sample value.
pub fn stale_nan() -> f64 {
    f64::from_bits(STALE_NAN_BITS)
}

/// Check if a sample value is a Prometheus stale marker
pub fn is_stale_nan(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BITS
}
