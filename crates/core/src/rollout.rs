//! Percentage rollout and device targeting.

use crate::bundle::Bundle;

/// Stable bucket in `0..100` for a device id.
///
/// 31-multiplier string hash over UTF-16 code units with 32-bit wrapping, so
/// the same device lands in the same bucket on every server and client.
pub fn device_bucket(device_id: &str) -> u32 {
    let hash = device_id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    (hash % 100).unsigned_abs()
}

/// Whether a device may receive `bundle`.
///
/// An explicit device list wins over the percentage.
pub fn is_device_eligible(bundle: &Bundle, device_id: &str) -> bool {
    if let Some(ids) = bundle.target_device_ids.as_ref().filter(|ids| !ids.is_empty()) {
        return ids.iter().any(|id| id == device_id);
    }
    match bundle.rollout_percentage {
        pct if pct >= 100 => true,
        0 => false,
        pct => device_bucket(device_id) < u32::from(pct),
    }
}
