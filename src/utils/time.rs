use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return millisecond
pub(crate) fn get_now_as_u128() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// return millisecond as i64, the unit store timestamps use
pub(crate) fn get_now_as_i64() -> i64 {
    i64::try_from(get_now_as_u128()).unwrap_or(i64::MAX)
}

/// Remaining part of `budget` after `elapsed`, saturating at zero.
pub(crate) fn remaining(
    budget: std::time::Duration,
    elapsed: std::time::Duration,
) -> std::time::Duration {
    budget.saturating_sub(elapsed)
}
