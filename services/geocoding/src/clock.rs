//! Deadline arithmetic on the tokio clock

use std::time::Duration;
use tokio::time::Instant;

/// Used in place of deadlines that do not fit on the clock (~30 years)
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + span`, saturating to [`FAR_FUTURE`] for spans such as
/// `Duration::MAX`
pub fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .unwrap_or_else(|| start + FAR_FUTURE)
}
