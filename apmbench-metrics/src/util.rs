use std::time::Duration;

/// Whole milliseconds in `d`, truncated. Saturates at `u64::MAX`.
pub fn dur_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truncates_sub_millisecond_part() {
        assert_eq!(dur_to_millis(Duration::from_micros(1999)), 1);
        assert_eq!(dur_to_millis(Duration::from_millis(250)), 250);
        assert_eq!(dur_to_millis(Duration::from_nanos(999_999)), 0);
    }

    #[test]
    fn saturates() {
        assert_eq!(dur_to_millis(Duration::MAX), u64::MAX);
    }
}
