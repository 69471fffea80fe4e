//! Age-based eligibility rules shared by both cleanup jobs.

use chrono::{DateTime, Duration, Utc};

use crate::storage::{AccessTier, BlobItem};

const SECONDS_PER_DAY: i64 = 86_400;

/// A retention window expressed in whole days.
///
/// Items strictly older than the window are eligible for deletion. A window of
/// zero makes every item with a positive age eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    retention_days: u32,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Timestamps before this instant are past the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }

    /// The offset handed to `DATEADD(day, ?, GETDATE())`.
    pub fn day_offset(&self) -> i32 {
        // u32 -> i32 saturates; windows beyond ~5.8 million years are not meaningful.
        -(i32::try_from(self.retention_days).unwrap_or(i32::MAX))
    }

    /// Whether `timestamp` is older than the window, measured in whole days.
    pub fn is_expired(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        age_days(timestamp, now) > i64::from(self.retention_days)
    }

    /// Whether a blob should be deleted: it must sit in the Archive tier and be
    /// older than the window. Blobs without a reported tier are never deleted.
    pub fn should_delete_blob(&self, blob: &BlobItem, now: DateTime<Utc>) -> bool {
        matches!(blob.tier, Some(AccessTier::Archive)) && self.is_expired(blob.last_modified, now)
    }
}

/// Whole days elapsed between `timestamp` and `now`, rounded toward negative
/// infinity. A timestamp in the future yields a negative age.
pub fn age_days(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - timestamp).num_seconds().div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn blob(tier: Option<AccessTier>, age: Duration) -> BlobItem {
        BlobItem {
            name: "x.txt".to_string(),
            tier,
            last_modified: now() - age,
        }
    }

    #[rstest]
    #[case(Duration::zero(), 0)]
    #[case(Duration::hours(23), 0)]
    #[case(Duration::hours(24), 1)]
    #[case(Duration::days(100) + Duration::hours(5), 100)]
    #[case(-Duration::hours(1), -1)]
    #[case(-Duration::days(2), -2)]
    fn test_age_days_floors(#[case] age: Duration, #[case] expected: i64) {
        assert_eq!(age_days(now() - age, now()), expected);
    }

    #[test]
    fn test_cutoff() {
        let policy = RetentionPolicy::new(90);
        assert_eq!(policy.cutoff(now()), now() - Duration::days(90));
        assert_eq!(RetentionPolicy::new(0).cutoff(now()), now());
    }

    #[test]
    fn test_day_offset_is_negative_window() {
        assert_eq!(RetentionPolicy::new(90).day_offset(), -90);
        assert_eq!(RetentionPolicy::new(0).day_offset(), 0);
        assert_eq!(RetentionPolicy::new(u32::MAX).day_offset(), -i32::MAX);
    }

    #[test]
    fn test_expiry_is_strict() {
        let policy = RetentionPolicy::new(90);
        assert!(!policy.is_expired(now() - Duration::days(90), now()));
        assert!(!policy.is_expired(now() - Duration::days(90) - Duration::hours(23), now()));
        assert!(policy.is_expired(now() - Duration::days(91), now()));
    }

    #[rstest]
    #[case(Some(AccessTier::Archive), Duration::days(100), true)]
    #[case(Some(AccessTier::Archive), Duration::days(90), false)]
    #[case(Some(AccessTier::Archive), Duration::days(10), false)]
    #[case(Some(AccessTier::Hot), Duration::days(200), false)]
    #[case(Some(AccessTier::Cool), Duration::days(200), false)]
    #[case(Some(AccessTier::Cold), Duration::days(200), false)]
    #[case(Some(AccessTier::Other("P10".to_string())), Duration::days(200), false)]
    #[case(None, Duration::days(200), false)]
    fn test_should_delete_blob(
        #[case] tier: Option<AccessTier>,
        #[case] age: Duration,
        #[case] expected: bool,
    ) {
        let policy = RetentionPolicy::new(90);
        assert_eq!(policy.should_delete_blob(&blob(tier, age), now()), expected);
    }

    #[test]
    fn test_zero_window_makes_any_aged_archive_blob_eligible() {
        let policy = RetentionPolicy::new(0);
        assert!(policy.should_delete_blob(&blob(Some(AccessTier::Archive), Duration::days(1)), now()));
        assert!(!policy.should_delete_blob(&blob(Some(AccessTier::Archive), Duration::hours(3)), now()));
        assert!(!policy.should_delete_blob(&blob(Some(AccessTier::Hot), Duration::days(1)), now()));
    }

    #[test]
    fn test_shrinking_window_only_adds_eligible_blobs() {
        let ages = [5, 30, 89, 90, 91, 400];
        let eligible = |policy: RetentionPolicy| -> Vec<i64> {
            ages.into_iter()
                .filter(|d| {
                    policy.should_delete_blob(&blob(Some(AccessTier::Archive), Duration::days(*d)), now())
                })
                .collect()
        };

        let wide = eligible(RetentionPolicy::new(90));
        let middle = eligible(RetentionPolicy::new(30));
        let narrow = eligible(RetentionPolicy::new(0));

        assert_eq!(wide, vec![91, 400]);
        assert_eq!(middle, vec![89, 90, 91, 400]);
        assert_eq!(narrow, vec![5, 30, 89, 90, 91, 400]);
        assert!(wide.iter().all(|d| middle.contains(d)));
        assert!(middle.iter().all(|d| narrow.contains(d)));
    }
}
