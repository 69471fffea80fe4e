/// Per-invocation outcome counters.
///
/// A summary is created fresh for every run and discarded when the run ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Items examined (blobs, or tables that exist).
    pub processed: u64,
    /// Items deleted (blobs, or rows across all tables).
    pub deleted: u64,
    /// Items left untouched because they were ineligible or absent.
    pub skipped: u64,
    /// Per-item failures that were absorbed, including not-found races.
    pub errors: u64,
}

impl RunSummary {
    /// Check if any items were deleted.
    pub fn has_deletions(&self) -> bool {
        self.deleted > 0
    }

    /// Check if any per-item errors were absorbed.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_default() {
        let summary = RunSummary::default();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.errors, 0);
        assert!(!summary.has_deletions());
        assert!(!summary.has_errors());
    }

    #[test]
    fn test_run_summary_flags() {
        let summary = RunSummary {
            processed: 3,
            deleted: 1,
            skipped: 1,
            errors: 1,
        };
        assert!(summary.has_deletions());
        assert!(summary.has_errors());
    }
}
