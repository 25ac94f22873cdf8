use bagslice_types::{Record, Selection};

/// Channel + time window predicate for one run
#[derive(Clone, Debug)]
pub struct WindowFilter {
    selection: Selection,
}

impl WindowFilter {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }

    /// Check if a record belongs in the destination
    pub fn matches(&self, record: &Record) -> bool {
        self.selection.includes_channel(&record.channel)
            && self.selection.contains_time(record.timestamp_ns)
    }

    /// Position of `timestamp_ns` inside the window as a percentage
    ///
    /// Records before the window report 0 and records after it report 100.
    /// A zero-width window always reports 100.
    pub fn progress(&self, timestamp_ns: i64) -> f64 {
        let span = self.selection.span_ns();
        if span <= 0 {
            return 100.0;
        }
        let offset = timestamp_ns.saturating_sub(self.selection.start_ns());
        (offset as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(start: i64, end: i64) -> WindowFilter {
        WindowFilter::new(Selection::new(["/a"], start, end).unwrap())
    }

    #[test]
    fn test_channel_and_window() {
        let filter = filter(2, 6);
        assert!(filter.matches(&Record::new("/a", vec![], 2)));
        assert!(filter.matches(&Record::new("/a", vec![], 6)));
        assert!(!filter.matches(&Record::new("/a", vec![], 7)));
        assert!(!filter.matches(&Record::new("/b", vec![], 4)));
    }

    #[test]
    fn test_progress_is_clamped() {
        let filter = filter(100, 200);
        assert_eq!(filter.progress(50), 0.0);
        assert_eq!(filter.progress(150), 50.0);
        assert_eq!(filter.progress(500), 100.0);
    }

    #[test]
    fn test_zero_span_progress() {
        let filter = filter(5, 5);
        assert_eq!(filter.progress(0), 100.0);
        assert_eq!(filter.progress(5), 100.0);
    }
}
