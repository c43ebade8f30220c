use std::fmt;

/// Counters for one live tracking cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub new_items: u32,
    pub updated: u32,
    pub skipped: u32,
    pub forced: u32,
    pub still_pending: u32,
    pub scroll_scans: u32,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} updated, {} skipped, {} forced, {} still pending, after {} scroll scans",
            self.new_items, self.updated, self.skipped, self.forced, self.still_pending, self.scroll_scans
        )
    }
}

/// A summary the caller should actually log, with the number of identical
/// summaries that were swallowed since the last emitted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSummary {
    pub suppressed_before: u32,
    pub stats: CycleStats,
}

/// Collapses identical consecutive cycle summaries.
///
/// A steady-state tracker produces the same summary for hours at a stretch;
/// repeating it would drown the log. Only a summary that differs from the
/// previous one is emitted, carrying the count of suppressed repeats so
/// nothing disappears silently.
#[derive(Debug, Default)]
pub struct SummaryCoalescer {
    last: Option<CycleStats>,
    suppressed: u32,
}

impl SummaryCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one cycle's stats. `None` means the summary repeated the
    /// previous one and was swallowed.
    pub fn observe(&mut self, stats: CycleStats) -> Option<EmittedSummary> {
        if self.last.as_ref() == Some(&stats) {
            self.suppressed += 1;
            return None;
        }
        let emitted = EmittedSummary {
            suppressed_before: self.suppressed,
            stats: stats.clone(),
        };
        self.suppressed = 0;
        self.last = Some(stats);
        Some(emitted)
    }
}
