use std::ops::Range;

/// Commit interval of the loader. Row 0 is flushed alone, then every row
/// whose index is a multiple of this value closes a batch.
pub const FLUSH_INTERVAL: usize = 50;

/// Splits `row_count` rows into the index ranges that are executed and
/// committed together.
#[derive(Debug)]
pub struct FlushPlan {
    row_count: usize,
    interval: usize,
}

impl FlushPlan {
    pub fn for_rows(row_count: usize) -> Self {
        Self {
            row_count,
            interval: FLUSH_INTERVAL,
        }
    }

    /// Ranges in execution order. The last range holds whatever follows the
    /// final multiple of the interval and may be empty; it is still flushed.
    /// Zero rows yield no ranges at all.
    pub fn iter_batches(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let trigger_points = (0..self.row_count).step_by(self.interval);
        let mut batch_start = 0usize;

        let triggered = trigger_points.map(move |trigger| {
            let batch = batch_start..trigger + 1;
            batch_start = trigger + 1;
            batch
        });

        let remainder_start = match self.row_count {
            0 => None,
            count => Some(((count - 1) / self.interval) * self.interval + 1),
        };
        let remainder = remainder_start.map(|start| start..self.row_count);

        triggered.chain(remainder)
    }

    pub fn flush_count(&self) -> usize {
        self.iter_batches().count()
    }
}
