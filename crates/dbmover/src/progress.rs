//! Progress and failure notification surface.
//!
//! Listeners are passed into the engine at construction; there is no global
//! event bus. Every method has a no-op default so implementors only override
//! what they observe.

use std::sync::Arc;

/// Receives progress and failure events during a migration run.
///
/// All methods are invoked from the single processing task at well-defined
/// call points; implementations should return quickly.
pub trait MigrationListener: Send + Sync {
    /// A table is about to be processed (or deliberately not).
    fn table_started(&self, _table: &str, _processing: bool, _index: usize, _total: usize) {}

    /// A table was skipped; its row count was still credited to overall
    /// progress.
    fn table_skipped(&self, _table: &str, _reason: &str) {}

    /// Per-table row progress, fired at the configured interval and
    /// unconditionally at 0% and 100%.
    fn row_progress(&self, _table: &str, _current: i64, _total: i64) {}

    /// Overall row progress across all tables.
    fn overall_progress(&self, _current: i64, _total: i64) {}

    /// A destination table was emptied during the clearing pre-pass.
    fn table_cleared(&self, _table: &str) {}

    /// The manual identity synchronization loop is advancing the counter
    /// across a long gap.
    fn identity_sync_progress(&self, _table: &str, _current: i64, _target: i64) {}

    /// The bulk-load statement for a staged table is about to run.
    fn bulk_insert_executing(&self, _table: &str) {}

    /// The bulk-load statement completed.
    fn bulk_insert_completed(&self, _table: &str, _elapsed_seconds: f64) {}

    /// The bulk-load statement failed.
    fn bulk_insert_failed(&self, _table: &str, _statement: &str, _error: &str) {}

    /// A single INSERT/UPDATE/DELETE/COUNT failed; the run continues.
    fn statement_failed(&self, _table: &str, _statement: &str, _error: &str) {}

    /// A non-fatal condition needing manual follow-up (e.g. a staging file
    /// that could not be removed).
    fn warning(&self, _message: &str) {}
}

/// Fan-out wrapper over the registered listeners.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    inner: Vec<Arc<dyn MigrationListener>>,
}

impl Listeners {
    pub fn new(inner: Vec<Arc<dyn MigrationListener>>) -> Self {
        Self { inner }
    }

    pub fn push(&mut self, listener: Arc<dyn MigrationListener>) {
        self.inner.push(listener);
    }

    pub fn table_started(&self, table: &str, processing: bool, index: usize, total: usize) {
        for l in &self.inner {
            l.table_started(table, processing, index, total);
        }
    }

    pub fn table_skipped(&self, table: &str, reason: &str) {
        for l in &self.inner {
            l.table_skipped(table, reason);
        }
    }

    pub fn row_progress(&self, table: &str, current: i64, total: i64) {
        for l in &self.inner {
            l.row_progress(table, current, total);
        }
    }

    pub fn overall_progress(&self, current: i64, total: i64) {
        for l in &self.inner {
            l.overall_progress(current, total);
        }
    }

    pub fn table_cleared(&self, table: &str) {
        for l in &self.inner {
            l.table_cleared(table);
        }
    }

    pub fn identity_sync_progress(&self, table: &str, current: i64, target: i64) {
        for l in &self.inner {
            l.identity_sync_progress(table, current, target);
        }
    }

    pub fn bulk_insert_executing(&self, table: &str) {
        for l in &self.inner {
            l.bulk_insert_executing(table);
        }
    }

    pub fn bulk_insert_completed(&self, table: &str, elapsed_seconds: f64) {
        for l in &self.inner {
            l.bulk_insert_completed(table, elapsed_seconds);
        }
    }

    pub fn bulk_insert_failed(&self, table: &str, statement: &str, error: &str) {
        for l in &self.inner {
            l.bulk_insert_failed(table, statement, error);
        }
    }

    pub fn statement_failed(&self, table: &str, statement: &str, error: &str) {
        for l in &self.inner {
            l.statement_failed(table, statement, error);
        }
    }

    pub fn warning(&self, message: &str) {
        for l in &self.inner {
            l.warning(message);
        }
    }
}

/// Overall row counter shared by the copy and delete passes.
#[derive(Debug, Default)]
pub(crate) struct OverallProgress {
    pub current: i64,
    pub total: i64,
}

impl OverallProgress {
    pub fn new(total: i64) -> Self {
        Self { current: 0, total }
    }

    /// Advance by one row and notify listeners.
    pub fn step(&mut self, listeners: &Listeners) {
        self.current += 1;
        listeners.overall_progress(self.current, self.total);
    }

    /// Credit a skipped table's full row count so totals stay consistent.
    pub fn credit(&mut self, rows: i64, listeners: &Listeners) {
        if rows <= 0 {
            return;
        }
        self.current += rows;
        listeners.overall_progress(self.current, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl MigrationListener for Recorder {
        fn overall_progress(&self, current: i64, total: i64) {
            self.events
                .lock()
                .unwrap()
                .push(format!("overall {current}/{total}"));
        }

        fn table_cleared(&self, table: &str) {
            self.events.lock().unwrap().push(format!("cleared {table}"));
        }
    }

    #[test]
    fn test_fan_out_and_counters() {
        let recorder = Arc::new(Recorder::default());
        let listeners = Listeners::new(vec![recorder.clone()]);

        let mut overall = OverallProgress::new(10);
        overall.step(&listeners);
        overall.credit(4, &listeners);
        overall.credit(0, &listeners);
        listeners.table_cleared("Orders");

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["overall 1/10", "overall 5/10", "cleared Orders"]
        );
    }
}
