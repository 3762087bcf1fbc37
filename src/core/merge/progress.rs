use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::executor::MergeSummary;

/// Images processed so far out of the total across all datasets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub value: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { total, value: 0 }
    }

    pub fn step(&mut self, n: usize) {
        self.value += n;
    }

    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.value as f32 / self.total as f32
    }

    pub fn is_done(&self) -> bool {
        self.value >= self.total
    }
}

/// Callback invoked after every processed image.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(&Progress);

/// Cooperative cancellation flag shared between a host and a running merge.
///
/// Clones share the same flag, so a UI thread can keep one handle and pass
/// another to the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Messages a background merge worker sends back to its host
#[derive(Debug, Clone)]
pub enum MergeProgressMessage {
    Progress(Progress),
    Complete(MergeSummary),
    Cancelled(MergeSummary),
    Error(String),
}
