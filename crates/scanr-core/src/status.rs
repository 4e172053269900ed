use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Run state of one source's scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScraperStatus {
    Running = 1,
    Disabled = 2,
    CapacityExceeded = 3,
}

impl ScraperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScraperStatus::Running => "running",
            ScraperStatus::Disabled => "disabled",
            ScraperStatus::CapacityExceeded => "capacity_exceeded",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => ScraperStatus::Disabled,
            3 => ScraperStatus::CapacityExceeded,
            _ => ScraperStatus::Running,
        }
    }
}

impl fmt::Display for ScraperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared status flag. Cloning shares the same cell.
///
/// Written only by the capacity check, read by every stage.
#[derive(Debug, Clone)]
pub struct StatusCell {
    inner: Arc<AtomicU8>,
}

impl StatusCell {
    pub fn new(initial: ScraperStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    pub fn get(&self) -> ScraperStatus {
        ScraperStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == ScraperStatus::Running
    }

    /// Apply a capacity report. Returns `(from, to)` when the state changed.
    ///
    /// Only `Running` and `CapacityExceeded` move; `Disabled` is left alone.
    pub fn apply_capacity(&self, exceeds: bool) -> Option<(ScraperStatus, ScraperStatus)> {
        let (from, to) = if exceeds {
            (ScraperStatus::Running, ScraperStatus::CapacityExceeded)
        } else {
            (ScraperStatus::CapacityExceeded, ScraperStatus::Running)
        };
        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| (from, to))
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ScraperStatus::Running)
    }
}
