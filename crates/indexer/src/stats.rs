use serde::Serialize;

/// Counters produced by one reconciliation scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_indexed: usize,
    pub errors: Vec<String>,
    pub time_ms: u64,
}

impl ScanStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
