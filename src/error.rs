use thiserror::Error;

/// Why a candidate produced no record. Absorbed inside its region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("detail document unavailable")]
    DocumentUnavailable,
    #[error("malformed detail page: {0}")]
    Malformed(&'static str),
}

/// A region that could not complete. Other regions keep running.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("listing page unavailable for {0}")]
    ListingUnavailable(String),
    #[error("parse stage failed: {0}")]
    ParseStage(#[from] tokio::task::JoinError),
    #[error("writing output failed: {0}")]
    Output(String),
    #[error("region task panicked: {0}")]
    TaskPanicked(String),
    #[error("region task cancelled")]
    TaskCancelled,
}

impl RegionError {
    /// Classify a region task that did not return.
    pub fn from_task(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            RegionError::TaskPanicked(msg)
        } else {
            RegionError::TaskCancelled
        }
    }
}

/// Whole-run failures. These abort the process.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("deadline of {secs}s exceeded waiting for {regions} region(s)")]
    DeadlineExceeded { regions: usize, secs: u64 },
}
