/// Ceiling for estimated progress while the server reports none.
pub const ESTIMATE_CEILING: f32 = 90.0;
/// Ceiling for server-reported progress before the job completes.
pub const REPORTED_CEILING: f32 = 99.0;

/// Linear estimate from the number of status checks so far.
#[allow(clippy::cast_precision_loss)]
pub fn estimate_progress(attempts: u32, max_attempts: u32) -> f32 {
    if max_attempts == 0 {
        return ESTIMATE_CEILING;
    }
    (attempts as f32 * ESTIMATE_CEILING / max_attempts as f32).min(ESTIMATE_CEILING)
}

pub fn clamp_reported(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, REPORTED_CEILING)
    }
}

/// Displayed progress; never moves backwards until reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressTracker {
    value: f32,
}

impl ProgressTracker {
    pub fn advance(&mut self, candidate: f32) -> f32 {
        if candidate > self.value {
            self.value = candidate;
        }
        self.value
    }

    pub fn complete(&mut self) -> f32 {
        self.value = 100.0;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}
