//! Synchronous progress reporting.
//!
//! Long operations take an optional `&mut dyn FnMut(fraction, stage)`.
//! The callback runs on the caller's thread between units of work.

/// Progress sink: `(fraction in [0, 1], stage label)`.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(f64, &str);

/// Wrapper enforcing a clamped, non-decreasing fraction.
pub struct Progress<'a> {
    callback: Option<ProgressCallback<'a>>,
    last: f64,
}

impl<'a> Progress<'a> {
    pub fn new(callback: Option<ProgressCallback<'a>>) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Report `fraction` of the whole operation.
    pub fn report(&mut self, fraction: f64, stage: &str) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            self.last
        };
        self.last = self.last.max(fraction);
        if let Some(cb) = self.callback.as_mut() {
            cb(self.last, stage);
        }
    }

    /// Report `step / total` of the span `[start, end]` of the operation.
    pub fn report_span(&mut self, start: f64, end: f64, step: usize, total: usize, stage: &str) {
        let local = if total == 0 {
            1.0
        } else {
            step as f64 / total as f64
        };
        self.report(start + (end - start) * local, stage);
    }

    pub fn finish(&mut self, stage: &str) {
        self.report(1.0, stage);
    }

    pub fn fraction(&self) -> f64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_are_clamped_and_monotonic() {
        let mut seen = Vec::new();
        let mut cb = |f: f64, _: &str| seen.push(f);
        {
            let mut progress = Progress::new(Some(&mut cb as ProgressCallback));
            progress.report(-0.5, "a");
            progress.report(0.4, "b");
            progress.report(0.2, "c");
            progress.report(f64::NAN, "d");
            progress.report_span(0.5, 1.0, 1, 2, "e");
            progress.finish("done");
        }
        assert_eq!(seen, vec![0.0, 0.4, 0.4, 0.4, 0.75, 1.0]);
    }

    #[test]
    fn silent_progress_tracks_fraction() {
        let mut progress = Progress::silent();
        progress.report(0.3, "x");
        assert_eq!(progress.fraction(), 0.3);
    }
}
