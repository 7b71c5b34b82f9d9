//! Progress reporting for export and restore.

use std::fmt;

/// Named phases reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CollectingData,
    ScanningMedia,
    ReadingMasterKey,
    BuildingContainer,
    WritingMedia,
    Encrypting,
    Decrypting,
    ReadingContainer,
    RestoringMasterKey,
    RestoringMedia,
    RestoringRecords,
    VerifyingMedia,
    Finished,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::CollectingData => "collecting_data",
            Step::ScanningMedia => "scanning_media",
            Step::ReadingMasterKey => "reading_master_key",
            Step::BuildingContainer => "building_container",
            Step::WritingMedia => "writing_media",
            Step::Encrypting => "encrypting",
            Step::Decrypting => "decrypting",
            Step::ReadingContainer => "reading_container",
            Step::RestoringMasterKey => "restoring_master_key",
            Step::RestoringMedia => "restoring_media_files",
            Step::RestoringRecords => "restoring_records",
            Step::VerifyingMedia => "verifying_media",
            Step::Finished => "finished",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub step: Step,
    /// Overall completion in `0.0..=1.0`.
    pub fraction: f64,
}

/// Wraps a caller's callback and keeps reported fractions non-decreasing.
pub(crate) struct Reporter<'a> {
    sink: &'a mut dyn FnMut(Progress),
    last: f64,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a mut dyn FnMut(Progress)) -> Self {
        Self { sink, last: 0.0 }
    }

    pub(crate) fn report(&mut self, step: Step, fraction: f64) {
        let fraction = fraction.clamp(self.last, 1.0);
        self.last = fraction;
        (self.sink)(Progress { step, fraction });
    }

    /// Reports `base + range * done / total`; an empty range reports its end.
    pub(crate) fn report_span(&mut self, step: Step, base: f64, range: f64, done: u64, total: u64) {
        let ratio = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        self.report(step, base + range * ratio);
    }
}
