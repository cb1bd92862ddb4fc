//! Background RAW-to-JPEG conversion.
//!
//! Decoding is delegated to a [`RawConverter`]. One worker thread converts
//! the files in order, reporting progress over a channel. Cancellation is
//! cooperative and only checked between files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::NaiveDateTime;

use crate::error::ConversionError;
use crate::models::PhotoAsset;

/// External decoder. Returns the path of the converted JPEG.
pub trait RawConverter: Send + 'static {
    fn convert(&mut self, source: &Path) -> Result<PathBuf, ConversionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub capture_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionProgress {
    /// 1-based index of the file just finished.
    pub current: usize,
    pub total: usize,
    pub file_name: String,
    pub percent: u8,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    Started { total: usize },
    Progress(ConversionProgress),
    Finished { completed: usize, cancelled: bool },
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub source: PathBuf,
    pub capture_time: NaiveDateTime,
    pub result: Result<PathBuf, ConversionError>,
}

impl ConversionOutcome {
    /// The converted file as a photo, when conversion succeeded.
    pub fn into_photo(self) -> Option<PhotoAsset> {
        let output = self.result.ok()?;
        Some(PhotoAsset::new(output, self.capture_time))
    }
}

pub struct ConversionTask {
    cancelled: Arc<AtomicBool>,
    events: Receiver<ConversionEvent>,
    handle: JoinHandle<Vec<ConversionOutcome>>,
}

impl ConversionTask {
    pub fn spawn<C: RawConverter>(converter: C, jobs: Vec<ConversionJob>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, events) = mpsc::channel();
        let flag = Arc::clone(&cancelled);
        let handle = thread::spawn(move || run(converter, jobs, &flag, &tx));
        Self {
            cancelled,
            events,
            handle,
        }
    }

    /// Stop after the file currently being converted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> &Receiver<ConversionEvent> {
        &self.events
    }

    /// Wait for the worker and collect the per-file outcomes.
    pub fn join(self) -> Result<Vec<ConversionOutcome>, ConversionError> {
        self.handle.join().map_err(|_| ConversionError::WorkerPanicked)
    }
}

fn run<C: RawConverter>(
    mut converter: C,
    jobs: Vec<ConversionJob>,
    cancelled: &AtomicBool,
    tx: &Sender<ConversionEvent>,
) -> Vec<ConversionOutcome> {
    let total = jobs.len();
    // The host may stop listening; conversion carries on regardless.
    let _ = tx.send(ConversionEvent::Started { total });

    let mut outcomes = Vec::with_capacity(total);
    let mut was_cancelled = false;

    for (i, job) in jobs.into_iter().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            tracing::info!(done = i, total, "conversion cancelled");
            was_cancelled = true;
            break;
        }

        let file_name = job
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = converter.convert(&job.source);
        match &result {
            Ok(output) => tracing::debug!(file = %file_name, output = %output.display(), "converted"),
            Err(err) => tracing::warn!(file = %file_name, %err, "conversion failed"),
        }

        let _ = tx.send(ConversionEvent::Progress(ConversionProgress {
            current: i + 1,
            total,
            file_name,
            percent: ((i + 1) * 100 / total) as u8,
            succeeded: result.is_ok(),
        }));
        outcomes.push(ConversionOutcome {
            source: job.source,
            capture_time: job.capture_time,
            result,
        });
    }

    let _ = tx.send(ConversionEvent::Finished {
        completed: outcomes.len(),
        cancelled: was_cancelled,
    });
    outcomes
}
