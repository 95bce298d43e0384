//! Full-desktop capture over a duplication primitive

use super::backend::{BackendError, BackendKind, BackendParams, CaptureBackend, FrameOutcome};
use crate::clock::ClockTime;
use crate::convert::{FrameConverter, I420Frame};
use crate::platform::{DesktopDuplicator, PlatformError};
use log::{debug, info, warn};
use std::sync::Arc;

/// Default initialization attempts before giving up
pub const DEFAULT_MAX_RETRY: u32 = 5;

pub struct DesktopBackend {
    duplicator: Box<dyn DesktopDuplicator>,
    converter: FrameConverter,
    adapter: u32,
    desktop: u32,
    max_retry: u32,
    retry_count: u32,
    ready: bool,
    last: Option<Arc<I420Frame>>,
}

impl DesktopBackend {
    pub fn new(duplicator: Box<dyn DesktopDuplicator>) -> Self {
        Self {
            duplicator,
            converter: FrameConverter::new(0, 0),
            adapter: 0,
            desktop: 0,
            max_retry: DEFAULT_MAX_RETRY,
            retry_count: 0,
            ready: false,
            last: None,
        }
    }

    /// Failed initialization attempts since the last successful bind
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn exceeded_max_retry(&self) -> bool {
        self.retry_count >= self.max_retry
    }

    fn drop_duplication(&mut self) {
        if self.ready {
            self.duplicator.close();
            self.ready = false;
        }
    }
}

impl CaptureBackend for DesktopBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Desktop
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn initialize(&mut self, params: &BackendParams) -> Result<(), BackendError> {
        self.adapter = params.adapter;
        self.desktop = params.desktop;
        self.max_retry = params.max_retry.max(1);
        self.converter = FrameConverter::new(params.output_width, params.output_height);

        if self.exceeded_max_retry() {
            return Err(BackendError::ExceedMaxRetry {
                attempts: self.retry_count,
            });
        }

        info!(
            "Initializing desktop capture - adapter: {}, desktop: {}, size: {}x{}",
            self.adapter, self.desktop, params.output_width, params.output_height
        );
        match self.duplicator.open(self.adapter, self.desktop) {
            Ok(()) => {
                self.retry_count = 0;
                self.ready = true;
                self.last = None;
                Ok(())
            }
            Err(err) => {
                self.retry_count += 1;
                warn!(
                    "Desktop duplication failed ({}/{}): {}",
                    self.retry_count, self.max_retry, err
                );
                if self.exceeded_max_retry() {
                    Err(BackendError::ExceedMaxRetry {
                        attempts: self.retry_count,
                    })
                } else if err.is_fatal() {
                    Err(err.into())
                } else {
                    Err(BackendError::Busy)
                }
            }
        }
    }

    fn produce_frame(
        &mut self,
        _now: ClockTime,
        allow_repeat: bool,
    ) -> Result<FrameOutcome, BackendError> {
        if !self.ready {
            return Ok(FrameOutcome::Empty);
        }

        match self.duplicator.acquire() {
            Ok(Some(buffer)) => {
                let frame = Arc::new(self.converter.convert(&buffer));
                self.last = Some(frame.clone());
                Ok(FrameOutcome::Fresh(frame))
            }
            Ok(None) => match (&self.last, allow_repeat) {
                (Some(frame), true) => {
                    debug!("fake frame");
                    Ok(FrameOutcome::Substituted(frame.clone()))
                }
                _ => Ok(FrameOutcome::Empty),
            },
            Err(PlatformError::AccessLost) => {
                warn!("Desktop duplication access lost, reinitializing");
                self.drop_duplication();
                Ok(FrameOutcome::Empty)
            }
            Err(PlatformError::Busy) => Ok(FrameOutcome::Empty),
            Err(err) => Err(err.into()),
        }
    }

    fn cleanup(&mut self) {
        self.drop_duplication();
        self.last = None;
    }
}
