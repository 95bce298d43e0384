//! Capture backend contract
//!
//! Every capture source answers the same four questions: is it bound, bind
//! it, give me a frame for this instant, release everything.

use super::desktop::DesktopBackend;
use super::gdi::GdiBackend;
use super::injected::InjectedBackend;
use crate::clock::ClockTime;
use crate::convert::I420Frame;
use crate::platform::PlatformError;
use crate::window::CaptureTarget;
use std::fmt;
use std::sync::Arc;

/// Which kind of source a backend captures from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Desktop,
    Gdi,
    Injected,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Desktop => write!(f, "desktop"),
            BackendKind::Gdi => write!(f, "gdi"),
            BackendKind::Injected => write!(f, "inject"),
        }
    }
}

/// Result of asking a backend for a frame
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// Nothing to deliver right now
    Empty,
    /// Newly captured frame
    Fresh(Arc<I420Frame>),
    /// Last good frame handed out again because the source is stale
    Repeated(Arc<I420Frame>),
    /// Last good frame standing in for one the pacer fell behind on
    Substituted(Arc<I420Frame>),
}

impl FrameOutcome {
    pub fn frame(&self) -> Option<&Arc<I420Frame>> {
        match self {
            FrameOutcome::Empty => None,
            FrameOutcome::Fresh(frame)
            | FrameOutcome::Repeated(frame)
            | FrameOutcome::Substituted(frame) => Some(frame),
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, FrameOutcome::Repeated(_) | FrameOutcome::Substituted(_))
    }
}

/// Everything a backend needs to bind its source
#[derive(Debug, Clone, PartialEq)]
pub struct BackendParams {
    pub output_width: u32,
    pub output_height: u32,
    pub frame_length: ClockTime,
    pub adapter: u32,
    pub desktop: u32,
    pub max_retry: u32,
    pub target: CaptureTarget,
    pub anti_cheat: bool,
    pub capture_once: bool,
}

/// Capture backend failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No window matches the capture target yet
    TargetNotFound,
    /// Source momentarily unavailable
    Busy,
    /// Bound window disappeared while single-capture was requested
    WindowLost,
    /// Initialization failed `attempts` times in a row
    ExceedMaxRetry { attempts: u32 },
    /// The hooked process exited
    TargetExited,
    /// Capture mode has no backend
    Unsupported(String),
    /// Injected capture selected without a process hook
    NoHook,
    Platform(PlatformError),
}

impl BackendError {
    /// Permanent errors stop the session; the rest are retried
    pub fn is_permanent(&self) -> bool {
        match self {
            BackendError::TargetNotFound | BackendError::Busy => false,
            BackendError::WindowLost
            | BackendError::ExceedMaxRetry { .. }
            | BackendError::TargetExited
            | BackendError::Unsupported(_)
            | BackendError::NoHook => true,
            BackendError::Platform(err) => err.is_fatal(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::TargetNotFound => write!(f, "Capture target window not found"),
            BackendError::Busy => write!(f, "Capture source busy"),
            BackendError::WindowLost => write!(f, "Capture window closed"),
            BackendError::ExceedMaxRetry { attempts } => {
                write!(f, "Unable to initialize capture after {} attempts", attempts)
            }
            BackendError::TargetExited => write!(f, "Capture target process exited"),
            BackendError::Unsupported(mode) => write!(f, "Capture mode not supported: {}", mode),
            BackendError::NoHook => write!(f, "No process hook available for injected capture"),
            BackendError::Platform(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Platform(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PlatformError> for BackendError {
    fn from(err: PlatformError) -> Self {
        BackendError::Platform(err)
    }
}

/// Uniform capture source
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Bound to a source and able to produce frames
    fn is_ready(&self) -> bool;

    /// Try to bind the source
    fn initialize(&mut self, params: &BackendParams) -> Result<(), BackendError>;

    /// Frame for stream time `now`; `allow_repeat` permits handing back the
    /// last frame when nothing new is available
    fn produce_frame(
        &mut self,
        now: ClockTime,
        allow_repeat: bool,
    ) -> Result<FrameOutcome, BackendError>;

    /// Release the source
    fn cleanup(&mut self);
}

/// The one active backend of a session
pub enum BackendHandle {
    Desktop(DesktopBackend),
    Gdi(GdiBackend),
    Injected(InjectedBackend),
}

impl BackendHandle {
    fn inner(&self) -> &dyn CaptureBackend {
        match self {
            BackendHandle::Desktop(b) => b,
            BackendHandle::Gdi(b) => b,
            BackendHandle::Injected(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CaptureBackend {
        match self {
            BackendHandle::Desktop(b) => b,
            BackendHandle::Gdi(b) => b,
            BackendHandle::Injected(b) => b,
        }
    }
}

impl CaptureBackend for BackendHandle {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn is_ready(&self) -> bool {
        self.inner().is_ready()
    }

    fn initialize(&mut self, params: &BackendParams) -> Result<(), BackendError> {
        self.inner_mut().initialize(params)
    }

    fn produce_frame(
        &mut self,
        now: ClockTime,
        allow_repeat: bool,
    ) -> Result<FrameOutcome, BackendError> {
        self.inner_mut().produce_frame(now, allow_repeat)
    }

    fn cleanup(&mut self) {
        self.inner_mut().cleanup()
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(!BackendError::TargetNotFound.is_permanent());
        assert!(!BackendError::Busy.is_permanent());
        assert!(BackendError::ExceedMaxRetry { attempts: 5 }.is_permanent());
        assert!(BackendError::TargetExited.is_permanent());
        assert!(BackendError::Unsupported("dshow".into()).is_permanent());
        assert!(!BackendError::Platform(PlatformError::Busy).is_permanent());
        assert!(BackendError::Platform(PlatformError::Connection("x".into())).is_permanent());
    }

    #[test]
    fn outcome_accessors() {
        let frame = Arc::new(crate::convert::argb_to_i420(
            &crate::capture::frame::PixelBuffer::filled(2, 2, 0xFF00_0000),
        ));
        assert!(FrameOutcome::Empty.frame().is_none());
        assert!(FrameOutcome::Repeated(frame.clone()).is_repeated());
        assert!(FrameOutcome::Substituted(frame.clone()).is_repeated());
        assert!(!FrameOutcome::Fresh(frame).is_repeated());
    }
}
