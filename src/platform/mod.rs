//! Platform collaborators
//!
//! Window enumeration, pixel grabs, desktop duplication and the process hook
//! are supplied by the host platform. The capture backends only talk to these
//! traits.

#[cfg(feature = "x11")]
pub mod x11;

use crate::capture::frame::PixelBuffer;
use crate::clock::ClockTime;
use crate::region::Rect;
use crate::window::{WindowId, WindowInfo};
use std::fmt;

/// Platform collaborator failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Could not reach the windowing system
    Connection(String),
    /// A request to the windowing system failed
    Request(String),
    /// The operation has no implementation on this platform
    Unsupported(String),
    /// The requested adapter, output or window does not exist
    NotFound(String),
    /// Duplication is temporarily unavailable
    Busy,
    /// The duplication was invalidated (mode switch, desktop switch)
    AccessLost,
    /// The hooked process went away
    ProcessExited,
}

impl PlatformError {
    /// No amount of retrying will fix these
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlatformError::Connection(_) | PlatformError::Unsupported(_) | PlatformError::ProcessExited
        )
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Connection(msg) => write!(f, "Display connection failed: {}", msg),
            PlatformError::Request(msg) => write!(f, "Platform request failed: {}", msg),
            PlatformError::Unsupported(what) => write!(f, "Not supported on this platform: {}", what),
            PlatformError::NotFound(what) => write!(f, "Not found: {}", what),
            PlatformError::Busy => write!(f, "Duplication busy"),
            PlatformError::AccessLost => write!(f, "Duplication access lost"),
            PlatformError::ProcessExited => write!(f, "Target process exited"),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Top-level window enumeration
pub trait WindowSystem: Send {
    /// Every top-level window, topmost first
    fn windows(&mut self) -> Result<Vec<WindowInfo>, PlatformError>;

    /// Whether `id` still names an existing window
    fn is_window(&mut self, id: WindowId) -> bool;

    /// Bounds of the whole virtual screen
    fn virtual_screen(&mut self) -> Rect;
}

/// Synchronous screen pixel source
pub trait ScreenSource: Send {
    /// Current pixels of `rect`, `None` while the source is unavailable
    fn grab(&mut self, rect: Rect) -> Option<PixelBuffer>;
}

/// Desktop duplication primitive
pub trait DesktopDuplicator: Send {
    /// Bind output `desktop` of adapter `adapter`
    fn open(&mut self, adapter: u32, desktop: u32) -> Result<(), PlatformError>;

    /// Next desktop image; `Ok(None)` when nothing changed since the last one
    fn acquire(&mut self) -> Result<Option<PixelBuffer>, PlatformError>;

    fn close(&mut self);
}

/// Parameters handed to the process hook when attaching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub class_name: String,
    pub title: String,
    pub executable: String,
    pub scale_width: u32,
    pub scale_height: u32,
    pub anti_cheat: bool,
    /// Hook-side frame wait budget
    pub timeout: ClockTime,
}

/// Frame pulled out of a hooked process
#[derive(Debug, Clone)]
pub struct PulledFrame {
    pub buffer: PixelBuffer,
    /// Hook re-sent its previous frame
    pub repeated: bool,
}

/// Frame-pull contract of the injected capture hook
pub trait ProcessHook: Send {
    fn attach(&mut self, request: &AttachRequest) -> Result<(), PlatformError>;

    /// Pull the next frame; with `allow_repeat` the hook may hand back the
    /// previous one instead of waiting
    fn pull(&mut self, allow_repeat: bool) -> Result<Option<PulledFrame>, PlatformError>;

    fn detach(&mut self);
}

/// Factory for the collaborators of each backend
pub trait Platform: Send {
    fn window_system(&mut self) -> Result<Box<dyn WindowSystem>, PlatformError>;

    fn screen_source(&mut self) -> Result<Box<dyn ScreenSource>, PlatformError>;

    fn duplicator(&mut self) -> Result<Box<dyn DesktopDuplicator>, PlatformError>;

    /// Hooking is not built in; hosts that have one provide it here
    fn process_hook(&mut self) -> Option<Box<dyn ProcessHook>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(PlatformError::Connection("no display".into()).is_fatal());
        assert!(PlatformError::ProcessExited.is_fatal());
        assert!(!PlatformError::Busy.is_fatal());
        assert!(!PlatformError::AccessLost.is_fatal());
        assert!(!PlatformError::NotFound("adapter 2".into()).is_fatal());
    }
}
