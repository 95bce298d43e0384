//! capture-pacer - frame-paced capture core
//!
//! Produces I420 frames at a fixed cadence from one of several capture
//! backends: whole-desktop duplication, occlusion-aware window capture and
//! capture through a hooked process.

pub mod args;
pub mod capture;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod convert;
pub mod pacer;
pub mod platform;
pub mod region;
pub mod runtime_settings;
pub mod session;
pub mod window;

// Re-exports
pub use capture::{BackendError, BackendKind, CaptureBackend, FrameOutcome, PixelBuffer};
pub use clock::{ClockTime, ManualClock, ReferenceClock, SystemClock};
pub use config::{CaptureMode, Config};
pub use convert::{FrameConverter, I420Frame};
pub use pacer::{FramePacer, PacingStats, Sample};
pub use session::{CaptureSession, DeliverError};
