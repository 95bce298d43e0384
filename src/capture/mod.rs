//! Capture backends
//!
//! Desktop duplication, occlusion-aware window capture and hooked-process
//! capture behind one contract.

pub mod backend;
pub mod desktop;
pub mod frame;
pub mod gdi;
pub mod injected;

pub use backend::{
    BackendError, BackendHandle, BackendKind, BackendParams, CaptureBackend, FrameOutcome,
};
pub use desktop::DesktopBackend;
pub use frame::PixelBuffer;
pub use gdi::GdiBackend;
pub use injected::InjectedBackend;
