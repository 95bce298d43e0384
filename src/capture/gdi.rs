//! Occlusion-aware single-window capture
//!
//! Grabs the whole virtual screen and keeps only the pixels of windows that
//! belong to the target's process. Covered target area and everything else
//! are painted with sentinel colors.

use super::backend::{BackendError, BackendKind, BackendParams, CaptureBackend, FrameOutcome};
use crate::clock::ClockTime;
use crate::compositor::OcclusionCompositor;
use crate::convert::{FrameConverter, I420Frame};
use crate::platform::{ScreenSource, WindowSystem};
use crate::window::{occlusion_records, CaptureTarget, WindowInfo, WindowResolver};
use log::{debug, info, warn};
use std::sync::Arc;

pub struct GdiBackend {
    windows: Box<dyn WindowSystem>,
    screen: Box<dyn ScreenSource>,
    resolver: WindowResolver,
    compositor: OcclusionCompositor,
    converter: FrameConverter,
    target: CaptureTarget,
    capture_once: bool,
    window: Option<WindowInfo>,
    last: Option<Arc<I420Frame>>,
}

impl GdiBackend {
    pub fn new(windows: Box<dyn WindowSystem>, screen: Box<dyn ScreenSource>) -> Self {
        Self {
            windows,
            screen,
            resolver: WindowResolver::new(),
            compositor: OcclusionCompositor::new(),
            converter: FrameConverter::new(0, 0),
            target: CaptureTarget::default(),
            capture_once: false,
            window: None,
            last: None,
        }
    }

    /// Currently bound window
    pub fn window(&self) -> Option<&WindowInfo> {
        self.window.as_ref()
    }

    fn lose_window(&mut self) -> Result<FrameOutcome, BackendError> {
        if let Some(window) = self.window.take() {
            warn!("Capture window {} is gone", window.id);
        }
        if self.capture_once {
            Err(BackendError::WindowLost)
        } else {
            Ok(FrameOutcome::Empty)
        }
    }

    fn repeat_last(&self) -> FrameOutcome {
        match &self.last {
            Some(frame) => FrameOutcome::Repeated(frame.clone()),
            None => FrameOutcome::Empty,
        }
    }
}

impl CaptureBackend for GdiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gdi
    }

    fn is_ready(&self) -> bool {
        self.window.is_some()
    }

    fn initialize(&mut self, params: &BackendParams) -> Result<(), BackendError> {
        self.target = params.target.clone();
        self.capture_once = params.capture_once;
        self.converter = FrameConverter::new(params.output_width, params.output_height);

        let windows = self.windows.windows()?;
        if let Some(handle) = self.target.handle.filter(|_| self.target.require_exact_handle) {
            if !self.resolver.validate_handle(handle, &windows) {
                debug!("Window {} is not capturable", handle);
                return Err(BackendError::TargetNotFound);
            }
        }
        match self.resolver.resolve(&self.target, &windows) {
            Some(window) => {
                info!(
                    "Capturing window {} class={:?} title={:?} size: {}x{}",
                    window.id,
                    window.class_name,
                    window.title,
                    params.output_width,
                    params.output_height
                );
                self.window = Some(window.clone());
                self.last = None;
                Ok(())
            }
            None => {
                debug!("Window not found class={:?}", self.target.class_name);
                Err(BackendError::TargetNotFound)
            }
        }
    }

    fn produce_frame(
        &mut self,
        _now: ClockTime,
        _allow_repeat: bool,
    ) -> Result<FrameOutcome, BackendError> {
        let Some(bound) = self.window.as_ref().map(|w| w.id) else {
            return Ok(FrameOutcome::Empty);
        };

        if !self.windows.is_window(bound) {
            return self.lose_window();
        }

        let windows = self.windows.windows()?;
        let Some(current) = windows.iter().find(|w| w.id == bound).cloned() else {
            return self.lose_window();
        };

        if current.minimized || !current.visible {
            debug!("Window not visible, returning last frame");
            return Ok(self.repeat_last());
        }

        let mut records = occlusion_records(&windows, current.pid);
        if current.pid.is_none() {
            for record in records.iter_mut().filter(|r| r.id == bound) {
                record.belongs_to_target = true;
            }
        }

        let screen = self.windows.virtual_screen();
        let Some(desktop) = self.screen.grab(screen) else {
            return Ok(self.repeat_last());
        };

        let (_, image) = self.compositor.composite(screen, &records, &desktop);
        let frame = Arc::new(self.converter.convert(&image));
        self.window = Some(current);
        self.last = Some(frame.clone());
        Ok(FrameOutcome::Fresh(frame))
    }

    fn cleanup(&mut self) {
        self.window = None;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelBuffer;
    use crate::platform::PlatformError;
    use crate::region::Rect;
    use crate::window::{MatchMode, WindowId};
    use parking_lot::Mutex;

    const SCREEN: Rect = Rect::new(0, 0, 16, 16);

    struct SharedWindows(Arc<Mutex<Vec<WindowInfo>>>);

    impl WindowSystem for SharedWindows {
        fn windows(&mut self) -> Result<Vec<WindowInfo>, PlatformError> {
            Ok(self.0.lock().clone())
        }

        fn is_window(&mut self, id: WindowId) -> bool {
            self.0.lock().iter().any(|w| w.id == id)
        }

        fn virtual_screen(&mut self) -> Rect {
            SCREEN
        }
    }

    struct SolidScreen(u32);

    impl ScreenSource for SolidScreen {
        fn grab(&mut self, rect: Rect) -> Option<PixelBuffer> {
            Some(PixelBuffer::filled(rect.width(), rect.height(), self.0))
        }
    }

    fn game_window() -> WindowInfo {
        let mut w = WindowInfo::new(WindowId(7), "Game", "Game", Rect::new(0, 0, 8, 8));
        w.pid = Some(100);
        w
    }

    fn params(capture_once: bool) -> BackendParams {
        BackendParams {
            output_width: 16,
            output_height: 16,
            frame_length: 333_333,
            adapter: 0,
            desktop: 0,
            max_retry: 5,
            target: CaptureTarget {
                match_mode: MatchMode::ClassAndTitle,
                class_name: "Game".to_string(),
                ..Default::default()
            },
            anti_cheat: false,
            capture_once,
        }
    }

    fn backend(windows: Vec<WindowInfo>) -> (GdiBackend, Arc<Mutex<Vec<WindowInfo>>>) {
        let shared = Arc::new(Mutex::new(windows));
        let backend = GdiBackend::new(
            Box::new(SharedWindows(shared.clone())),
            Box::new(SolidScreen(0xFFFF_FFFF)),
        );
        (backend, shared)
    }

    #[test]
    fn not_found_is_transient() {
        let (mut gdi, _) = backend(vec![]);
        let err = gdi.initialize(&params(false)).unwrap_err();
        assert_eq!(err, BackendError::TargetNotFound);
        assert!(!err.is_permanent());
        assert!(!gdi.is_ready());
    }

    #[test]
    fn composites_target_pixels() {
        let (mut gdi, _) = backend(vec![game_window()]);
        gdi.initialize(&params(false)).unwrap();
        let outcome = gdi.produce_frame(1, false).unwrap();
        let frame = outcome.frame().unwrap();
        // target area is white, the rest is the red background sentinel
        assert_eq!(frame.y[0], 235);
        assert_eq!(frame.y[15 * 16 + 15], 82);
    }

    #[test]
    fn minimized_window_repeats_last_frame() {
        let (mut gdi, shared) = backend(vec![game_window()]);
        gdi.initialize(&params(false)).unwrap();
        assert!(matches!(gdi.produce_frame(1, false).unwrap(), FrameOutcome::Fresh(_)));

        shared.lock()[0].minimized = true;
        assert!(gdi.produce_frame(2, false).unwrap().is_repeated());
        assert!(gdi.is_ready());
    }

    #[test]
    fn closed_window_clears_handle() {
        let (mut gdi, shared) = backend(vec![game_window()]);
        gdi.initialize(&params(false)).unwrap();
        shared.lock().clear();
        assert!(matches!(gdi.produce_frame(1, false).unwrap(), FrameOutcome::Empty));
        assert!(!gdi.is_ready());
    }

    #[test]
    fn closed_window_is_permanent_with_capture_once() {
        let (mut gdi, shared) = backend(vec![game_window()]);
        let mut target = params(true);
        target.target.handle = Some(WindowId(7));
        target.target.require_exact_handle = true;
        gdi.initialize(&target).unwrap();

        shared.lock().clear();
        assert_eq!(gdi.produce_frame(1, false).unwrap_err(), BackendError::WindowLost);
    }

    #[test]
    fn exact_handle_must_be_capturable() {
        let mut window = game_window();
        window.minimized = true;
        let (mut gdi, _) = backend(vec![window]);
        let mut target = params(true);
        target.target.handle = Some(WindowId(7));
        target.target.require_exact_handle = true;
        assert_eq!(gdi.initialize(&target), Err(BackendError::TargetNotFound));
    }
}
