//! Capture session
//!
//! Owns the pacer and the one active backend, applies configuration changes
//! between frames and exposes the blocking "deliver next frame" call.

use crate::capture::{
    BackendError, BackendHandle, BackendKind, BackendParams, CaptureBackend, DesktopBackend,
    GdiBackend, InjectedBackend,
};
use crate::clock::{ClockTime, ReferenceClock, UNITS_PER_MS};
use crate::config::{CaptureConfig, CaptureMode, Config, ConfigSource, OutputConfig};
use crate::pacer::{frame_length_for_fps, FramePacer, PacingStats, Sample, Tick};
use crate::platform::Platform;
use crate::runtime_settings::RuntimeSettings;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Wait between attempts to bind a source that is not there yet
pub const RETRY_WAIT: ClockTime = 50 * UNITS_PER_MS;

/// Why no frame was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliverError {
    /// The capture source is permanently unavailable
    Unavailable(BackendError),
    /// The session was deactivated
    Inactive,
}

impl fmt::Display for DeliverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliverError::Unavailable(err) => write!(f, "Capture unavailable: {}", err),
            DeliverError::Inactive => write!(f, "Capture session inactive"),
        }
    }
}

impl std::error::Error for DeliverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliverError::Unavailable(err) => Some(err),
            DeliverError::Inactive => None,
        }
    }
}

pub struct CaptureSession {
    id: Uuid,
    config: CaptureConfig,
    output: OutputConfig,
    source: Box<dyn ConfigSource>,
    platform: Box<dyn Platform>,
    settings: Arc<RuntimeSettings>,
    pacer: FramePacer,
    backend: Option<BackendHandle>,
    stopped: Option<BackendError>,
}

impl CaptureSession {
    pub fn new(
        config: &Config,
        source: Box<dyn ConfigSource>,
        platform: Box<dyn Platform>,
        clock: Arc<dyn ReferenceClock>,
        settings: Arc<RuntimeSettings>,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(
            "[{}] capture session: mode={} fps={} output={}x{}",
            id, config.capture.mode, config.capture.fps, config.output.width, config.output.height
        );
        Self {
            id,
            config: config.capture.clone(),
            output: config.output.clone(),
            source,
            platform,
            settings,
            pacer: FramePacer::new(clock, frame_length_for_fps(config.capture.fps)),
            backend: None,
            stopped: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn stats(&self) -> PacingStats {
        self.pacer.stats()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Re-read the configuration source; any change discards the backend
    pub fn reload_config(&mut self) -> usize {
        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("[{}] configuration re-read failed: {}", self.id, err);
                return 0;
            }
        };
        let changes = self.config.apply_snapshot(&snapshot);
        if changes > 0 {
            self.reset_backend();
        }
        changes
    }

    /// Block until the next frame is due and return it
    pub fn deliver_frame(&mut self) -> Result<Sample, DeliverError> {
        loop {
            if !self.settings.is_active() {
                info!("[{}] inactive - deliver_frame", self.id);
                return Err(DeliverError::Inactive);
            }

            if self.settings.take_reload_request() {
                let changes = self.reload_config();
                info!(
                    "[{}] Received re-read configuration event, number of changes: {}",
                    self.id, changes
                );
            }

            if let Some(err) = &self.stopped {
                return Err(DeliverError::Unavailable(err.clone()));
            }

            if self.backend.is_none() {
                match self.build_backend() {
                    Ok(backend) => self.backend = Some(backend),
                    Err(err) => {
                        self.handle_error(err)?;
                        continue;
                    }
                }
            }

            let params = self.params();
            let result = match self.backend.as_mut() {
                Some(backend) => Self::step(self.id, &mut self.pacer, backend, &params),
                None => continue,
            };

            match result {
                Ok(Tick::Delivered(sample)) => return Ok(sample),
                Ok(Tick::Pending) | Ok(Tick::Anchored) => {}
                Err(err) => self.handle_error(err)?,
            }
        }
    }

    /// Release the backend
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            info!("[{}] closing {} capture", self.id, backend.kind());
        }
    }

    fn step(
        id: Uuid,
        pacer: &mut FramePacer,
        backend: &mut BackendHandle,
        params: &BackendParams,
    ) -> Result<Tick, BackendError> {
        if !backend.is_ready() {
            backend.initialize(params)?;
            info!(
                "[{}] {} capture ready, frame_length: {}",
                id,
                backend.kind(),
                params.frame_length
            );
            pacer.reset();
        }
        pacer.tick(backend)
    }

    fn handle_error(&mut self, err: BackendError) -> Result<(), DeliverError> {
        if err.is_permanent() {
            error!("[{}] {}", self.id, err);
            self.stopped = Some(err.clone());
            return Err(DeliverError::Unavailable(err));
        }
        debug!("[{}] {} - retrying", self.id, err);
        self.pacer.clock().sleep(RETRY_WAIT);
        self.reload_config();
        Ok(())
    }

    fn build_backend(&mut self) -> Result<BackendHandle, BackendError> {
        let backend = match self.config.mode {
            CaptureMode::Desktop => {
                BackendHandle::Desktop(DesktopBackend::new(self.platform.duplicator()?))
            }
            CaptureMode::Gdi => BackendHandle::Gdi(GdiBackend::new(
                self.platform.window_system()?,
                self.platform.screen_source()?,
            )),
            CaptureMode::Inject => {
                BackendHandle::Injected(InjectedBackend::new(self.platform.process_hook()))
            }
            CaptureMode::DShow => {
                return Err(BackendError::Unsupported(CaptureMode::DShow.to_string()))
            }
        };
        info!("[{}] using {} capture", self.id, backend.kind());
        Ok(backend)
    }

    fn reset_backend(&mut self) {
        if let Some(backend) = self.backend.take() {
            info!("[{}] configuration changed, dropping {} capture", self.id, backend.kind());
        }
        self.stopped = None;
        self.pacer.set_frame_length(frame_length_for_fps(self.config.fps));
    }

    fn params(&self) -> BackendParams {
        BackendParams {
            output_width: self.output.width,
            output_height: self.output.height,
            frame_length: self.pacer.state().frame_length(),
            adapter: self.config.adapter,
            desktop: self.config.desktop,
            max_retry: self.config.max_retry,
            target: self.config.target(),
            anti_cheat: self.config.anti_cheat,
            capture_once: self.config.capture_once,
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
