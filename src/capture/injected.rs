//! Capture through a hook inside the target process

use super::backend::{BackendError, BackendKind, BackendParams, CaptureBackend, FrameOutcome};
use crate::clock::ClockTime;
use crate::convert::FrameConverter;
use crate::platform::{AttachRequest, PlatformError, ProcessHook};
use log::{debug, info, warn};
use std::sync::Arc;

/// Hook wait budget, in frame lengths
const HOOK_TIMEOUT_FRAMES: ClockTime = 100;

pub struct InjectedBackend {
    hook: Option<Box<dyn ProcessHook>>,
    converter: FrameConverter,
    attached: bool,
    exited: bool,
}

impl InjectedBackend {
    pub fn new(hook: Option<Box<dyn ProcessHook>>) -> Self {
        Self {
            hook,
            converter: FrameConverter::new(0, 0),
            attached: false,
            exited: false,
        }
    }

    fn attach_request(params: &BackendParams) -> AttachRequest {
        let target = &params.target;
        AttachRequest {
            class_name: target.class_name.clone(),
            title: target.title.clone(),
            executable: target
                .executable
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            scale_width: params.output_width,
            scale_height: params.output_height,
            anti_cheat: params.anti_cheat,
            timeout: params.frame_length * HOOK_TIMEOUT_FRAMES,
        }
    }
}

impl CaptureBackend for InjectedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Injected
    }

    fn is_ready(&self) -> bool {
        self.attached
    }

    fn initialize(&mut self, params: &BackendParams) -> Result<(), BackendError> {
        if self.exited {
            return Err(BackendError::TargetExited);
        }
        let Some(hook) = self.hook.as_mut() else {
            return Err(BackendError::NoHook);
        };

        self.converter = FrameConverter::new(params.output_width, params.output_height);
        let request = Self::attach_request(params);
        match hook.attach(&request) {
            Ok(()) => {
                info!(
                    "Hooked class={:?} title={:?} anti_cheat={}",
                    request.class_name, request.title, request.anti_cheat
                );
                self.attached = true;
                Ok(())
            }
            Err(PlatformError::ProcessExited) => {
                self.exited = true;
                Err(BackendError::TargetExited)
            }
            Err(PlatformError::NotFound(what)) => {
                debug!("Hook target not found: {}", what);
                Err(BackendError::TargetNotFound)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn produce_frame(
        &mut self,
        _now: ClockTime,
        allow_repeat: bool,
    ) -> Result<FrameOutcome, BackendError> {
        if !self.attached {
            return Ok(FrameOutcome::Empty);
        }
        let Some(hook) = self.hook.as_mut() else {
            return Ok(FrameOutcome::Empty);
        };

        match hook.pull(allow_repeat) {
            Ok(Some(pulled)) => {
                let frame = Arc::new(self.converter.convert(&pulled.buffer));
                if pulled.repeated {
                    Ok(FrameOutcome::Repeated(frame))
                } else {
                    Ok(FrameOutcome::Fresh(frame))
                }
            }
            Ok(None) => Ok(FrameOutcome::Empty),
            Err(PlatformError::ProcessExited) => {
                warn!("Hooked process exited");
                self.attached = false;
                self.exited = true;
                Err(BackendError::TargetExited)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn cleanup(&mut self) {
        if self.attached {
            if let Some(hook) = self.hook.as_mut() {
                hook.detach();
            }
            self.attached = false;
        }
    }
}
