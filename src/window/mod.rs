//! Top-level window model
//!
//! Windows are plain data produced by a platform enumeration, topmost first.

mod resolver;

pub use resolver::{CaptureTarget, MatchMode, WindowResolver};

use crate::region::Rect;
use std::fmt;
use std::path::PathBuf;

/// Opaque platform window id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Title-bar accessibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleBarState {
    pub invisible: bool,
    pub focusable: bool,
}

impl Default for TitleBarState {
    fn default() -> Self {
        Self {
            invisible: false,
            focusable: true,
        }
    }
}

/// One entry of a full top-level window enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub class_name: String,
    pub title: String,
    /// Outer bounds in virtual-screen coordinates
    pub bounds: Rect,
    /// Owning process id
    pub pid: Option<u32>,
    /// Full path of the owning process executable
    pub executable: Option<PathBuf>,
    pub visible: bool,
    pub minimized: bool,
    pub tool_window: bool,
    pub title_bar: TitleBarState,
    /// Top of the owner chain (the window itself when unowned)
    pub root_owner: WindowId,
    /// Most recently active popup owned by this window (itself when none)
    pub last_active_popup: WindowId,
}

impl WindowInfo {
    /// Unowned, visible, normal window
    pub fn new(id: WindowId, class_name: &str, title: &str, bounds: Rect) -> Self {
        Self {
            id,
            class_name: class_name.to_string(),
            title: title.to_string(),
            bounds,
            pid: None,
            executable: None,
            visible: true,
            minimized: false,
            tool_window: false,
            title_bar: TitleBarState::default(),
            root_owner: id,
            last_active_popup: id,
        }
    }
}

/// Minimal window description used for occlusion compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub id: WindowId,
    pub bounds: Rect,
    pub belongs_to_target: bool,
}

/// Records for every on-screen window, bottom-most first
///
/// `windows` is a topmost-first enumeration; hidden and minimized windows do
/// not take part in occlusion.
pub fn occlusion_records(windows: &[WindowInfo], target_pid: Option<u32>) -> Vec<WindowRecord> {
    windows
        .iter()
        .rev()
        .filter(|w| w.visible && !w.minimized)
        .map(|w| WindowRecord {
            id: w.id,
            bounds: w.bounds,
            belongs_to_target: target_pid.is_some() && w.pid == target_pid,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occlusion_records_reverse_and_filter() {
        let mut top = WindowInfo::new(WindowId(1), "A", "", Rect::new(0, 0, 5, 5));
        top.pid = Some(10);
        let mut hidden = WindowInfo::new(WindowId(2), "B", "", Rect::new(0, 0, 5, 5));
        hidden.visible = false;
        let mut bottom = WindowInfo::new(WindowId(3), "C", "", Rect::new(0, 0, 5, 5));
        bottom.pid = Some(20);

        let records = occlusion_records(&[top, hidden, bottom], Some(20));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, WindowId(3));
        assert!(records[0].belongs_to_target);
        assert!(!records[1].belongs_to_target);
    }
}
