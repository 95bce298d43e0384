//! Capture target window resolution

use super::{WindowId, WindowInfo};
use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;

/// Which criteria select the capture window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Only the configured handle is acceptable
    HandleOnly,
    /// Class name; the title is carried along but never filters
    #[default]
    ClassAndTitle,
    /// Class name, executable path, and handle when exact match is required
    ClassTitleExeAndHandle,
}

/// Search criteria for the window to capture
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureTarget {
    pub match_mode: MatchMode,
    pub handle: Option<WindowId>,
    pub class_name: String,
    pub title: String,
    pub executable: Option<PathBuf>,
    pub require_exact_handle: bool,
}

impl CaptureTarget {
    fn handle_required(&self) -> bool {
        self.require_exact_handle || self.match_mode == MatchMode::HandleOnly
    }

    fn executable_filter(&self) -> Option<&PathBuf> {
        self.executable
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// Selects the window matching a `CaptureTarget` from an enumeration
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowResolver;

impl WindowResolver {
    pub fn new() -> Self {
        Self
    }

    /// First acceptable window in enumeration (topmost-first) order
    pub fn resolve<'a>(
        &self,
        target: &CaptureTarget,
        windows: &'a [WindowInfo],
    ) -> Option<&'a WindowInfo> {
        let lookup: HashMap<WindowId, &WindowInfo> = windows.iter().map(|w| (w.id, w)).collect();
        let found = windows
            .iter()
            .find(|w| self.is_capturable(w, &lookup) && self.matches(target, w));
        match found {
            Some(w) => debug!("resolved capture window {} class={:?}", w.id, w.class_name),
            None => debug!("no window matches class={:?}", target.class_name),
        }
        found
    }

    /// Pre-flight check that a known handle still names a capturable window
    pub fn validate_handle(&self, id: WindowId, windows: &[WindowInfo]) -> bool {
        let lookup: HashMap<WindowId, &WindowInfo> = windows.iter().map(|w| (w.id, w)).collect();
        lookup
            .get(&id)
            .is_some_and(|w| self.is_capturable(w, &lookup))
    }

    /// Alt-tab style filter: visible, its own active popup, has a real title
    /// bar, not a tool window
    fn is_capturable(&self, window: &WindowInfo, lookup: &HashMap<WindowId, &WindowInfo>) -> bool {
        if !window.visible || window.minimized {
            return false;
        }

        if Self::active_popup_of_owner_chain(window, lookup) != window.id {
            return false;
        }

        if window.title_bar.invisible && !window.title_bar.focusable {
            return false;
        }

        !window.tool_window
    }

    /// Walk from the root owner through last-active popups until a visible
    /// one is reached or the chain stops moving
    fn active_popup_of_owner_chain(
        window: &WindowInfo,
        lookup: &HashMap<WindowId, &WindowInfo>,
    ) -> WindowId {
        let popup_of = |id: WindowId| lookup.get(&id).map_or(id, |w| w.last_active_popup);
        let visible = |id: WindowId| lookup.get(&id).is_some_and(|w| w.visible);

        let mut walk = None;
        let mut next = window.root_owner;
        // bounded by the enumeration size; a cyclic chain just stops
        for _ in 0..=lookup.len() {
            if walk == Some(next) {
                break;
            }
            walk = Some(next);
            next = popup_of(next);
            if visible(next) {
                break;
            }
        }
        walk.unwrap_or(window.id)
    }

    fn matches(&self, target: &CaptureTarget, window: &WindowInfo) -> bool {
        if target.handle_required() && target.handle != Some(window.id) {
            return false;
        }

        match target.match_mode {
            MatchMode::HandleOnly => true,
            MatchMode::ClassAndTitle => window.class_name == target.class_name,
            MatchMode::ClassTitleExeAndHandle => {
                let exe_match = match target.executable_filter() {
                    Some(path) => window.executable.as_ref() == Some(path),
                    None => true,
                };
                window.class_name == target.class_name && exe_match
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Rect;
    use crate::window::TitleBarState;

    fn window(id: u64, class: &str) -> WindowInfo {
        WindowInfo::new(WindowId(id), class, "title", Rect::new(0, 0, 100, 100))
    }

    fn by_class(class: &str) -> CaptureTarget {
        CaptureTarget {
            match_mode: MatchMode::ClassAndTitle,
            class_name: class.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_match_in_enumeration_order() {
        let windows = vec![window(1, "Other"), window(2, "Game"), window(3, "Game")];
        let found = WindowResolver::new().resolve(&by_class("Game"), &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(2)));
    }

    #[test]
    fn single_match_found_regardless_of_order() {
        let mut windows = vec![
            window(1, "Shell_TrayWnd"),
            window(2, "Notepad"),
            window(3, "Chrome_WidgetWin_1"),
            window(4, "Game"),
        ];
        for rotation in 0..windows.len() {
            windows.rotate_left(rotation);
            let found = WindowResolver::new().resolve(&by_class("Game"), &windows);
            assert_eq!(found.map(|w| w.id), Some(WindowId(4)));
        }
    }

    #[test]
    fn rejects_minimized_hidden_and_tool_windows() {
        let mut minimized = window(1, "Game");
        minimized.minimized = true;
        let mut hidden = window(2, "Game");
        hidden.visible = false;
        let mut tool = window(3, "Game");
        tool.tool_window = true;
        let mut tray = window(4, "Game");
        tray.title_bar = TitleBarState {
            invisible: true,
            focusable: false,
        };

        let windows = vec![minimized, hidden, tool, tray];
        assert!(WindowResolver::new()
            .resolve(&by_class("Game"), &windows)
            .is_none());
    }

    #[test]
    fn rejects_owned_windows() {
        let owner = window(1, "Owner");
        let mut dialog = window(2, "Game");
        dialog.root_owner = WindowId(1);
        let windows = vec![dialog, owner];
        assert!(WindowResolver::new()
            .resolve(&by_class("Game"), &windows)
            .is_none());
    }

    #[test]
    fn popup_chain_walk() {
        let mut owner = window(1, "Game");
        owner.last_active_popup = WindowId(2);
        let mut popup = window(2, "Game");
        popup.root_owner = WindowId(1);

        // visible popup: the owner itself is the candidate, the popup is not
        let windows = vec![popup.clone(), owner.clone()];
        let found = WindowResolver::new().resolve(&by_class("Game"), &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(1)));

        // hidden popup: the walk moves past the owner, nothing qualifies
        popup.visible = false;
        let windows = vec![popup, owner];
        assert!(WindowResolver::new()
            .resolve(&by_class("Game"), &windows)
            .is_none());
    }

    #[test]
    fn exe_filter_applies() {
        let mut a = window(1, "Game");
        a.executable = Some(PathBuf::from("/opt/other"));
        let mut b = window(2, "Game");
        b.executable = Some(PathBuf::from("/opt/game"));
        let target = CaptureTarget {
            match_mode: MatchMode::ClassTitleExeAndHandle,
            class_name: "Game".to_string(),
            executable: Some(PathBuf::from("/opt/game")),
            ..Default::default()
        };
        let windows = vec![a, b];
        let found = WindowResolver::new().resolve(&target, &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(2)));
    }

    #[test]
    fn exact_handle_required() {
        let windows = vec![window(1, "Game"), window(2, "Game")];
        let target = CaptureTarget {
            match_mode: MatchMode::ClassTitleExeAndHandle,
            class_name: "Game".to_string(),
            handle: Some(WindowId(2)),
            require_exact_handle: true,
            ..Default::default()
        };
        let found = WindowResolver::new().resolve(&target, &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(2)));

        let handle_only = CaptureTarget {
            match_mode: MatchMode::HandleOnly,
            handle: Some(WindowId(1)),
            ..Default::default()
        };
        let found = WindowResolver::new().resolve(&handle_only, &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(1)));
    }

    #[test]
    fn validate_handle_checks_capturability() {
        let mut tool = window(2, "Tool");
        tool.tool_window = true;
        let windows = vec![window(1, "Game"), tool];
        let resolver = WindowResolver::new();
        assert!(resolver.validate_handle(WindowId(1), &windows));
        assert!(!resolver.validate_handle(WindowId(2), &windows));
        assert!(!resolver.validate_handle(WindowId(9), &windows));
    }

    #[test]
    fn title_does_not_filter() {
        let mut window = window(1, "Notepad");
        window.title = "notes.txt - Notepad".to_string();
        let target = CaptureTarget {
            title: "Untitled - Notepad".to_string(),
            ..by_class("Notepad")
        };
        let windows = vec![window];
        let found = WindowResolver::new().resolve(&target, &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(1)));
    }
}
