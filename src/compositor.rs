//! Occlusion compositing
//!
//! Splits the virtual screen into the pixels that belong to the capture
//! target, the parts of the target covered by other windows, and everything
//! else. Only the first set is copied from the desktop; the other two are
//! painted with sentinel colors so downstream code can tell them apart.

use crate::capture::frame::{Argb, PixelBuffer, BYTES_PER_PIXEL};
use crate::region::{Rect, Region};
use crate::window::WindowRecord;

/// Sentinel for screen area the target never occupied
pub const BACKGROUND_FILL: Argb = 0xFFFF_0000;

/// Sentinel for target area covered by other windows
pub const FOREGROUND_FILL: Argb = 0xFFFF_FF00;

/// Three disjoint regions that together cover the screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSet {
    /// Target pixels that are actually on top
    pub visible: Region,
    /// Target area hidden by other windows
    pub foreground: Region,
    /// Remainder of the screen
    pub background: Region,
}

/// Computes and renders target-only screen images
#[derive(Debug, Clone, Copy)]
pub struct OcclusionCompositor {
    pub background_fill: Argb,
    pub foreground_fill: Argb,
}

impl Default for OcclusionCompositor {
    fn default() -> Self {
        Self {
            background_fill: BACKGROUND_FILL,
            foreground_fill: FOREGROUND_FILL,
        }
    }
}

impl OcclusionCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate regions over `windows`, ordered bottom-most first
    pub fn compute_regions(&self, screen: Rect, windows: &[WindowRecord]) -> RegionSet {
        let screen_region = Region::from_rect(screen);
        let mut visible = Region::empty();
        let mut foreground = Region::empty();

        for window in windows {
            let Some(bounds) = window.bounds.intersect(&screen) else {
                continue;
            };
            let area = Region::from_rect(bounds);

            if window.belongs_to_target {
                visible = visible.union(&area);
                foreground = foreground.difference(&area);
            } else {
                let covered = visible.intersection(&area);
                if covered.is_empty() {
                    continue;
                }
                visible = visible.difference(&covered);
                foreground = foreground.union(&covered);
            }
        }

        // foreground lies outside visible, so it is carved out of the
        // background as well to keep the three sets disjoint
        let background = screen_region.difference(&visible).difference(&foreground);

        RegionSet {
            visible,
            foreground,
            background,
        }
    }

    /// Paint sentinels and copy target pixels from `desktop`
    ///
    /// `desktop` holds the screen contents with its origin at `screen`'s
    /// top-left corner. The result has the screen's dimensions.
    pub fn render(&self, regions: &RegionSet, screen: Rect, desktop: &PixelBuffer) -> PixelBuffer {
        let mut out = PixelBuffer::filled(screen.width(), screen.height(), 0);
        fill_region(&mut out, screen, &regions.background, self.background_fill);
        fill_region(&mut out, screen, &regions.foreground, self.foreground_fill);
        blit_region(&mut out, screen, &regions.visible, desktop);
        out
    }

    /// Full compositing pass
    pub fn composite(
        &self,
        screen: Rect,
        windows: &[WindowRecord],
        desktop: &PixelBuffer,
    ) -> (RegionSet, PixelBuffer) {
        let regions = self.compute_regions(screen, windows);
        let image = self.render(&regions, screen, desktop);
        (regions, image)
    }
}

/// Rect clipped to `screen` and translated into buffer coordinates
fn local_rect(rect: &Rect, screen: Rect, width: u32, height: u32) -> Option<Rect> {
    let clipped = rect.intersect(&screen)?;
    let local = Rect::new(
        clipped.left - screen.left,
        clipped.top - screen.top,
        clipped.right - screen.left,
        clipped.bottom - screen.top,
    );
    local.intersect(&Rect::new(0, 0, width as i32, height as i32))
}

fn fill_region(buf: &mut PixelBuffer, screen: Rect, region: &Region, color: Argb) {
    let pixel = color.to_le_bytes();
    for rect in region.rects() {
        let Some(local) = local_rect(rect, screen, buf.width, buf.height) else {
            continue;
        };
        for y in local.top..local.bottom {
            let row = buf.row_mut(y as u32);
            let span = &mut row[local.left as usize * BYTES_PER_PIXEL..local.right as usize * BYTES_PER_PIXEL];
            for chunk in span.chunks_exact_mut(BYTES_PER_PIXEL) {
                chunk.copy_from_slice(&pixel);
            }
        }
    }
}

fn blit_region(buf: &mut PixelBuffer, screen: Rect, region: &Region, src: &PixelBuffer) {
    let width = buf.width.min(src.width);
    let height = buf.height.min(src.height);
    for rect in region.rects() {
        let Some(local) = local_rect(rect, screen, width, height) else {
            continue;
        };
        let start = local.left as usize * BYTES_PER_PIXEL;
        let end = local.right as usize * BYTES_PER_PIXEL;
        for y in local.top..local.bottom {
            let y = y as u32;
            buf.row_mut(y)[start..end].copy_from_slice(&src.row(y)[start..end]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowId;

    const SCREEN: Rect = Rect::new(0, 0, 100, 80);

    fn record(id: u64, bounds: Rect, target: bool) -> WindowRecord {
        WindowRecord {
            id: WindowId(id),
            bounds,
            belongs_to_target: target,
        }
    }

    fn assert_partition(set: &RegionSet, screen: Rect) {
        assert!(set.visible.is_disjoint(&set.foreground));
        assert!(set.visible.is_disjoint(&set.background));
        assert!(set.foreground.is_disjoint(&set.background));
        let total = set.visible.area() + set.foreground.area() + set.background.area();
        assert_eq!(total, screen.area());
    }

    #[test]
    fn occluder_moves_target_area_to_foreground() {
        let windows = vec![
            record(1, Rect::new(10, 10, 60, 60), true),
            record(2, Rect::new(40, 40, 90, 70), false),
        ];
        let set = OcclusionCompositor::new().compute_regions(SCREEN, &windows);
        assert_partition(&set, SCREEN);
        assert_eq!(set.foreground.area(), 20 * 20);
        assert_eq!(set.visible.area(), 50 * 50 - 20 * 20);
        assert!(set.foreground.contains(50, 50));
        assert!(set.background.contains(80, 65));
    }

    #[test]
    fn window_below_target_does_not_occlude() {
        let windows = vec![
            record(2, Rect::new(0, 0, 100, 80), false),
            record(1, Rect::new(10, 10, 30, 30), true),
        ];
        let set = OcclusionCompositor::new().compute_regions(SCREEN, &windows);
        assert_partition(&set, SCREEN);
        assert_eq!(set.visible.area(), 400);
        assert!(set.foreground.is_empty());
    }

    #[test]
    fn raised_target_window_reclaims_foreground() {
        let windows = vec![
            record(1, Rect::new(0, 0, 50, 50), true),
            record(2, Rect::new(20, 20, 70, 70), false),
            record(3, Rect::new(30, 30, 60, 60), true),
        ];
        let set = OcclusionCompositor::new().compute_regions(SCREEN, &windows);
        assert_partition(&set, SCREEN);
        assert!(set.visible.contains(35, 35));
        assert!(set.foreground.contains(25, 25));
        assert!(!set.foreground.contains(35, 35));
    }

    #[test]
    fn offscreen_windows_are_clipped() {
        let windows = vec![
            record(1, Rect::new(-50, -50, 20, 20), true),
            record(2, Rect::new(90, 70, 300, 300), false),
        ];
        let set = OcclusionCompositor::new().compute_regions(SCREEN, &windows);
        assert_partition(&set, SCREEN);
        assert_eq!(set.visible.area(), 400);
    }

    #[test]
    fn render_paints_sentinels_and_copies_target() {
        let windows = vec![
            record(1, Rect::new(0, 0, 40, 40), true),
            record(2, Rect::new(20, 20, 60, 60), false),
        ];
        let desktop = PixelBuffer::filled(100, 80, 0xFF12_3456);
        let (_, image) = OcclusionCompositor::new().composite(SCREEN, &windows, &desktop);
        assert_eq!(image.width, 100);
        assert_eq!(image.pixel(5, 5), 0xFF12_3456);
        assert_eq!(image.pixel(30, 30), FOREGROUND_FILL);
        assert_eq!(image.pixel(50, 50), BACKGROUND_FILL);
        assert_eq!(image.pixel(99, 79), BACKGROUND_FILL);
    }

    #[test]
    fn render_honours_screen_origin() {
        let screen = Rect::new(-100, 0, 0, 50);
        let windows = vec![record(1, Rect::new(-100, 0, -90, 10), true)];
        let desktop = PixelBuffer::filled(100, 50, 0xFF00_00FF);
        let (_, image) = OcclusionCompositor::new().composite(screen, &windows, &desktop);
        assert_eq!(image.pixel(0, 0), 0xFF00_00FF);
        assert_eq!(image.pixel(10, 0), BACKGROUND_FILL);
    }
}
