//! Screen-space region algebra
//!
//! A `Region` is a set of pairwise disjoint, non-empty rectangles. All
//! operations return new values; there are no handles to release.

use std::fmt;

/// Half-open screen rectangle `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_size(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self::new(left, top, left + width as i32, top + height as i32)
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Pieces of `self` not covered by `other` (at most four, disjoint)
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        let Some(cut) = self.intersect(other) else {
            return vec![*self];
        };

        let mut pieces = Vec::with_capacity(4);
        // full-width bands above and below the cut
        if cut.top > self.top {
            pieces.push(Rect::new(self.left, self.top, self.right, cut.top));
        }
        if cut.bottom < self.bottom {
            pieces.push(Rect::new(self.left, cut.bottom, self.right, self.bottom));
        }
        // side pieces within the cut band
        if cut.left > self.left {
            pieces.push(Rect::new(self.left, cut.top, cut.left, cut.bottom));
        }
        if cut.right < self.right {
            pieces.push(Rect::new(cut.right, cut.top, self.right, cut.bottom));
        }
        pieces
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Set of screen pixels represented as disjoint rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::empty()
        } else {
            Self { rects: vec![rect] }
        }
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    /// Smallest rectangle covering the region
    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.rects.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| {
            Rect::new(
                acc.left.min(r.left),
                acc.top.min(r.top),
                acc.right.max(r.right),
                acc.bottom.max(r.bottom),
            )
        }))
    }

    pub fn union(&self, other: &Region) -> Region {
        let mut rects = self.rects.clone();
        rects.extend(other.difference(self).rects);
        Region { rects }
    }

    pub fn difference(&self, other: &Region) -> Region {
        let mut rects = self.rects.clone();
        for cut in &other.rects {
            rects = rects.iter().flat_map(|r| r.subtract(cut)).collect();
            if rects.is_empty() {
                break;
            }
        }
        Region { rects }
    }

    pub fn intersection(&self, other: &Region) -> Region {
        // both sides are disjoint, so the pairwise pieces are too
        let rects = self
            .rects
            .iter()
            .flat_map(|a| other.rects.iter().filter_map(move |b| a.intersect(b)))
            .collect();
        Region { rects }
    }

    pub fn is_disjoint(&self, other: &Region) -> bool {
        self.intersection(other).is_empty()
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_center_leaves_frame() {
        let outer = Rect::new(0, 0, 10, 10);
        let inner = Rect::new(3, 3, 6, 6);
        let pieces = outer.subtract(&inner);
        assert_eq!(pieces.len(), 4);
        let area: u64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(area, 100 - 9);
        assert!(!pieces.iter().any(|p| p.contains(4, 4)));
    }

    #[test]
    fn union_counts_overlap_once() {
        let a = Region::from_rect(Rect::new(0, 0, 10, 10));
        let b = Region::from_rect(Rect::new(5, 5, 15, 15));
        let u = a.union(&b);
        assert_eq!(u.area(), 100 + 100 - 25);
        assert!(u.contains(12, 12));
        assert!(u.contains(1, 1));
        assert!(!u.contains(12, 1));
    }

    #[test]
    fn intersection_and_difference_partition() {
        let a = Region::from_rect(Rect::new(0, 0, 10, 10));
        let b = Region::from_rect(Rect::new(5, -5, 20, 5));
        let inter = a.intersection(&b);
        let diff = a.difference(&b);
        assert_eq!(inter.area(), 25);
        assert_eq!(inter.area() + diff.area(), a.area());
        assert!(inter.is_disjoint(&diff));
    }

    #[test]
    fn bounds_of_scattered_region() {
        let r = Region::from_rect(Rect::new(0, 0, 2, 2)).union(&Rect::new(8, 9, 10, 12).into());
        assert_eq!(r.bounds(), Some(Rect::new(0, 0, 10, 12)));
        assert_eq!(Region::empty().bounds(), None);
    }
}
