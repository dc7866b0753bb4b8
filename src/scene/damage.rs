// SPDX-License-Identifier: GPL-3.0-only

//! Per-output damage accumulation across a render pass. Individual
//! [`super::Surface`] commits contribute physical-space rectangles here;
//! the render loop drains the tracker once per frame.

use smithay::utils::{Physical, Rectangle};

#[derive(Debug, Default)]
pub struct DamageTracker {
    regions: Vec<Rectangle<i32, Physical>>,
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rects: impl IntoIterator<Item = Rectangle<i32, Physical>>) {
        self.regions.extend(rects);
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drain and coalesce the accumulated damage for this frame. Adjacent
    /// or overlapping rectangles are merged so the backend submits the
    /// smallest possible number of damaged regions.
    pub fn drain(&mut self) -> Vec<Rectangle<i32, Physical>> {
        let mut regions = std::mem::take(&mut self.regions);
        regions.sort_by_key(|r| (r.loc.x, r.loc.y));

        let mut merged: Vec<Rectangle<i32, Physical>> = Vec::new();
        for rect in regions {
            if let Some(last) = merged.last_mut() {
                if last.overlaps(rect) || adjacent(*last, rect) {
                    *last = last.merge(rect);
                    continue;
                }
            }
            merged.push(rect);
        }
        merged
    }
}

fn adjacent(a: Rectangle<i32, Physical>, b: Rectangle<i32, Physical>) -> bool {
    // touching edges with no gap count as adjacent, so a full-width damage
    // strip doesn't get split into two submits that happen to abut.
    let a_right = a.loc.x + a.size.w;
    let b_right = b.loc.x + b.size.w;
    let a_bottom = a.loc.y + a.size.h;
    let b_bottom = b.loc.y + b.size.h;
    let horizontally_touching = a_right == b.loc.x || b_right == a.loc.x;
    let vertically_touching = a_bottom == b.loc.y || b_bottom == a.loc.y;
    (horizontally_touching && a.loc.y == b.loc.y && a.size.h == b.size.h)
        || (vertically_touching && a.loc.x == b.loc.x && a.size.w == b.size.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smithay::utils::{Point, Size};

    #[test]
    fn drain_merges_overlapping_regions() {
        let mut tracker = DamageTracker::new();
        tracker.add([
            Rectangle::new(Point::from((0, 0)), Size::from((10, 10))),
            Rectangle::new(Point::from((5, 5)), Size::from((10, 10))),
        ]);
        let merged = tracker.drain();
        assert_eq!(merged.len(), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn drain_keeps_disjoint_regions_separate() {
        let mut tracker = DamageTracker::new();
        tracker.add([
            Rectangle::new(Point::from((0, 0)), Size::from((10, 10))),
            Rectangle::new(Point::from((500, 500)), Size::from((10, 10))),
        ]);
        assert_eq!(tracker.drain().len(), 2);
    }
}
