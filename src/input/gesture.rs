// SPDX-License-Identifier: GPL-3.0-only

//! Touch gesture recognition: swipe, edge-swipe and pinch, detected from
//! raw per-finger touch-down/motion/up events rather than delivered as a
//! libinput gesture event (the backend only gives us raw touch points).

use smithay::utils::{Logical, Point};
use std::collections::HashMap;

pub const MIN_FINGERS: usize = 3;
pub const MIN_SWIPE_DISTANCE: f64 = 100.0;
pub const EDGE_SWIPE_THRESHOLD: f64 = 50.0;
pub const MIN_PINCH_DISTANCE: f64 = 70.0;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Direction: u8 {
        const LEFT  = 1 << 0;
        const RIGHT = 1 << 1;
        const UP    = 1 << 2;
        const DOWN  = 1 << 3;
        const IN    = 1 << 4;
        const OUT   = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Swipe,
    EdgeSwipe,
    Pinch,
}

#[derive(Debug, Clone, Copy)]
pub struct Gesture {
    pub kind: GestureKind,
    pub direction: Direction,
    pub finger_count: usize,
}

struct Finger {
    start: Point<f64, Logical>,
    last: Point<f64, Logical>,
}

/// Recognizes at most one gesture per touch sequence (the span between the
/// first finger going down and the last finger lifting). Once a gesture
/// has been emitted for a sequence, further motion within that same
/// sequence is suppressed until all fingers are up.
pub struct GestureRecognizer {
    fingers: HashMap<i32, Finger>,
    /// The output area's edges, needed to tell an edge-swipe from a
    /// regular swipe — a swipe that *starts* within `EDGE_SWIPE_THRESHOLD`
    /// of an output edge is an edge-swipe instead.
    output_size: (f64, f64),
    emitted_for_sequence: bool,
}

impl GestureRecognizer {
    pub fn new(output_size: (f64, f64)) -> Self {
        Self { fingers: HashMap::new(), output_size, emitted_for_sequence: false }
    }

    pub fn touch_down(&mut self, slot: i32, at: Point<f64, Logical>) {
        if self.fingers.is_empty() {
            self.emitted_for_sequence = false;
        }
        self.fingers.insert(slot, Finger { start: at, last: at });
    }

    pub fn touch_up(&mut self, slot: i32) {
        self.fingers.remove(&slot);
        if self.fingers.is_empty() {
            self.emitted_for_sequence = false;
        }
    }

    /// Feed motion for `slot` and return a newly-recognized gesture, if
    /// any. Returns `None` once a gesture has already fired for the
    /// current sequence.
    pub fn touch_motion(&mut self, slot: i32, at: Point<f64, Logical>) -> Option<Gesture> {
        if let Some(finger) = self.fingers.get_mut(&slot) {
            finger.last = at;
        }
        if self.emitted_for_sequence || self.fingers.len() < MIN_FINGERS {
            return None;
        }

        // swipe is checked before pinch: a near-parallel multi-finger drag
        // that also happens to spread slightly is treated as a swipe, not
        // a weak pinch.
        if let Some(g) = self.detect_swipe() {
            self.emitted_for_sequence = true;
            return Some(g);
        }
        if let Some(g) = self.detect_pinch() {
            self.emitted_for_sequence = true;
            return Some(g);
        }
        None
    }

    fn average_delta(&self) -> Point<f64, Logical> {
        let n = self.fingers.len() as f64;
        let (mut dx, mut dy) = (0.0, 0.0);
        for f in self.fingers.values() {
            dx += f.last.x - f.start.x;
            dy += f.last.y - f.start.y;
        }
        Point::from((dx / n, dy / n))
    }

    fn starts_near_edge(&self) -> Option<Direction> {
        for f in self.fingers.values() {
            if f.start.x <= EDGE_SWIPE_THRESHOLD {
                return Some(Direction::LEFT);
            }
            if f.start.x >= self.output_size.0 - EDGE_SWIPE_THRESHOLD {
                return Some(Direction::RIGHT);
            }
            if f.start.y <= EDGE_SWIPE_THRESHOLD {
                return Some(Direction::UP);
            }
            if f.start.y >= self.output_size.1 - EDGE_SWIPE_THRESHOLD {
                return Some(Direction::DOWN);
            }
        }
        None
    }

    fn detect_swipe(&self) -> Option<Gesture> {
        let delta = self.average_delta();
        let distance = (delta.x * delta.x + delta.y * delta.y).sqrt();
        if distance < MIN_SWIPE_DISTANCE {
            return None;
        }
        let direction = direction_from_delta(delta);
        let kind = if self.starts_near_edge().is_some() { GestureKind::EdgeSwipe } else { GestureKind::Swipe };
        Some(Gesture { kind, direction, finger_count: self.fingers.len() })
    }

    fn detect_pinch(&self) -> Option<Gesture> {
        if self.fingers.len() < 2 {
            return None;
        }
        let start_spread = self.spread(|f| f.start);
        let last_spread = self.spread(|f| f.last);
        let delta = (last_spread - start_spread).abs();
        if delta < MIN_PINCH_DISTANCE {
            return None;
        }
        let direction = if last_spread > start_spread { Direction::OUT } else { Direction::IN };
        Some(Gesture { kind: GestureKind::Pinch, direction, finger_count: self.fingers.len() })
    }

    fn spread(&self, pick: impl Fn(&Finger) -> Point<f64, Logical>) -> f64 {
        let points: Vec<_> = self.fingers.values().map(&pick).collect();
        let cx = points.iter().map(|p| p.x).sum::<f64>() / points.len() as f64;
        let cy = points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64;
        points.iter().map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()).sum::<f64>() / points.len() as f64
    }
}

fn direction_from_delta(delta: Point<f64, Logical>) -> Direction {
    if delta.x.abs() > delta.y.abs() {
        if delta.x > 0.0 { Direction::RIGHT } else { Direction::LEFT }
    } else if delta.y > 0.0 {
        Direction::DOWN
    } else {
        Direction::UP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_finger_swipe_down_is_recognized() {
        let mut rec = GestureRecognizer::new((1920.0, 1080.0));
        for slot in 0..3 {
            rec.touch_down(slot, Point::from((500.0 + slot as f64 * 10.0, 500.0)));
        }
        let mut gesture = None;
        for slot in 0..3 {
            if let Some(g) = rec.touch_motion(slot, Point::from((500.0 + slot as f64 * 10.0, 650.0))) {
                gesture = Some(g);
            }
        }
        let g = gesture.expect("should recognize a swipe");
        assert_eq!(g.kind, GestureKind::Swipe);
        assert_eq!(g.direction, Direction::DOWN);
        assert_eq!(g.finger_count, 3);
    }

    #[test]
    fn fewer_than_min_fingers_never_fires() {
        let mut rec = GestureRecognizer::new((1920.0, 1080.0));
        rec.touch_down(0, Point::from((500.0, 500.0)));
        rec.touch_down(1, Point::from((510.0, 500.0)));
        assert!(rec.touch_motion(0, Point::from((500.0, 700.0))).is_none());
    }

    #[test]
    fn swipe_starting_at_screen_edge_is_classified_as_edge_swipe() {
        let mut rec = GestureRecognizer::new((1920.0, 1080.0));
        for slot in 0..3 {
            rec.touch_down(slot, Point::from((10.0, 500.0 + slot as f64 * 5.0)));
        }
        let mut gesture = None;
        for slot in 0..3 {
            if let Some(g) = rec.touch_motion(slot, Point::from((160.0, 500.0 + slot as f64 * 5.0))) {
                gesture = Some(g);
            }
        }
        assert_eq!(gesture.unwrap().kind, GestureKind::EdgeSwipe);
    }

    #[test]
    fn only_one_gesture_fires_per_touch_sequence() {
        let mut rec = GestureRecognizer::new((1920.0, 1080.0));
        for slot in 0..3 {
            rec.touch_down(slot, Point::from((500.0, 500.0)));
        }
        let mut fired = 0;
        for dy in [150.0, 300.0, 450.0] {
            for slot in 0..3 {
                if rec.touch_motion(slot, Point::from((500.0, 500.0 + dy))).is_some() {
                    fired += 1;
                }
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn pinch_out_is_recognized_when_fingers_spread() {
        let mut rec = GestureRecognizer::new((1920.0, 1080.0));
        rec.touch_down(0, Point::from((500.0, 500.0)));
        rec.touch_down(1, Point::from((520.0, 500.0)));
        rec.touch_down(2, Point::from((500.0, 520.0)));
        let mut gesture = None;
        gesture = gesture.or(rec.touch_motion(0, Point::from((400.0, 400.0))));
        gesture = gesture.or(rec.touch_motion(1, Point::from((620.0, 400.0))));
        gesture = gesture.or(rec.touch_motion(2, Point::from((400.0, 620.0))));
        let g = gesture.expect("should recognize a pinch");
        assert_eq!(g.kind, GestureKind::Pinch);
        assert_eq!(g.direction, Direction::OUT);
    }
}
