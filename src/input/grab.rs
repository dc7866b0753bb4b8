// SPDX-License-Identifier: GPL-3.0-only

//! Input grabs as an explicit sum type rather than a bundle of optional
//! callbacks. Only one grab can be active per seat at a time; starting a
//! new one implicitly cancels whatever was running before.

use smithay::desktop::Window;
use smithay::utils::{Logical, Point};

use crate::plugins::Capability;

/// A point and window geometry captured at grab start, used to compute the
/// delta as the pointer/touch point moves.
#[derive(Debug, Clone)]
pub struct GrabOrigin {
    pub pointer_start: Point<f64, Logical>,
    pub window_start: Point<i32, Logical>,
}

pub enum Grab {
    Move { window: Window, origin: GrabOrigin },
    Resize { window: Window, origin: GrabOrigin, edges: crate::shell::view::TiledEdges },
    /// A plugin-owned grab; `capabilities` is whatever it requested and is
    /// released back to the output's `ActivePlugins` set on cancel.
    Plugin { name: &'static str, capabilities: Capability },
}

impl Grab {
    pub fn capabilities(&self) -> Capability {
        match self {
            Grab::Move { .. } => Capability::CHANGE_VIEW_GEOMETRY,
            Grab::Resize { .. } => Capability::CHANGE_VIEW_GEOMETRY,
            Grab::Plugin { capabilities, .. } => *capabilities,
        }
    }
}

/// Tracks the single active grab for a seat, plus what to restore it to on
/// a session suspend/resume (VT switch away and back, for instance).
#[derive(Default)]
pub struct GrabState {
    active: Option<Grab>,
    /// Remembered across a suspend so the same grab can resume afterward
    /// instead of silently vanishing mid-drag.
    suspended: Option<Grab>,
}

impl GrabState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_grabbed(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&Grab> {
        self.active.as_ref()
    }

    /// Start a new grab, returning whatever was running before so the
    /// caller can run its cancel hook (e.g. send a synthetic touch-up).
    pub fn start(&mut self, grab: Grab) -> Option<Grab> {
        self.active.replace(grab)
    }

    pub fn end(&mut self) -> Option<Grab> {
        self.active.take()
    }

    /// Called on session suspend: the current grab is parked rather than
    /// cancelled, so resume can hand it straight back.
    pub fn suspend(&mut self) {
        self.suspended = self.active.take();
    }

    pub fn resume(&mut self) {
        if self.active.is_none() {
            self.active = self.suspended.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_a_grab_replaces_any_previous_one() {
        let mut state = GrabState::new();
        assert!(state.start(Grab::Plugin { name: "a", capabilities: Capability::GRAB_INPUT }).is_none());
        let previous = state.start(Grab::Plugin { name: "b", capabilities: Capability::GRAB_INPUT });
        assert!(matches!(previous, Some(Grab::Plugin { name: "a", .. })));
        assert!(matches!(state.current(), Some(Grab::Plugin { name: "b", .. })));
    }

    #[test]
    fn suspend_and_resume_restores_the_parked_grab() {
        let mut state = GrabState::new();
        state.start(Grab::Plugin { name: "a", capabilities: Capability::GRAB_INPUT });
        state.suspend();
        assert!(!state.is_grabbed());
        state.resume();
        assert!(matches!(state.current(), Some(Grab::Plugin { name: "a", .. })));
    }
}
