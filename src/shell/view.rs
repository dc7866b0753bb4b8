// SPDX-License-Identifier: GPL-3.0-only

//! Views: the shell's notion of a mapped client window, distinct from the
//! scene graph's raw [`crate::scene::Surface`] nodes. A view owns the
//! window-management state (tiled edges, fullscreen, activation) a surface
//! alone doesn't carry.

use smithay::desktop::Window;
use smithay::utils::{Logical, Rectangle};
use std::cell::Cell;

use crate::shell::transform::ViewTransform;
use crate::utils::IdGen;

pub type ViewId = u64;

/// What a view represents to the shell, mirroring the handful of roles the
/// output-layout and input-dispatch code need to special-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRole {
    /// A regular xdg-toplevel.
    Toplevel,
    /// Override-redirect / unmanaged content (tooltips, menus).
    Unmanaged,
    /// Layer-shell surfaces belonging to the shell chrome (panels, locks).
    ShellView,
    /// Desktop-widget layer content (e.g. wallpaper-level widgets).
    DesktopWidget,
}

bitflags::bitflags! {
    /// Which edges a view is currently snapped to, matching the xdg-shell
    /// tiled states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TiledEdges: u8 {
        const LEFT   = 1 << 0;
        const RIGHT  = 1 << 1;
        const TOP    = 1 << 2;
        const BOTTOM = 1 << 3;
    }
}

/// Cached off-screen contents of a view, reused across frames where
/// nothing changed. `buffer_age` follows the EGL convention: 0 means the
/// buffer content is undefined and must be fully redrawn, 1 means it holds
/// the previous frame, 2 the one before that.
pub struct ViewBufferCache {
    pub buffer_age: Cell<u8>,
}

impl Default for ViewBufferCache {
    fn default() -> Self {
        Self { buffer_age: Cell::new(0) }
    }
}

pub struct View {
    pub id: ViewId,
    pub role: ViewRole,
    pub window: Window,
    pub geometry: Rectangle<i32, Logical>,
    pub maximized: bool,
    pub fullscreen: bool,
    pub activated: bool,
    pub minimized: bool,
    /// Exempt from the tiling layout; positioned and sized by the client
    /// or by an explicit move/resize grab instead.
    pub floating: bool,
    pub tiled_edges: TiledEdges,
    pub transform: ViewTransform,
    pub buffer_cache: ViewBufferCache,
    /// Set once a `zwlr_foreign_toplevel_handle_v1` stub has been created
    /// for this view; the full protocol server is out of scope, this just
    /// tracks whether one was requested.
    pub foreign_toplevel_handle: Option<u32>,
}

impl View {
    pub fn new(id_gen: &IdGen, role: ViewRole, window: Window) -> Self {
        Self {
            id: id_gen.next(),
            role,
            window,
            geometry: Rectangle::from_size((0, 0).into()),
            maximized: false,
            fullscreen: false,
            activated: false,
            minimized: false,
            floating: false,
            tiled_edges: TiledEdges::empty(),
            transform: ViewTransform::new(),
            buffer_cache: ViewBufferCache::default(),
            foreign_toplevel_handle: None,
        }
    }

    pub fn is_tiled(&self) -> bool {
        !self.tiled_edges.is_empty()
    }

    /// Mark the cached buffer stale, forcing a full redraw on next paint.
    pub fn invalidate_buffer_cache(&self) {
        self.buffer_cache.buffer_age.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiled_edges_combine() {
        let edges = TiledEdges::LEFT | TiledEdges::TOP;
        assert!(edges.contains(TiledEdges::LEFT));
        assert!(edges.contains(TiledEdges::TOP));
        assert!(!edges.contains(TiledEdges::RIGHT));
    }
}
