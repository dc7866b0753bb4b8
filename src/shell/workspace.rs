// SPDX-License-Identifier: GPL-3.0-only

//! Per-output workspace manager: a `vwidth` x `vheight` grid of virtual
//! workspaces, plus the ordered layer stack (background/bottom/workspace/
//! top/overlay/lock/desktop-widget). Only the `Workspace` layer is
//! partitioned per grid cell — every other layer is output-global and
//! visible regardless of which cell is active, matching a panel that stays
//! put while the desktop scrolls underneath it.

use std::collections::HashMap;

use crate::shell::layer::Layer;
use crate::shell::tiling::TilingLayout;
use crate::shell::view::ViewId;

pub type WorkspaceId = (i32, i32);

/// One cell of the workspace grid: its own view list and tiling layout,
/// plus the bookkeeping the output-commit path needs to know whether it's
/// due for a re-tile.
#[derive(Debug)]
pub struct Workspace {
    pub name: String,
    pub needs_arrange: bool,
    views: Vec<ViewId>,
    tiling: Option<TilingLayout>,
}

impl Workspace {
    fn new(id: WorkspaceId) -> Self {
        Self {
            name: format!("{}:{}", id.0, id.1),
            needs_arrange: false,
            views: Vec::new(),
            tiling: None,
        }
    }
}

/// Snapshot of a workspace's arrange-needed state, returned by value so
/// callers can drop the lock on the owning shell before acting on it.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceInfo {
    pub id: WorkspaceId,
    pub needs_arrange: bool,
}

pub struct WorkspaceManager {
    pub vwidth: i32,
    pub vheight: i32,
    active: WorkspaceId,
    cells: HashMap<WorkspaceId, Workspace>,
    /// Views on output-global layers, keyed by layer. `Layer::Workspace`
    /// never appears here; its content lives in `cells`.
    global_layers: HashMap<Layer, Vec<ViewId>>,
}

impl WorkspaceManager {
    pub fn new(vwidth: i32, vheight: i32) -> Self {
        assert!(vwidth > 0 && vheight > 0, "workspace grid must be at least 1x1");
        Self {
            vwidth,
            vheight,
            active: (0, 0),
            cells: HashMap::new(),
            global_layers: HashMap::new(),
        }
    }

    pub fn active_workspace(&self) -> WorkspaceId {
        self.active
    }

    pub fn active_workspace_info(&self) -> Option<WorkspaceInfo> {
        let needs_arrange = self.cells.get(&self.active).map(|c| c.needs_arrange).unwrap_or(false);
        Some(WorkspaceInfo { id: self.active, needs_arrange })
    }

    pub fn clear_needs_arrange(&mut self, id: WorkspaceId) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.needs_arrange = false;
        }
    }

    /// Move the active workspace, wrapping around the grid edges.
    pub fn set_active_workspace(&mut self, id: WorkspaceId) {
        let x = id.0.rem_euclid(self.vwidth);
        let y = id.1.rem_euclid(self.vheight);
        self.active = (x, y);
    }

    pub fn add_view(&mut self, layer: Layer, workspace: Option<WorkspaceId>, view: ViewId) {
        match layer {
            Layer::Workspace => {
                let ws = workspace.unwrap_or(self.active);
                self.cells.entry(ws).or_insert_with(|| Workspace::new(ws)).views.push(view);
            }
            other => {
                self.global_layers.entry(other).or_default().push(view);
            }
        }
    }

    pub fn remove_view(&mut self, view: ViewId) {
        for cell in self.cells.values_mut() {
            cell.views.retain(|v| *v != view);
        }
        for views in self.global_layers.values_mut() {
            views.retain(|v| *v != view);
        }
    }

    /// Views visible right now: the active cell's workspace content plus
    /// every output-global layer, in back-to-front paint order.
    pub fn visible_views(&self) -> Vec<ViewId> {
        let mut out = Vec::new();
        for layer in [Layer::DesktopWidget, Layer::Background, Layer::Bottom] {
            if let Some(views) = self.global_layers.get(&layer) {
                out.extend(views.iter().copied());
            }
        }
        if let Some(cell) = self.cells.get(&self.active) {
            out.extend(cell.views.iter().copied());
        }
        for layer in [Layer::Top, Layer::Overlay, Layer::Lock] {
            if let Some(views) = self.global_layers.get(&layer) {
                out.extend(views.iter().copied());
            }
        }
        out
    }

    pub fn views_in(&self, workspace: WorkspaceId) -> &[ViewId] {
        self.cells.get(&workspace).map(|c| c.views.as_slice()).unwrap_or(&[])
    }

    pub fn tiling_for(&mut self, workspace: WorkspaceId) -> &mut TilingLayout {
        self.cells
            .entry(workspace)
            .or_insert_with(|| Workspace::new(workspace))
            .tiling
            .get_or_insert_with(|| TilingLayout::new((0, 0).into()))
    }

    /// Apply `f` to every workspace cell, e.g. after an output resize
    /// changes the area every cell must arrange within, or a layer-shell
    /// reservation changed and every cell needs re-tiling.
    pub fn apply_to_all_workspaces(&mut self, mut f: impl FnMut(&mut Workspace)) {
        for cell in self.cells.values_mut() {
            f(cell);
        }
    }

    pub fn all_workspace_ids(&self) -> impl Iterator<Item = WorkspaceId> + '_ {
        (0..self.vwidth).flat_map(move |x| (0..self.vheight).map(move |y| (x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_switch_wraps_around_grid() {
        let mut mgr = WorkspaceManager::new(3, 2);
        mgr.set_active_workspace((-1, 2));
        assert_eq!(mgr.active_workspace(), (2, 0));
    }

    #[test]
    fn global_layers_are_visible_regardless_of_active_cell() {
        let mut mgr = WorkspaceManager::new(2, 2);
        mgr.add_view(Layer::Top, None, 1);
        mgr.add_view(Layer::Workspace, Some((0, 0)), 2);
        mgr.add_view(Layer::Workspace, Some((1, 0)), 3);

        assert!(mgr.visible_views().contains(&2));
        assert!(!mgr.visible_views().contains(&3));

        mgr.set_active_workspace((1, 0));
        assert!(mgr.visible_views().contains(&1), "top layer stays visible across cells");
        assert!(mgr.visible_views().contains(&3));
        assert!(!mgr.visible_views().contains(&2));
    }

    #[test]
    fn remove_view_clears_it_from_every_cell_and_layer() {
        let mut mgr = WorkspaceManager::new(2, 2);
        mgr.add_view(Layer::Workspace, Some((0, 0)), 5);
        mgr.add_view(Layer::Overlay, None, 5);
        mgr.remove_view(5);
        assert!(!mgr.visible_views().contains(&5));
    }

    #[test]
    fn apply_to_all_workspaces_marks_every_cell_dirty() {
        let mut mgr = WorkspaceManager::new(2, 1);
        mgr.add_view(Layer::Workspace, Some((0, 0)), 1);
        mgr.add_view(Layer::Workspace, Some((1, 0)), 2);
        mgr.apply_to_all_workspaces(|workspace| workspace.needs_arrange = true);
        assert!(mgr.active_workspace_info().unwrap().needs_arrange);
        mgr.clear_needs_arrange((0, 0));
        assert!(!mgr.active_workspace_info().unwrap().needs_arrange);
    }
}
