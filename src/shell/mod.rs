// SPDX-License-Identifier: GPL-3.0-only

pub mod layer;
pub mod output;
pub mod popup;
pub mod tiling;
pub mod transform;
pub mod view;
pub mod workspace;

use smithay::{
    backend::renderer::{
        element::{AsRenderElements, RenderElementStates},
        ImportAll, ImportMem, Renderer,
    },
    desktop::{
        utils::{surface_presentation_feedback_flags_from_states, OutputPresentationFeedback},
        Space, Window,
    },
    input::pointer::CursorImageStatus,
    output::Output,
    reexports::wayland_server::protocol::wl_surface::WlSurface,
    utils::{IsAlive, Logical, Point, Rectangle, Scale},
};
use std::collections::HashMap;

use crate::backend::render::element::{AsGlowRenderer, CosmicElement};
use crate::input::grab::{Grab, GrabState};
use crate::plugins::{Capability, PluginRegistry};
use crate::shell::layer::{Anchor, Layer as ShellLayer, ReservedArea};
use crate::shell::output::{FocusFlags, Output as OutputShell};
use crate::shell::view::{View, ViewId, ViewRole};
use crate::shell::workspace::{WorkspaceId, WorkspaceInfo};
use crate::utils::IdGen;

/// Addresses a single workspace-grid cell as its own coordinate space: the
/// unit a pointer position or a newly-mapped window gets assigned to
/// before any actual output geometry comes into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualOutputId {
    pub output: String,
    pub workspace: WorkspaceId,
}

/// The shell: every view the compositor knows about, grouped by which
/// output's workspace grid currently holds them, plus the smithay `Space`
/// that turns our notion of "view" into render elements and input hit
/// targets smithay's desktop helpers understand.
pub struct Shell {
    pub space: Space<Window>,
    pub outputs: HashMap<String, OutputShell>,
    views: HashMap<ViewId, View>,
    view_by_window: HashMap<Window, ViewId>,
    /// Which output's workspace grid each view was placed on, so a window
    /// can be found and removed without scanning every output.
    view_output: HashMap<ViewId, String>,
    id_gen: IdGen,

    pub focused_window: Option<Window>,
    fullscreen_windows: HashMap<String, Window>,
    fullscreen_restore: HashMap<String, Rectangle<i32, Logical>>,

    pub cursor_position: Point<f64, Logical>,
    pub cursor_status: CursorImageStatus,

    pub grab: GrabState,
    pub plugins: PluginRegistry,

    focus_stack: Vec<Window>,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            space: Space::default(),
            outputs: HashMap::new(),
            views: HashMap::new(),
            view_by_window: HashMap::new(),
            view_output: HashMap::new(),
            id_gen: IdGen::new(),
            focused_window: None,
            fullscreen_windows: HashMap::new(),
            fullscreen_restore: HashMap::new(),
            cursor_position: Point::from((-1000.0, -1000.0)),
            cursor_status: CursorImageStatus::default_named(),
            grab: GrabState::new(),
            plugins: PluginRegistry::new(),
            focus_stack: Vec::new(),
        }
    }

    /// Register a physical output, giving it its own workspace grid and
    /// instantiating every registered plugin for it.
    pub fn add_output(&mut self, output: &Output, vwidth: i32, vheight: i32) {
        self.space.map_output(output, Point::from((0, 0)));
        let mut shell_output = OutputShell::new(output.clone(), vwidth, vheight);
        shell_output.instantiate_plugins(&self.plugins);
        self.outputs.insert(output.name(), shell_output);
        tracing::info!("Added output {} to shell ({vwidth}x{vheight} workspaces)", output.name());
    }

    /// Tear down `output`'s plugin instances before dropping its shell state.
    pub fn remove_output(&mut self, output: &Output) {
        if let Some(mut shell_output) = self.outputs.remove(&output.name()) {
            shell_output.teardown_plugins();
        }
        self.space.unmap_output(output);
    }

    pub fn output_shell(&self, output: &Output) -> Option<&OutputShell> {
        self.outputs.get(&output.name())
    }

    pub fn output_shell_mut(&mut self, output: &Output) -> Option<&mut OutputShell> {
        self.outputs.get_mut(&output.name())
    }

    /// Which output's workspace grid a point in global space falls within.
    pub fn output_at(&self, position: Point<f64, Logical>) -> Option<Output> {
        self.space
            .outputs()
            .find(|output| self.space.output_geometry(output).unwrap().to_f64().contains(position))
            .cloned()
    }

    /// Map a new toplevel window into the shell, onto `output`'s currently
    /// active workspace.
    pub fn add_window(&mut self, window: Window, output: &Output) -> ViewId {
        let view = View::new(&self.id_gen, ViewRole::Toplevel, window.clone());
        let view_id = view.id;
        self.views.insert(view_id, view);
        self.view_by_window.insert(window.clone(), view_id);

        if let Some(shell) = self.output_shell_mut(output) {
            shell.workspaces.add_view(ShellLayer::Workspace, None, view_id);
            self.view_output.insert(view_id, output.name());
        }

        self.space.map_element(window.clone(), Point::from((0, 0)), false);
        self.arrange();
        self.append_focus(window);

        view_id
    }

    /// Map a new toplevel window directly into a specific workspace-grid
    /// cell, regardless of which cell is currently active on that output.
    pub fn add_window_to_virtual_output(&mut self, window: Window, id: VirtualOutputId) -> ViewId {
        let view = View::new(&self.id_gen, ViewRole::Toplevel, window.clone());
        let view_id = view.id;
        self.views.insert(view_id, view);
        self.view_by_window.insert(window.clone(), view_id);

        if let Some(shell) = self.outputs.get_mut(&id.output) {
            shell.workspaces.add_view(ShellLayer::Workspace, Some(id.workspace), view_id);
            self.view_output.insert(view_id, id.output.clone());
        }

        self.space.map_element(window.clone(), Point::from((0, 0)), false);
        self.arrange();
        self.append_focus(window);

        view_id
    }

    /// Which virtual output (output + active workspace cell) a point in
    /// global space falls within.
    pub fn virtual_output_at_point(&self, point: Point<f64, Logical>) -> Option<VirtualOutputId> {
        let output = self.output_at(point)?;
        let shell = self.output_shell(&output)?;
        Some(VirtualOutputId {
            output: output.name(),
            workspace: shell.workspaces.active_workspace(),
        })
    }

    /// Remove `window` from the shell, returning every output it was
    /// visible on so the caller can schedule a re-render for each.
    pub fn remove_window(&mut self, window: &Window) -> Vec<Output> {
        let mut affected_name = None;
        if let Some(view_id) = self.view_by_window.remove(window) {
            self.views.remove(&view_id);
            if let Some(name) = self.view_output.remove(&view_id) {
                if let Some(output) = self.outputs.get_mut(&name) {
                    output.workspaces.remove_view(view_id);
                }
                affected_name = Some(name);
            } else {
                for output in self.outputs.values_mut() {
                    output.workspaces.remove_view(view_id);
                }
            }
        }
        for name in self.fullscreen_windows.keys().cloned().collect::<Vec<_>>() {
            if self.fullscreen_windows.get(&name) == Some(window) {
                self.fullscreen_windows.remove(&name);
                self.fullscreen_restore.remove(&name);
            }
        }
        self.space.unmap_elem(window);
        self.focus_stack.retain(|w| w != window);
        if self.focused_window.as_ref() == Some(window) {
            self.focused_window = None;
        }
        self.arrange();

        match affected_name.and_then(|name| self.outputs.get(&name)) {
            Some(output) => vec![output.handle.clone()],
            None => self.space.outputs().cloned().collect(),
        }
    }

    pub fn view_for(&self, window: &Window) -> Option<&View> {
        self.view_by_window.get(window).and_then(|id| self.views.get(id))
    }

    pub fn view_for_mut(&mut self, window: &Window) -> Option<&mut View> {
        if let Some(id) = self.view_by_window.get(window) {
            self.views.get_mut(id)
        } else {
            None
        }
    }

    /// Apply `f` to every workspace cell on `output`, e.g. to mark every
    /// cell dirty after a layer-shell reservation changed the usable area.
    pub fn apply_to_all_workspaces_on_output(
        &mut self,
        output: &Output,
        mut f: impl FnMut(&mut workspace::Workspace),
    ) {
        if let Some(shell) = self.output_shell_mut(output) {
            shell.workspaces.apply_to_all_workspaces(&mut f);
        }
    }

    /// The active workspace cell's dirty state on `output`.
    pub fn active_workspace(&self, output: &Output) -> Option<WorkspaceInfo> {
        self.output_shell(output)?.workspaces.active_workspace_info()
    }

    pub fn window_under(&self, point: Point<f64, Logical>) -> Option<Window> {
        for window in self.space.elements() {
            let location = self.space.element_location(window).unwrap_or_default();
            let bbox = window.bbox();
            let global_bbox = Rectangle::new(location + bbox.loc, bbox.size);
            if global_bbox.to_f64().contains(point) {
                return Some(window.clone());
            }
        }
        None
    }

    pub fn surface_under(&self, point: Point<f64, Logical>) -> Option<(WlSurface, Point<f64, Logical>)> {
        use smithay::desktop::WindowSurfaceType;

        for window in self.space.elements() {
            let location = self.space.element_location(window).unwrap_or_default();
            let bbox = window.bbox();
            let global_bbox = Rectangle::new(location + bbox.loc, bbox.size);
            if global_bbox.to_f64().contains(point) {
                let window_relative = point - location.to_f64();
                if let Some((surface, loc)) = window.surface_under(window_relative, WindowSurfaceType::ALL) {
                    return Some((surface, (loc + location).to_f64()));
                }
            }
        }
        None
    }

    pub fn get_fullscreen(&self, output: &Output) -> Option<&Window> {
        self.fullscreen_windows.get(&output.name())
    }

    pub fn set_fullscreen(&mut self, window: Window, fullscreen: bool, output: &Output) {
        let name = output.name();
        if fullscreen {
            if let Some(geometry) = self.space.element_geometry(&window) {
                self.fullscreen_restore.insert(name.clone(), geometry);
            }
            if let Some(view) = self.view_for_mut(&window) {
                view.fullscreen = true;
            }
            self.fullscreen_windows.insert(name, window);
        } else if self.fullscreen_windows.get(&name) == Some(&window) {
            if let Some(view) = self.view_for_mut(&window) {
                view.fullscreen = false;
            }
            self.fullscreen_windows.remove(&name);
        }
        self.arrange();
    }

    pub fn take_fullscreen_restore(&mut self, output: &Output) -> Option<Rectangle<i32, Logical>> {
        self.fullscreen_restore.remove(&output.name())
    }

    pub fn refresh(&mut self) {
        self.space.refresh();
    }

    pub fn visible_output_for_surface(&self, surface: &WlSurface) -> Option<&Output> {
        for window in self.space.elements() {
            if window.toplevel().map(|t| t.wl_surface() == surface).unwrap_or(false) {
                for output in self.space.outputs() {
                    let output_geometry = self.space.output_geometry(output).unwrap();
                    if let Some(window_location) = self.space.element_location(window) {
                        let window_geometry =
                            Rectangle::from_extremities(window_location, window_location + window.geometry().size);
                        if output_geometry.overlaps(window_geometry) {
                            return Some(output);
                        }
                    }
                }
            }
        }
        None
    }

    pub fn animations_going(&self) -> bool {
        self.outputs.values().any(|o| o.focus.needs_auto_redraw())
    }

    pub fn take_presentation_feedback(
        &self,
        output: &Output,
        render_element_states: &RenderElementStates,
    ) -> OutputPresentationFeedback {
        let mut feedback = OutputPresentationFeedback::new(output);
        for window in self.space.elements() {
            if let Some(window_location) = self.space.element_location(window) {
                let output_geometry = self.space.output_geometry(output).unwrap();
                let window_geometry =
                    Rectangle::from_extremities(window_location, window_location + window.geometry().size);
                if output_geometry.overlaps(window_geometry) {
                    window.take_presentation_feedback(
                        &mut feedback,
                        |_surface, _states| Some(output.clone()),
                        |surface, _| surface_presentation_feedback_flags_from_states(surface, render_element_states),
                    );
                }
            }
        }
        feedback
    }

    /// Render every layer for `output`, running plugin render hooks at the
    /// [`RenderPhase::PreEffects`] and [`RenderPhase::OverlayEffects`] phases
    /// that bracket the default paint order (binding/submitting the
    /// framebuffer and scheduling the next frame are the backend's job, not
    /// this method's).
    pub fn render_elements<R>(&mut self, output: &Output, renderer: &mut R) -> Vec<CosmicElement<R>>
    where
        R: AsGlowRenderer + Renderer + ImportAll + ImportMem,
        R::TextureId: Clone + 'static,
    {
        if let Some(shell_output) = self.output_shell_mut(output) {
            shell_output.run_pre_effects();
        }

        let mut elements = Vec::new();
        let output_scale = Scale::from(output.current_scale().fractional_scale());

        use smithay::wayland::shell::wlr_layer::Layer as WlrLayer;
        let layer_map = smithay::desktop::layer_map_for_output(output);
        let layers: Vec<_> = layer_map.layers().cloned().collect();

        for layer_surface in &layers {
            let layer = layer_surface.layer();
            if layer == WlrLayer::Top || layer == WlrLayer::Overlay {
                if let Some(geometry) = layer_map.layer_geometry(layer_surface) {
                    let surface_elements = layer_surface.render_elements(
                        renderer,
                        geometry.loc.to_physical_precise_round(output_scale),
                        output_scale,
                        1.0,
                    );
                    elements.extend(surface_elements.into_iter().map(CosmicElement::Surface));
                }
            }
        }

        for window in self.space.elements() {
            if let Some(location) = self.space.element_location(window) {
                let surface_elements =
                    window.render_elements(renderer, location.to_physical_precise_round(output_scale), output_scale, 1.0);
                elements.extend(surface_elements.into_iter().map(CosmicElement::Surface));
            }
        }

        for layer_surface in &layers {
            let layer = layer_surface.layer();
            if layer == WlrLayer::Background || layer == WlrLayer::Bottom {
                if let Some(geometry) = layer_map.layer_geometry(layer_surface) {
                    let surface_elements = layer_surface.render_elements(
                        renderer,
                        geometry.loc.to_physical_precise_round(output_scale),
                        output_scale,
                        1.0,
                    );
                    elements.extend(surface_elements.into_iter().map(CosmicElement::Surface));
                }
            }
        }

        if let Some(shell_output) = self.output_shell_mut(output) {
            shell_output.run_overlay_effects();
        }

        elements
    }

    /// Reserved-area-aware arrange: shrink each output's usable area by
    /// its layer-shell exclusive zones before handing the remainder to the
    /// tiling layout. Re-tiles every known output.
    pub fn arrange(&mut self) {
        for output in self.space.outputs().cloned().collect::<Vec<_>>() {
            self.arrange_output(&output);
        }
    }

    /// Re-tile just `output`'s active workspace cell and clear its dirty
    /// flag, without touching any other output.
    pub fn arrange_windows_on_output(&mut self, output: &Output) {
        self.arrange_output(output);
    }

    fn arrange_output(&mut self, output: &Output) {
        let name = output.name();
        let fullscreen = self.fullscreen_windows.get(&name).cloned();

        let windows_to_tile: Vec<Window> = self
            .space
            .elements()
            .filter(|window| {
                let on_this_output = self
                    .view_by_window
                    .get(*window)
                    .and_then(|id| self.view_output.get(id))
                    .map(|output_name| *output_name == name)
                    .unwrap_or(false);
                let floating = self.view_for(window).map(|v| v.floating).unwrap_or(false);
                on_this_output && !floating && fullscreen.as_ref() != Some(*window)
            })
            .cloned()
            .collect();

        let output_area = self.space.output_geometry(output).unwrap_or_default();
        let reserved = reserved_areas_for(output);
        let usable = layer::arrange_layers(output_area, &reserved);

        if let Some(shell) = self.output_shell_mut(output) {
            let active = shell.workspaces.active_workspace();
            shell.workspaces.tiling_for(active).set_available_area(
                crate::utils::coordinates::VirtualOutputRelativeRect::from_loc_and_size(
                    crate::utils::coordinates::VirtualOutputRelativePoint::new(usable.loc.x, usable.loc.y),
                    usable.size,
                ),
            );
            let positions = shell.workspaces.tiling_for(active).tile(&windows_to_tile);
            shell.workspaces.clear_needs_arrange(active);
            apply_positions(&mut self.space, positions);
        }

        tracing::debug!("Arranged {} windows on {}", windows_to_tile.len(), name);
    }

    /// Nudge the master/stack split on `output`'s active workspace and
    /// re-tile it.
    pub fn adjust_master_factor(&mut self, output: &Output, delta: f32) {
        if let Some(shell) = self.output_shell_mut(output) {
            let active = shell.workspaces.active_workspace();
            shell.workspaces.tiling_for(active).set_master_factor(delta);
        }
        self.arrange_windows_on_output(output);
    }

    /// Grow or shrink the master-area window count on `output`'s active
    /// workspace and re-tile it.
    pub fn adjust_n_master(&mut self, output: &Output, delta: i32) {
        if let Some(shell) = self.output_shell_mut(output) {
            let active = shell.workspaces.active_workspace();
            shell.workspaces.tiling_for(active).inc_n_master(delta);
        }
        self.arrange_windows_on_output(output);
    }

    pub fn toggle_floating(&mut self, window: &Window) {
        let now_floating = if let Some(view) = self.view_for_mut(window) {
            view.floating = !view.floating;
            view.floating
        } else {
            false
        };

        use smithay::reexports::wayland_protocols::xdg::decoration::zv1::server::zxdg_toplevel_decoration_v1::Mode;
        use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel::State as XdgState;
        if let Some(toplevel) = window.toplevel() {
            toplevel.with_pending_state(|state| {
                if now_floating {
                    state.decoration_mode = Some(Mode::ClientSide);
                    state.states.unset(XdgState::TiledLeft);
                    state.states.unset(XdgState::TiledRight);
                    state.states.unset(XdgState::TiledTop);
                    state.states.unset(XdgState::TiledBottom);
                } else {
                    state.decoration_mode = Some(Mode::ServerSide);
                }
            });
            if toplevel.is_initial_configure_sent() {
                toplevel.send_configure();
            }
        }
        self.arrange();
    }

    pub fn zoom(&mut self) {
        if let Some(focused) = self.focused_window.clone() {
            if let Some(pos) = self.focus_stack.iter().position(|w| w == &focused) {
                if pos > 0 {
                    self.focus_stack.swap(0, pos);
                    self.arrange();
                }
            }
        }
    }

    pub fn focus_next(&mut self) {
        self.cycle_focus(1);
    }

    pub fn focus_prev(&mut self) {
        self.cycle_focus(-1);
    }

    fn cycle_focus(&mut self, direction: i32) {
        if self.focus_stack.len() <= 1 {
            return;
        }
        if let Some(focused) = &self.focused_window {
            if let Some(pos) = self.focus_stack.iter().position(|w| w == focused) {
                let len = self.focus_stack.len() as i32;
                let next = ((pos as i32 + direction).rem_euclid(len)) as usize;
                let next_window = self.focus_stack[next].clone();
                self.append_focus(next_window);
            }
        } else if !self.focus_stack.is_empty() {
            let first = self.focus_stack[0].clone();
            self.append_focus(first);
        }
    }

    pub fn close_focused(&mut self) {
        if let Some(window) = self.focused_window.clone() {
            if let Some(surface) = window.toplevel() {
                surface.send_close();
            }
        }
    }

    pub fn refresh_focus(&mut self) -> Option<Window> {
        let focused = self.focus_stack.iter().rev().find(|w| w.alive()).cloned();
        self.focused_window = focused.clone();
        focused
    }

    pub fn append_focus(&mut self, window: Window) {
        self.focus_stack.retain(|w| w.alive());
        if let Some(pos) = self.focus_stack.iter().position(|w| w == &window) {
            self.focus_stack.remove(pos);
        }
        self.focus_stack.push(window.clone());
        self.focused_window = Some(window);
    }

    /// Route a focus change for `window` through `output`'s [`FocusState`]
    /// before touching the plain focus-stack every other path reads.
    /// Returns `false` without updating the stack if the view took the
    /// `$unfocus` carve-out instead of becoming the focused view.
    pub fn focus_window(&mut self, window: &Window, output: &Output, flags: FocusFlags) -> bool {
        let Some(&view_id) = self.view_by_window.get(window) else {
            self.append_focus(window.clone());
            return true;
        };
        let name = match self.views.get(&view_id) {
            Some(view) if view.role == ViewRole::ShellView => "$unfocus-panel",
            _ => "view",
        };
        if let Some(shell_output) = self.output_shell_mut(output) {
            shell_output.focus.focus_view(view_id, name, flags);
            if shell_output.focus.focused_view() != Some(view_id) {
                return false;
            }
        }
        self.append_focus(window.clone());
        true
    }

    /// Start a plugin-owned grab on `output`, gated by capability-mask
    /// arbitration: fails without starting the grab if `capabilities`
    /// overlaps an already-active plugin on that output.
    pub fn start_plugin_grab(&mut self, output: &Output, name: &'static str, capabilities: Capability) -> bool {
        let activated = self
            .output_shell_mut(output)
            .map(|o| o.activate_plugin(name, capabilities))
            .unwrap_or(false);
        if activated {
            self.grab.start(Grab::Plugin { name, capabilities });
        }
        activated
    }

    /// End the active plugin grab, if any, freeing its capability mask back
    /// on `output`.
    pub fn end_plugin_grab(&mut self, output: &Output) {
        if let Some(Grab::Plugin { name, .. }) = self.grab.end() {
            if let Some(shell_output) = self.output_shell_mut(output) {
                shell_output.deactivate_plugin(name);
            }
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_positions(space: &mut Space<Window>, positions: Vec<(Window, Rectangle<i32, Logical>)>) {
    use smithay::reexports::wayland_protocols::xdg::decoration::zv1::server::zxdg_toplevel_decoration_v1::Mode;
    use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel::State as XdgState;

    for (window, rect) in positions {
        space.map_element(window.clone(), rect.loc, false);
        if let Some(toplevel) = window.toplevel() {
            toplevel.with_pending_state(|state| {
                state.size = Some(rect.size);
                state.bounds = Some(rect.size);
                state.decoration_mode = Some(Mode::ServerSide);
                state.states.set(XdgState::TiledLeft);
                state.states.set(XdgState::TiledRight);
                state.states.set(XdgState::TiledTop);
                state.states.set(XdgState::TiledBottom);
                state.states.unset(XdgState::Maximized);
                state.states.unset(XdgState::Fullscreen);
            });
            if toplevel.is_initial_configure_sent() {
                toplevel.send_configure();
            }
        }
    }
}

fn reserved_areas_for(output: &Output) -> Vec<ReservedArea> {
    use smithay::wayland::shell::wlr_layer::Anchor as WlrAnchor;

    let layer_map = smithay::desktop::layer_map_for_output(output);
    layer_map
        .layers()
        .filter_map(|layer| {
            let state = layer.cached_state();
            if state.exclusive_zone <= 0 {
                return None;
            }
            let mut anchor = Anchor::empty();
            if state.anchor.contains(WlrAnchor::LEFT) {
                anchor |= Anchor::LEFT;
            }
            if state.anchor.contains(WlrAnchor::RIGHT) {
                anchor |= Anchor::RIGHT;
            }
            if state.anchor.contains(WlrAnchor::TOP) {
                anchor |= Anchor::TOP;
            }
            if state.anchor.contains(WlrAnchor::BOTTOM) {
                anchor |= Anchor::BOTTOM;
            }
            Some(ReservedArea {
                anchor,
                exclusive_zone: state.exclusive_zone,
                margin: (state.margin.top, state.margin.right, state.margin.bottom, state.margin.left),
            })
        })
        .collect()
}
