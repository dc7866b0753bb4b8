// SPDX-License-Identifier: GPL-3.0-only

//! Per-output shell state: the workspace manager, binding table and
//! active-plugin set that make each physical output act independently.

use smithay::output::Output as SmithayOutput;
use std::cell::Cell;
use std::collections::HashMap;

use crate::input::bindings::BindingTable;
use crate::plugins::{ActivePlugins, Capability, Plugin, PluginName, PluginRegistry};
use crate::shell::view::ViewId;
use crate::shell::workspace::WorkspaceManager;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FocusFlags: u8 {
        /// Raise the view to the top of its layer's paint order.
        const RAISE = 1 << 0;
        /// Dismiss any open popups that aren't descendants of this view.
        const CLOSE_POPUPS = 1 << 1;
    }
}

/// Focus bookkeeping, kept separate from [`Output`] so it can be
/// exercised without a live smithay output handle.
#[derive(Default)]
pub struct FocusState {
    focused: Option<ViewId>,
    /// `true` while a panel-style view has taken focus through the
    /// `$unfocus` carve-out: such a view is permitted to hold keyboard
    /// focus without being raised or counted as the "current" view for
    /// window-cycling purposes.
    unfocus_carve_out: Cell<bool>,
    /// Reference count of callers wanting continuous redraws (an
    /// animation, a video surface) even though nothing else changed.
    auto_redraw: Cell<u32>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus `view`. A view name prefixed `$unfocus` (a panel requesting
    /// keyboard focus for e.g. a search box) is allowed to take focus
    /// without raising or clearing popups, and without becoming the view
    /// other code treats as "the" focused view for cycling purposes.
    pub fn focus_view(&mut self, view: ViewId, name: &str, flags: FocusFlags) {
        if name.starts_with("$unfocus") {
            self.unfocus_carve_out.set(true);
            return;
        }
        self.unfocus_carve_out.set(false);
        self.focused = Some(view);
        if flags.contains(FocusFlags::RAISE) {
            // raising is a paint-order concern the caller applies to its
            // own view stack; this just records that focus changed.
        }
        if flags.contains(FocusFlags::CLOSE_POPUPS) {
            // likewise left to the caller, which owns the popup tree.
        }
    }

    pub fn focused_view(&self) -> Option<ViewId> {
        if self.unfocus_carve_out.get() {
            None
        } else {
            self.focused
        }
    }

    pub fn request_auto_redraw(&self) {
        self.auto_redraw.set(self.auto_redraw.get() + 1);
    }

    pub fn release_auto_redraw(&self) {
        let n = self.auto_redraw.get();
        if n > 0 {
            self.auto_redraw.set(n - 1);
        }
    }

    pub fn needs_auto_redraw(&self) -> bool {
        self.auto_redraw.get() > 0
    }
}

pub struct Output {
    pub handle: SmithayOutput,
    pub workspaces: WorkspaceManager,
    pub bindings: BindingTable,
    pub active_plugins: ActivePlugins,
    pub focus: FocusState,
    /// Live per-(plugin, output) instances, created at output-added time
    /// and torn down at output-removed time by [`Output::instantiate_plugins`]
    /// / [`Output::teardown_plugins`].
    instances: HashMap<PluginName, Box<dyn Plugin>>,
}

impl Output {
    pub fn new(handle: SmithayOutput, vwidth: i32, vheight: i32) -> Self {
        Self {
            handle,
            workspaces: WorkspaceManager::new(vwidth, vheight),
            bindings: BindingTable::new(),
            active_plugins: ActivePlugins::new(),
            focus: FocusState::new(),
            instances: HashMap::new(),
        }
    }

    pub fn activate_plugin(&mut self, name: &'static str, capabilities: Capability) -> bool {
        self.active_plugins.activate(name, capabilities)
    }

    pub fn deactivate_plugin(&mut self, name: &'static str) {
        self.active_plugins.deactivate(name);
    }

    pub fn inhibit_plugins(&mut self, mask: Capability) {
        self.active_plugins.inhibit(mask);
    }

    pub fn uninhibit_plugins(&mut self) {
        self.active_plugins.uninhibit();
    }

    /// Instantiate one instance of every registered plugin for this output,
    /// skipping any that are already instantiated.
    pub fn instantiate_plugins(&mut self, registry: &PluginRegistry) {
        for &name in registry.names() {
            if !self.instances.contains_key(&name) {
                if let Some(instance) = registry.instantiate(name) {
                    self.instances.insert(name, instance);
                }
            }
        }
    }

    /// Run `fini()` on and drop every live instance, e.g. at output-removed
    /// time.
    pub fn teardown_plugins(&mut self) {
        for (_, mut instance) in self.instances.drain() {
            instance.fini();
        }
    }

    /// Drive [`RenderPhase::PreEffects`] on every live instance.
    pub fn run_pre_effects(&mut self) {
        for instance in self.instances.values_mut() {
            instance.pre_effects();
        }
    }

    /// Drive [`RenderPhase::OverlayEffects`] on every live instance.
    pub fn run_overlay_effects(&mut self) {
        for instance in self.instances.values_mut() {
            instance.overlay_effects();
        }
    }
}

/// The fixed phase order a single frame's render pass runs through. Kept
/// as an explicit enum (rather than inlined call order) so a render-hook
/// plugin can say which phase it wants to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderPhase {
    PreEffects,
    BindFramebuffer,
    PaintBackgroundAndBottom,
    PaintWorkspace,
    PaintTopAndOverlay,
    OverlayEffects,
    SubmitDamage,
    ScheduleNext,
}

impl RenderPhase {
    pub const ORDER: [RenderPhase; 8] = [
        RenderPhase::PreEffects,
        RenderPhase::BindFramebuffer,
        RenderPhase::PaintBackgroundAndBottom,
        RenderPhase::PaintWorkspace,
        RenderPhase::PaintTopAndOverlay,
        RenderPhase::OverlayEffects,
        RenderPhase::SubmitDamage,
        RenderPhase::ScheduleNext,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_phases_run_in_fixed_order() {
        for pair in RenderPhase::ORDER.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn auto_redraw_is_refcounted() {
        let focus = FocusState::new();
        focus.request_auto_redraw();
        focus.request_auto_redraw();
        assert!(focus.needs_auto_redraw());
        focus.release_auto_redraw();
        assert!(focus.needs_auto_redraw());
        focus.release_auto_redraw();
        assert!(!focus.needs_auto_redraw());
    }

    #[test]
    fn unfocus_carve_out_view_does_not_become_the_focused_view() {
        let mut focus = FocusState::new();
        focus.focus_view(1, "panel", FocusFlags::RAISE);
        assert_eq!(focus.focused_view(), Some(1));

        focus.focus_view(2, "$unfocus-search-box", FocusFlags::empty());
        assert_eq!(focus.focused_view(), None, "carve-out view must not count as focused");
    }
}
