// SPDX-License-Identifier: GPL-3.0-only

//! Plugin registry and capability-mask grab arbitration.
//!
//! Real `.so` plugin loading is out of scope: plugins are registered as
//! boxed factories at startup and instantiated once per `(plugin, output)`
//! pair, mirroring the original loader's one-instance-per-output model
//! without the `dlopen`/symbol-lookup machinery.

use std::collections::HashMap;

bitflags::bitflags! {
    /// What a plugin needs exclusive access to while grabbed. Two plugins
    /// whose capability masks overlap cannot both be active on the same
    /// output at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u8 {
        const CHANGE_VIEW_GEOMETRY = 1 << 0;
        const RECORD_SCREEN        = 1 << 1;
        const CUSTOM_RENDERING     = 1 << 2;
        const GRAB_INPUT           = 1 << 3;
    }
}

impl Capability {
    pub const CONTROL_WM: Capability = Capability::CHANGE_VIEW_GEOMETRY
        .union(Capability::CUSTOM_RENDERING)
        .union(Capability::GRAB_INPUT);
}

pub type PluginName = &'static str;

/// Per-output instance of a registered plugin.
pub trait Plugin {
    /// Capabilities this instance needs while active.
    fn capabilities(&self) -> Capability;
    /// Called once when the plugin is instantiated for an output.
    fn init(&mut self) {}
    /// Called once before the instance is dropped, mirroring the
    /// original's destructor-like `fini()`: undo everything `init` set up.
    fn fini(&mut self) {}
    /// Run once per frame before the default layers paint, in
    /// [`crate::shell::output::RenderPhase::PreEffects`].
    fn pre_effects(&mut self) {}
    /// Run once per frame after the default layers paint, in
    /// [`crate::shell::output::RenderPhase::OverlayEffects`].
    fn overlay_effects(&mut self) {}
}

type Factory = Box<dyn Fn() -> Box<dyn Plugin>>;

/// Global table of known plugins, keyed by name. Each output owns its own
/// set of live instances created from these factories.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<PluginName, Factory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: PluginName, factory: impl Fn() -> Box<dyn Plugin> + 'static) {
        self.factories.insert(name, Box::new(factory));
    }

    pub fn instantiate(&self, name: PluginName) -> Option<Box<dyn Plugin>> {
        self.factories.get(name).map(|f| {
            let mut instance = f();
            instance.init();
            instance
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &PluginName> {
        self.factories.keys()
    }
}

/// Per-output bookkeeping of which capability-masked grabs are currently
/// active, so a second plugin requesting an overlapping capability is
/// refused instead of silently corrupting the first one's state.
#[derive(Debug, Default)]
pub struct ActivePlugins {
    active: Vec<(PluginName, Capability)>,
}

impl ActivePlugins {
    pub fn new() -> Self {
        Self::default()
    }

    fn combined_mask(&self) -> Capability {
        self.active.iter().fold(Capability::empty(), |acc, (_, cap)| acc | *cap)
    }

    /// Returns `true` if `name` was activated, `false` if its capability
    /// mask overlaps an already-active plugin.
    pub fn activate(&mut self, name: PluginName, capabilities: Capability) -> bool {
        if self.active.iter().any(|(n, _)| *n == name) {
            return true;
        }
        if self.combined_mask().intersects(capabilities) {
            return false;
        }
        self.active.push((name, capabilities));
        true
    }

    pub fn deactivate(&mut self, name: PluginName) {
        self.active.retain(|(n, _)| *n != name);
    }

    pub fn is_active(&self, name: PluginName) -> bool {
        self.active.iter().any(|(n, _)| *n == name)
    }

    /// Block every capability in `mask` from being grabbed, without
    /// attributing it to any one named plugin — used while the compositor
    /// itself needs exclusive control (e.g. during an output reconfigure).
    pub fn inhibit(&mut self, mask: Capability) {
        self.active.push(("<inhibited>", mask));
    }

    pub fn uninhibit(&mut self) {
        self.active.retain(|(n, _)| *n != "<inhibited>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_capability_masks_are_mutually_exclusive() {
        let mut active = ActivePlugins::new();
        assert!(active.activate("expo", Capability::CUSTOM_RENDERING | Capability::GRAB_INPUT));
        assert!(!active.activate("cube", Capability::CUSTOM_RENDERING));
        assert!(active.activate("move", Capability::CHANGE_VIEW_GEOMETRY));
    }

    #[test]
    fn deactivating_frees_the_capability_mask() {
        let mut active = ActivePlugins::new();
        active.activate("expo", Capability::CUSTOM_RENDERING);
        active.deactivate("expo");
        assert!(active.activate("cube", Capability::CUSTOM_RENDERING));
    }

    #[test]
    fn reactivating_the_same_plugin_is_idempotent() {
        let mut active = ActivePlugins::new();
        assert!(active.activate("expo", Capability::CUSTOM_RENDERING));
        assert!(active.activate("expo", Capability::CUSTOM_RENDERING));
        assert!(active.is_active("expo"));
    }

    #[test]
    fn inhibit_blocks_all_masked_capabilities_until_uninhibited() {
        let mut active = ActivePlugins::new();
        active.inhibit(Capability::all());
        assert!(!active.activate("any", Capability::GRAB_INPUT));
        active.uninhibit();
        assert!(active.activate("any", Capability::GRAB_INPUT));
    }
}
