// SPDX-License-Identifier: GPL-3.0-only

//! Output-layout reconciliation: given the set of physical outputs the
//! backend reports and the configuration the user/config file wants for
//! each, compute and apply the minimal set of changes needed to get from
//! the current layout to the desired one.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub width: i32,
    pub height: i32,
    pub refresh_mhz: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

/// Where a desired configuration's geometry comes from. Two configurations
/// only compare equal field-by-field when they share the same source —
/// a `Mirror` config's `position` is meaningless (it inherits its mirror
/// target's), so it's excluded from the comparison in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// This output drives its own geometry.
    SelfDriven,
    /// This output mirrors another, named by id.
    Mirror(OutputId),
    /// This output is disabled.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredConfiguration {
    pub source: Source,
    pub mode: Option<Mode>,
    pub position: (i32, i32),
    pub transform: Transform,
    pub scale: f64,
}

impl DesiredConfiguration {
    /// Source-dependent equality: fields that the source makes meaningless
    /// are not compared, so flipping mirror target A->B->A without
    /// touching anything else doesn't get treated as a change needing a
    /// full disable/enable cycle.
    pub fn reconcile_eq(&self, other: &DesiredConfiguration) -> bool {
        match (self.source, other.source) {
            (Source::None, Source::None) => true,
            (Source::Mirror(a), Source::Mirror(b)) => a == b,
            (Source::SelfDriven, Source::SelfDriven) => {
                self.mode == other.mode
                    && self.position == other.position
                    && self.transform == other.transform
                    && self.scale == other.scale
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalOutput {
    pub id: OutputId,
    pub name: String,
    pub available_modes: Vec<Mode>,
    pub preferred_mode: Mode,
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("output {0:?} requested as a mirror target is not present")]
    MissingMirrorTarget(OutputId),
    #[error("output {0:?} has no mode compatible with the desired configuration")]
    NoCompatibleMode(OutputId),
}

pub struct OutputLayoutEngine {
    current: HashMap<OutputId, DesiredConfiguration>,
    /// Debounce counter for the no-op fallback output: it's only removed
    /// once a real output has stayed connected for this many reconciles in
    /// a row, so a monitor that blips off for one poll cycle doesn't
    /// trigger a visible flash to the fallback and back.
    fallback_debounce: u32,
    fallback_active: bool,
}

const FALLBACK_DEBOUNCE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Disable(OutputId),
    Enable(OutputId, DesiredConfiguration),
    Mirror(OutputId, OutputId),
    TransferViews { from: OutputId, to: OutputId },
}

impl OutputLayoutEngine {
    pub fn new() -> Self {
        Self { current: HashMap::new(), fallback_debounce: 0, fallback_active: false }
    }

    /// Resolve a mode request against what the physical output actually
    /// supports: exact match first, then nearest-resolution-same-refresh,
    /// then the output's preferred mode as a last resort.
    fn resolve_mode(physical: &PhysicalOutput, wanted: Option<Mode>) -> Mode {
        let Some(wanted) = wanted else { return physical.preferred_mode };
        if physical.available_modes.contains(&wanted) {
            return wanted;
        }
        if let Some(same_refresh) = physical
            .available_modes
            .iter()
            .find(|m| m.refresh_mhz == wanted.refresh_mhz)
        {
            return *same_refresh;
        }
        physical.preferred_mode
    }

    /// Run the 5-step reconciliation: pre-check, disable, enable, mirror,
    /// finish. Returns the ordered list of changes to apply; mirrors are
    /// always resolved after every independent output has been
    /// enabled/disabled so a mirror target is guaranteed already settled.
    pub fn reconcile(
        &mut self,
        physical: &[PhysicalOutput],
        desired: &HashMap<OutputId, DesiredConfiguration>,
    ) -> Result<Vec<Change>, ReconcileError> {
        // step 1: pre-check — every mirror target must exist among the
        // physical outputs we were actually given.
        for config in desired.values() {
            if let Source::Mirror(target) = config.source {
                if !physical.iter().any(|p| p.id == target) {
                    return Err(ReconcileError::MissingMirrorTarget(target));
                }
            }
        }

        let mut changes = Vec::new();

        // step 2: disable — outputs currently enabled that should become
        // disabled, or that disappeared from the physical set entirely.
        for (id, config) in self.current.clone() {
            let still_present = physical.iter().any(|p| p.id == id);
            let should_disable = !still_present
                || desired.get(&id).map(|d| matches!(d.source, Source::None)).unwrap_or(true);
            if should_disable && !matches!(config.source, Source::None) {
                changes.push(Change::Disable(id));
                if let Some(fallback) = self.pick_transfer_target(id, physical, desired) {
                    changes.push(Change::TransferViews { from: id, to: fallback });
                }
            }
        }

        // step 3: enable — self-driven outputs, resolving their mode
        // against what the physical output actually supports.
        for p in physical {
            let Some(config) = desired.get(&p.id) else { continue };
            if let Source::SelfDriven = config.source {
                let already_matches = self.current.get(&p.id).map(|c| c.reconcile_eq(config)).unwrap_or(false);
                if !already_matches {
                    let resolved_mode = Self::resolve_mode(p, config.mode);
                    let mut resolved = config.clone();
                    resolved.mode = Some(resolved_mode);
                    changes.push(Change::Enable(p.id, resolved.clone()));
                    self.current.insert(p.id, resolved);
                }
            }
        }

        // step 4: mirror — applied after every self-driven output has
        // settled, since a mirror copies its target's now-final geometry.
        for (id, config) in desired {
            if let Source::Mirror(target) = config.source {
                let already_mirroring = matches!(self.current.get(id).map(|c| c.source), Some(Source::Mirror(t)) if t == target);
                if !already_mirroring {
                    changes.push(Change::Mirror(*id, target));
                    self.current.insert(*id, config.clone());
                }
            }
        }

        // step 5: finish — drop bookkeeping for outputs that are gone.
        self.current.retain(|id, _| physical.iter().any(|p| p.id == *id));

        self.update_fallback_debounce(physical);

        Ok(changes)
    }

    fn pick_transfer_target(
        &self,
        disabled: OutputId,
        physical: &[PhysicalOutput],
        desired: &HashMap<OutputId, DesiredConfiguration>,
    ) -> Option<OutputId> {
        physical
            .iter()
            .map(|p| p.id)
            .find(|id| *id != disabled && desired.get(id).map(|d| !matches!(d.source, Source::None)).unwrap_or(false))
    }

    fn update_fallback_debounce(&mut self, physical: &[PhysicalOutput]) {
        if physical.is_empty() {
            self.fallback_active = true;
            self.fallback_debounce = 0;
        } else if self.fallback_active {
            self.fallback_debounce += 1;
            if self.fallback_debounce >= FALLBACK_DEBOUNCE_THRESHOLD {
                self.fallback_active = false;
                self.fallback_debounce = 0;
            }
        }
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_active
    }
}

impl Default for OutputLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(w: i32, h: i32, r: i32) -> Mode {
        Mode { width: w, height: h, refresh_mhz: r }
    }

    fn physical(id: u32, modes: &[Mode]) -> PhysicalOutput {
        PhysicalOutput { id: OutputId(id), name: format!("OUT-{id}"), available_modes: modes.to_vec(), preferred_mode: modes[0] }
    }

    fn self_driven(m: Mode) -> DesiredConfiguration {
        DesiredConfiguration { source: Source::SelfDriven, mode: Some(m), position: (0, 0), transform: Transform::Normal, scale: 1.0 }
    }

    #[test]
    fn enabling_an_output_resolves_to_its_preferred_mode_when_no_exact_match() {
        let mut engine = OutputLayoutEngine::new();
        let p = physical(1, &[mode(1920, 1080, 60000)]);
        let mut desired = HashMap::new();
        desired.insert(p.id, self_driven(mode(2560, 1440, 60000)));

        let changes = engine.reconcile(&[p.clone()], &desired).unwrap();
        assert!(matches!(&changes[0], Change::Enable(_, cfg) if cfg.mode == Some(p.preferred_mode)));
    }

    #[test]
    fn mirror_target_missing_from_physical_set_is_an_error() {
        let mut engine = OutputLayoutEngine::new();
        let p = physical(1, &[mode(1920, 1080, 60000)]);
        let mut desired = HashMap::new();
        desired.insert(p.id, DesiredConfiguration { source: Source::Mirror(OutputId(99)), mode: None, position: (0, 0), transform: Transform::Normal, scale: 1.0 });

        let err = engine.reconcile(&[p], &desired).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingMirrorTarget(OutputId(99))));
    }

    #[test]
    fn disabling_an_output_transfers_its_views_to_a_still_enabled_one() {
        let mut engine = OutputLayoutEngine::new();
        let p1 = physical(1, &[mode(1920, 1080, 60000)]);
        let p2 = physical(2, &[mode(1920, 1080, 60000)]);
        let mut desired = HashMap::new();
        desired.insert(p1.id, self_driven(mode(1920, 1080, 60000)));
        desired.insert(p2.id, self_driven(mode(1920, 1080, 60000)));
        engine.reconcile(&[p1.clone(), p2.clone()], &desired).unwrap();

        desired.insert(p1.id, DesiredConfiguration { source: Source::None, mode: None, position: (0, 0), transform: Transform::Normal, scale: 1.0 });
        let changes = engine.reconcile(&[p1.clone(), p2.clone()], &desired).unwrap();
        assert!(changes.contains(&Change::Disable(p1.id)));
        assert!(changes.contains(&Change::TransferViews { from: p1.id, to: p2.id }));
    }

    #[test]
    fn losing_every_physical_output_activates_the_fallback_with_debounce_on_return() {
        let mut engine = OutputLayoutEngine::new();
        engine.reconcile(&[], &HashMap::new()).unwrap();
        assert!(engine.fallback_active());

        let p = physical(1, &[mode(1920, 1080, 60000)]);
        let mut desired = HashMap::new();
        desired.insert(p.id, self_driven(mode(1920, 1080, 60000)));

        for _ in 0..FALLBACK_DEBOUNCE_THRESHOLD - 1 {
            engine.reconcile(&[p.clone()], &desired).unwrap();
            assert!(engine.fallback_active(), "must stay on fallback until debounce threshold");
        }
        engine.reconcile(&[p.clone()], &desired).unwrap();
        assert!(!engine.fallback_active());
    }

    #[test]
    fn reconcile_eq_ignores_position_for_mirrors() {
        let a = DesiredConfiguration { source: Source::Mirror(OutputId(1)), mode: None, position: (0, 0), transform: Transform::Normal, scale: 1.0 };
        let b = DesiredConfiguration { source: Source::Mirror(OutputId(1)), mode: None, position: (500, 0), transform: Transform::Normal, scale: 1.0 };
        assert!(a.reconcile_eq(&b));
    }
}
