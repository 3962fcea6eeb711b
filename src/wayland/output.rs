//! Outputs and per-window scale tracking

use std::collections::BTreeMap;

use log::debug;

use crate::event::MonitorId;
use crate::geometry::{LogicalPosition, LogicalRect, LogicalSize, PhysicalPosition, PhysicalSize};
use crate::monitor::MonitorInfo;

/// Denominator of `wp_fractional_scale_v1.preferred_scale`
pub const FRACTIONAL_SCALE_DENOMINATOR: f64 = 120.0;

/// What a `wl_output` has reported, applied on `done`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputInfo {
    pub id: MonitorId,
    pub name: String,
    pub position: PhysicalPosition,
    pub size: PhysicalSize,
    pub scale: i32,
}

impl OutputInfo {
    fn new() -> Self {
        Self {
            id: MonitorId::new(),
            name: String::new(),
            position: PhysicalPosition::new(0, 0),
            size: PhysicalSize::new(0, 0),
            scale: 1,
        }
    }

    pub fn to_monitor(&self, is_primary: bool) -> MonitorInfo {
        let scale = f64::from(self.scale.max(1));
        MonitorInfo {
            id: self.id,
            name: self.name.clone(),
            position: self.position,
            size: self.size,
            work_area: LogicalRect::new(
                LogicalPosition::new(
                    f64::from(self.position.x) / scale,
                    f64::from(self.position.y) / scale,
                ),
                self.size.to_logical(scale),
            ),
            scale_factor: scale,
            is_primary,
        }
    }
}

/// Outputs keyed by registry global name
///
/// Events accumulate into a pending copy that replaces the visible one on
/// `done`, so a half-updated output is never reported.
#[derive(Debug, Default)]
pub struct Outputs {
    current: BTreeMap<u32, OutputInfo>,
    pending: BTreeMap<u32, OutputInfo>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly bound output
    pub fn add(&mut self, global: u32) {
        self.pending.entry(global).or_insert_with(OutputInfo::new);
    }

    pub fn remove(&mut self, global: u32) -> Option<OutputInfo> {
        self.pending.remove(&global);
        self.current.remove(&global)
    }

    pub fn contains(&self, global: u32) -> bool {
        self.pending.contains_key(&global)
    }

    /// Mutate the pending state of an output
    pub fn update(&mut self, global: u32, f: impl FnOnce(&mut OutputInfo)) {
        if let Some(info) = self.pending.get_mut(&global) {
            f(info);
        }
    }

    /// Publish pending state; returns true when anything visible changed
    pub fn done(&mut self, global: u32) -> bool {
        let Some(pending) = self.pending.get(&global) else {
            return false;
        };
        if self.current.get(&global) == Some(pending) {
            return false;
        }
        debug!(
            "Output {} ({}) is {}x{} at scale {}",
            global, pending.name, pending.size.width, pending.size.height, pending.scale
        );
        self.current.insert(global, pending.clone());
        true
    }

    pub fn scale(&self, global: u32) -> Option<i32> {
        self.current.get(&global).map(|info| info.scale)
    }

    /// Published outputs; the one with the lowest global name is primary
    pub fn monitors(&self) -> Vec<MonitorInfo> {
        self.current
            .values()
            .enumerate()
            .map(|(idx, info)| info.to_monitor(idx == 0))
            .collect()
    }
}

/// Effective scale of one surface
///
/// The integer scale is the maximum over every output the surface overlaps.
/// A fractional preferred scale, when the compositor sends one, wins.
#[derive(Debug, Clone)]
pub struct ScaleTracker {
    entered: Vec<u32>,
    fractional: Option<f64>,
    current: f64,
}

impl Default for ScaleTracker {
    fn default() -> Self {
        Self {
            entered: Vec::new(),
            fractional: None,
            current: 1.0,
        }
    }
}

impl ScaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, output: u32) {
        if !self.entered.contains(&output) {
            self.entered.push(output);
        }
    }

    /// Returns whether the output was entered
    pub fn leave(&mut self, output: u32) -> bool {
        let before = self.entered.len();
        self.entered.retain(|o| *o != output);
        self.entered.len() != before
    }

    pub fn entered(&self) -> &[u32] {
        &self.entered
    }

    /// `preferred_scale` in 120ths
    pub fn set_fractional(&mut self, preferred: u32) {
        self.fractional = Some(f64::from(preferred) / FRACTIONAL_SCALE_DENOMINATOR);
    }

    /// Recompute against `outputs`; `Some(scale)` only when it changed
    pub fn refresh(&mut self, outputs: &Outputs) -> Option<f64> {
        let scale = self.compute(outputs);
        if (scale - self.current).abs() < f64::EPSILON {
            return None;
        }
        self.current = scale;
        Some(scale)
    }

    fn compute(&self, outputs: &Outputs) -> f64 {
        if let Some(fractional) = self.fractional {
            return fractional;
        }
        self.entered
            .iter()
            .filter_map(|output| outputs.scale(*output))
            .max()
            .map_or(1.0, |scale| f64::from(scale.max(1)))
    }

    pub fn scale(&self) -> f64 {
        self.current
    }

    /// Integer scale for `wl_surface.set_buffer_scale`
    pub fn buffer_scale(&self) -> i32 {
        (self.current.ceil() as i32).max(1)
    }
}
