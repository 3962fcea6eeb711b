//! Monitor descriptions returned by monitor enumeration

use crate::event::MonitorId;
use crate::geometry::{LogicalRect, PhysicalPosition, PhysicalSize};

/// A connected monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub id: MonitorId,
    /// Connector or output name (e.g. "eDP-1")
    pub name: String,
    /// Position in the global compositor/root coordinate space
    pub position: PhysicalPosition,
    /// Current mode size in pixels
    pub size: PhysicalSize,
    /// Area not covered by panels and docks, equal to the full geometry when
    /// the platform does not report one
    pub work_area: LogicalRect,
    pub scale_factor: f64,
    pub is_primary: bool,
}
