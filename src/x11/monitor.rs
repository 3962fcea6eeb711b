//! Monitor enumeration and DPI discovery

use std::collections::HashMap;

use log::debug;
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Screen};

use crate::error::{PlatformError, Result};
use crate::event::MonitorId;
use crate::geometry::{LogicalPosition, LogicalRect, LogicalSize, PhysicalPosition, PhysicalSize};
use crate::monitor::MonitorInfo;

use super::atoms::Atoms;

/// DPI at which the scale factor is 1.0
const BASE_DPI: f64 = 96.0;

/// Scale factor from the `Xft.dpi` entry of a resource database string
pub(crate) fn scale_from_resources(resources: &str) -> Option<f64> {
    resources
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "Xft.dpi")
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|dpi| *dpi > 0.0)
        .map(|dpi| dpi / BASE_DPI)
}

/// Read the global scale from the root window's `RESOURCE_MANAGER`
pub(crate) fn read_scale<C: Connection>(
    conn: &C,
    root: u32,
) -> std::result::Result<f64, ReplyError> {
    let reply = conn
        .get_property(
            false,
            root,
            AtomEnum::RESOURCE_MANAGER,
            AtomEnum::STRING,
            0,
            u32::MAX / 4,
        )?
        .reply()?;
    let resources = String::from_utf8_lossy(&reply.value);
    Ok(scale_from_resources(&resources).unwrap_or(1.0))
}

/// Monitor ids keyed by RandR monitor name atom
#[derive(Debug, Default)]
pub(crate) struct MonitorIds {
    by_name: HashMap<Atom, MonitorId>,
}

impl MonitorIds {
    pub fn id_for(&mut self, name: Atom) -> MonitorId {
        *self.by_name.entry(name).or_insert_with(MonitorId::new)
    }
}

/// A monitor as reported by the server, before work-area and scale handling
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawMonitor {
    pub name_atom: Atom,
    pub name: String,
    pub position: PhysicalPosition,
    pub size: PhysicalSize,
    pub is_primary: bool,
}

/// Combine raw monitors with the desktop work area
///
/// `_NET_WORKAREA` describes the usable area of the whole desktop, so it is
/// applied to the primary monitor only, clipped to its bounds.
pub(crate) fn build_monitors(
    raw: Vec<RawMonitor>,
    work_area: Option<[u32; 4]>,
    scale: f64,
    ids: &mut MonitorIds,
) -> Vec<MonitorInfo> {
    raw.into_iter()
        .map(|monitor| {
            let full = (
                monitor.position.x,
                monitor.position.y,
                monitor.size.width as i32,
                monitor.size.height as i32,
            );
            let area = match work_area {
                Some(area) if monitor.is_primary => clip(full, area).unwrap_or(full),
                _ => full,
            };
            MonitorInfo {
                id: ids.id_for(monitor.name_atom),
                name: monitor.name,
                position: monitor.position,
                size: monitor.size,
                work_area: LogicalRect::new(
                    LogicalPosition::new(f64::from(area.0) / scale, f64::from(area.1) / scale),
                    LogicalSize::new(f64::from(area.2) / scale, f64::from(area.3) / scale),
                ),
                scale_factor: scale,
                is_primary: monitor.is_primary,
            }
        })
        .collect()
}

fn clip(monitor: (i32, i32, i32, i32), area: [u32; 4]) -> Option<(i32, i32, i32, i32)> {
    let (ax, ay, aw, ah) = (area[0] as i32, area[1] as i32, area[2] as i32, area[3] as i32);
    let x0 = monitor.0.max(ax);
    let y0 = monitor.1.max(ay);
    let x1 = (monitor.0 + monitor.2).min(ax + aw);
    let y1 = (monitor.1 + monitor.3).min(ay + ah);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1 - x0, y1 - y0))
}

/// Query monitors from RandR 1.5, or the root screen without it
pub(crate) fn enumerate<C: Connection>(
    conn: &C,
    screen: &Screen,
    atoms: &Atoms,
    has_randr: bool,
    scale: f64,
    ids: &mut MonitorIds,
) -> Result<Vec<MonitorInfo>> {
    let raw = if has_randr {
        query_randr(conn, screen.root)?
    } else {
        Vec::new()
    };
    let raw = if raw.is_empty() {
        debug!("No RandR monitors, reporting the root screen");
        vec![RawMonitor {
            name_atom: x11rb::NONE,
            name: "screen".to_string(),
            position: PhysicalPosition::new(0, 0),
            size: PhysicalSize::new(
                u32::from(screen.width_in_pixels),
                u32::from(screen.height_in_pixels),
            ),
            is_primary: true,
        }]
    } else {
        raw
    };

    Ok(build_monitors(raw, read_work_area(conn, screen.root, atoms), scale, ids))
}

fn query_randr<C: Connection>(conn: &C, root: u32) -> Result<Vec<RawMonitor>> {
    let enumeration_failed = |e: &dyn std::fmt::Display| {
        PlatformError::MonitorEnumerationFailed(e.to_string())
    };
    let reply = conn
        .randr_get_monitors(root, true)
        .map_err(|e| enumeration_failed(&e))?
        .reply()
        .map_err(|e| enumeration_failed(&e))?;

    let name_cookies = reply
        .monitors
        .iter()
        .map(|monitor| conn.get_atom_name(monitor.name))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut monitors = Vec::with_capacity(reply.monitors.len());
    for (monitor, cookie) in reply.monitors.iter().zip(name_cookies) {
        let name = String::from_utf8_lossy(&cookie.reply()?.name).into_owned();
        monitors.push(RawMonitor {
            name_atom: monitor.name,
            name,
            position: PhysicalPosition::new(i32::from(monitor.x), i32::from(monitor.y)),
            size: PhysicalSize::new(u32::from(monitor.width), u32::from(monitor.height)),
            is_primary: monitor.primary,
        });
    }
    Ok(monitors)
}

fn read_work_area<C: Connection>(conn: &C, root: u32, atoms: &Atoms) -> Option<[u32; 4]> {
    let reply = conn
        .get_property(false, root, atoms._NET_WORKAREA, AtomEnum::CARDINAL, 0, 4)
        .ok()?
        .reply()
        .ok()?;
    let values: Vec<u32> = reply.value32()?.collect();
    match values.as_slice() {
        [x, y, w, h, ..] => Some([*x, *y, *w, *h]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name_atom: Atom, x: i32, width: u32, is_primary: bool) -> RawMonitor {
        RawMonitor {
            name_atom,
            name: format!("OUT-{name_atom}"),
            position: PhysicalPosition::new(x, 0),
            size: PhysicalSize::new(width, 1080),
            is_primary,
        }
    }

    #[test]
    fn test_scale_from_resources() {
        let db = "Xcursor.size:\t24\nXft.dpi:\t144\nXft.antialias:\t1\n";
        assert_eq!(scale_from_resources(db), Some(1.5));
        assert_eq!(scale_from_resources("Xft.dpi: 96"), Some(1.0));
        assert_eq!(scale_from_resources("Xcursor.size: 24"), None);
        assert_eq!(scale_from_resources("Xft.dpi: zero"), None);
        assert_eq!(scale_from_resources("Xft.dpi: 0"), None);
    }

    #[test]
    fn test_monitor_ids_are_stable() {
        let mut ids = MonitorIds::default();
        let first = ids.id_for(500);
        let second = ids.id_for(501);
        assert_ne!(first, second);
        assert_eq!(ids.id_for(500), first);
    }

    #[test]
    fn test_work_area_applies_to_primary_only() {
        let mut ids = MonitorIds::default();
        let monitors = build_monitors(
            vec![raw(1, 0, 1920, true), raw(2, 1920, 1280, false)],
            Some([0, 32, 3200, 1048]),
            1.0,
            &mut ids,
        );

        assert_eq!(monitors.len(), 2);
        assert_eq!(
            monitors[0].work_area,
            LogicalRect::new(LogicalPosition::new(0.0, 32.0), LogicalSize::new(1920.0, 1048.0))
        );
        assert_eq!(
            monitors[1].work_area,
            LogicalRect::new(LogicalPosition::new(1920.0, 0.0), LogicalSize::new(1280.0, 1080.0))
        );
        assert!(monitors[0].is_primary);
    }

    #[test]
    fn test_work_area_is_logical() {
        let mut ids = MonitorIds::default();
        let monitors = build_monitors(vec![raw(1, 0, 1920, true)], None, 2.0, &mut ids);
        assert_eq!(monitors[0].work_area.size, LogicalSize::new(960.0, 540.0));
        assert_eq!(monitors[0].size, PhysicalSize::new(1920, 1080));
        assert_eq!(monitors[0].scale_factor, 2.0);
    }
}
