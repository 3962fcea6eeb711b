//! Registry globals

use log::{debug, info};
use wayland_client::globals::{BindError, GlobalList};
use wayland_client::protocol::{
    wl_compositor, wl_data_device_manager, wl_output, wl_seat, wl_shm,
};
use wayland_client::{Proxy, QueueHandle};
use wayland_protocols::wp::fractional_scale::v1::client::wp_fractional_scale_manager_v1;
use wayland_protocols::xdg::decoration::zv1::client::zxdg_decoration_manager_v1;
use wayland_protocols::xdg::shell::client::xdg_wm_base;

use crate::error::{PlatformError, Result};

use super::State;

const COMPOSITOR_VERSION: u32 = 4;
const XDG_WM_BASE_VERSION: u32 = 5;
const WL_SEAT_VERSION: u32 = 7;
const WL_SHM_VERSION: u32 = 1;
const WL_DATA_DEVICE_MANAGER_VERSION: u32 = 3;
const ZXDG_DECORATION_VERSION: u32 = 1;
const WP_FRACTIONAL_SCALE_MANAGER_VERSION: u32 = 1;
pub const WL_OUTPUT_VERSION: u32 = 4;

/// Globals a toplevel cannot exist without
pub const REQUIRED: &[&str] = &["wl_compositor", "xdg_wm_base", "wl_seat", "wl_shm"];

/// First required interface missing from an advertised list
pub fn first_missing<'a>(advertised: impl IntoIterator<Item = &'a str> + Clone) -> Option<&'static str> {
    REQUIRED
        .iter()
        .copied()
        .find(|required| !advertised.clone().into_iter().any(|name| name == *required))
}

/// Optional protocols the compositor advertised, with bound versions
///
/// Fixed for the lifetime of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolCapabilities {
    pub decoration: Option<u32>,
    pub fractional_scale: Option<u32>,
    pub data_device: Option<u32>,
}

pub struct Globals {
    pub compositor: wl_compositor::WlCompositor,
    pub wm_base: xdg_wm_base::XdgWmBase,
    pub seat: wl_seat::WlSeat,
    pub shm: wl_shm::WlShm,
    pub decoration_manager: Option<zxdg_decoration_manager_v1::ZxdgDecorationManagerV1>,
    pub fractional_scale_manager:
        Option<wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1>,
    pub data_device_manager: Option<wl_data_device_manager::WlDataDeviceManager>,
}

fn required<I: Proxy + 'static>(result: std::result::Result<I, BindError>, name: &str) -> Result<I> {
    match result {
        Ok(proxy) => {
            debug!("Bound {} v{}", name, proxy.version());
            Ok(proxy)
        }
        Err(BindError::NotPresent) => Err(PlatformError::ProtocolMissing(name.to_string())),
        Err(err) => Err(PlatformError::PlatformInitializationFailed(format!(
            "failed to bind {name}: {err}"
        ))),
    }
}

fn optional<I: Proxy + 'static>(result: std::result::Result<I, BindError>, name: &str) -> Result<Option<I>> {
    match result {
        Ok(proxy) => {
            debug!("Bound {} v{}", name, proxy.version());
            Ok(Some(proxy))
        }
        Err(BindError::NotPresent) => {
            info!("{} not offered by the compositor", name);
            Ok(None)
        }
        Err(err) => Err(PlatformError::PlatformInitializationFailed(format!(
            "failed to bind {name}: {err}"
        ))),
    }
}

impl Globals {
    pub fn bind_all(globals: &GlobalList, qh: &QueueHandle<State>) -> Result<Self> {
        let advertised: Vec<String> = globals
            .contents()
            .clone_list()
            .into_iter()
            .map(|global| global.interface)
            .collect();
        if let Some(missing) = first_missing(advertised.iter().map(String::as_str)) {
            return Err(PlatformError::ProtocolMissing(missing.to_string()));
        }

        Ok(Self {
            compositor: required(globals.bind(qh, 1..=COMPOSITOR_VERSION, ()), "wl_compositor")?,
            wm_base: required(globals.bind(qh, 1..=XDG_WM_BASE_VERSION, ()), "xdg_wm_base")?,
            seat: required(globals.bind(qh, 1..=WL_SEAT_VERSION, ()), "wl_seat")?,
            shm: required(globals.bind(qh, 1..=WL_SHM_VERSION, ()), "wl_shm")?,
            decoration_manager: optional(
                globals.bind(qh, 1..=ZXDG_DECORATION_VERSION, ()),
                "zxdg_decoration_manager_v1",
            )?,
            fractional_scale_manager: optional(
                globals.bind(qh, 1..=WP_FRACTIONAL_SCALE_MANAGER_VERSION, ()),
                "wp_fractional_scale_manager_v1",
            )?,
            data_device_manager: optional(
                globals.bind(qh, 1..=WL_DATA_DEVICE_MANAGER_VERSION, ()),
                "wl_data_device_manager",
            )?,
        })
    }

    pub fn capabilities(&self) -> ProtocolCapabilities {
        ProtocolCapabilities {
            decoration: self.decoration_manager.as_ref().map(Proxy::version),
            fractional_scale: self.fractional_scale_manager.as_ref().map(Proxy::version),
            data_device: self.data_device_manager.as_ref().map(Proxy::version),
        }
    }
}

/// Bind every `wl_output` advertised so far, returning their global names
pub fn bind_outputs(globals: &GlobalList, qh: &QueueHandle<State>) -> Vec<(u32, wl_output::WlOutput)> {
    globals
        .contents()
        .clone_list()
        .into_iter()
        .filter(|global| global.interface == wl_output::WlOutput::interface().name)
        .map(|global| {
            let output = globals.registry().bind::<wl_output::WlOutput, _, _>(
                global.name,
                global.version.min(WL_OUTPUT_VERSION),
                qh,
                global.name,
            );
            (global.name, output)
        })
        .collect()
}
