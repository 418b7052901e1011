//! Interface to the hosting window system.
//!
//! The output registry drives the window system's virtual output objects
//! through this boundary: creating and destroying outputs and their timing
//! controllers, publishing modes and geometry, and announcing screen size
//! changes to clients.

use bitflags::bitflags;

use crate::host::{ConnectionState, Orientation, SubpixelOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrtcId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u32);

bitflags! {
    /// Screen rotation, as a bit set so it doubles as the supported-rotations
    /// answer of the legacy query hook.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rotation: u16 {
        const ROTATE_0 = 1;
        const ROTATE_90 = 1 << 1;
        const ROTATE_180 = 1 << 2;
        const ROTATE_270 = 1 << 3;
    }
}

impl Rotation {
    pub fn from_orientation(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Normal => Rotation::ROTATE_0,
            Orientation::Left => Rotation::ROTATE_90,
            Orientation::Inverted => Rotation::ROTATE_180,
            Orientation::Right => Rotation::ROTATE_270,
        }
    }
}

/// A fully timed display mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub clock_khz: u32,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub refresh_millihz: u32,
}

/// Abstract power state requested through the window system's DPMS surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpmsMode {
    On,
    Standby,
    Suspend,
    Off,
}

/// Screen configuration capabilities the driver hands to the window system.
///
/// The window system calls back through this interface when a client issues
/// a legacy whole-screen configuration request.
pub trait ScreenConfigHooks {
    /// Rotations the screen claims to support through the legacy query.
    fn supported_rotations(&self) -> Rotation;

    /// Legacy whole-screen rotation/rate/size request. Returns whether the
    /// request was applied.
    fn set_screen_config(&mut self, rotation: Rotation, rate: i32, width: u16, height: u16)
        -> bool;
}

/// A pointer-class input device.
pub trait PointerDevice {
    fn position(&self) -> (i32, i32);

    /// Re-derives the device's sprite and clipping state for the screen's
    /// current dimensions.
    fn update_sprite(&mut self, screen_width: u16, screen_height: u16);

    fn set_position(&mut self, x: i32, y: i32);
}

/// The hosting window system's output-management and screen surface.
pub trait WindowServer {
    fn create_crtc(&mut self) -> CrtcId;
    fn create_output(&mut self, name: &str) -> OutputId;
    fn destroy_crtc(&mut self, crtc: CrtcId);
    fn destroy_output(&mut self, output: OutputId);

    fn set_gamma_size(&mut self, crtc: CrtcId, size: u16);
    fn set_output_crtcs(&mut self, output: OutputId, crtcs: &[CrtcId]);
    fn set_connection(&mut self, output: OutputId, state: ConnectionState);
    fn set_subpixel_order(&mut self, output: OutputId, subpixel: SubpixelOrder);
    fn set_physical_size(&mut self, output: OutputId, width_mm: i32, height_mm: i32);
    fn set_modes(&mut self, output: OutputId, modes: &[ModeInfo]);

    /// Announces a timing controller's mode, position and rotation. `None`
    /// means the controller currently drives no mode.
    fn notify_crtc(
        &mut self,
        crtc: CrtcId,
        mode: Option<&ModeInfo>,
        x: i32,
        y: i32,
        rotation: Rotation,
        outputs: &[OutputId],
    );

    fn set_screen_size_range(&mut self, min: (u16, u16), max: (u16, u16));
    fn set_config_hooks(&mut self, hooks: Box<dyn ScreenConfigHooks>);

    /// Whether connection setup has completed and size announcements are
    /// client-visible.
    fn connection_info_ready(&self) -> bool;
    fn announce_screen_size(&mut self, width: u16, height: u16);
    fn update_desktop_dimensions(&mut self);

    /// Requests a full output-information refresh so client-visible state
    /// propagates.
    fn request_refresh(&mut self);

    fn disable_screensaver(&mut self);

    fn for_each_pointer(&mut self, f: &mut dyn FnMut(&mut dyn PointerDevice));
}
