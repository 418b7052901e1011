//! Driver-side state for a window hosted in the outer compositor.

use crate::framebuffer::SwapImage;
use crate::host::{HostSurface, Orientation};
use crate::utils::Rect;

pub struct HostedWindow {
    surface: Box<dyn HostSurface>,
    /// Orientation at the time of the last geometry event.
    pub orientation: Orientation,
    width: u16,
    height: u16,
    /// The tracked (renderable) region of the window.
    pub region: Rect,
    /// Swap image still owned by the presentation pipeline, if any.
    pub swap_image: Option<SwapImage>,
    damage: Vec<Rect>,
}

impl HostedWindow {
    pub fn new(surface: Box<dyn HostSurface>, width: u16, height: u16) -> Self {
        Self {
            surface,
            orientation: Orientation::Normal,
            width,
            height,
            region: Rect::from_size(i32::from(width), i32::from(height)),
            swap_image: None,
            damage: Vec::new(),
        }
    }

    pub fn surface_orientation(&self) -> Orientation {
        self.surface.orientation()
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub(crate) fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn damage_region(&mut self, region: Rect) {
        self.damage.push(region);
    }

    /// Drains the damage accumulated since the last call.
    pub fn take_damage(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.damage)
    }
}
