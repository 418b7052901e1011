//! In-memory host and window-system implementations.
//!
//! These back the standalone demo mode and stand in for the real
//! collaborators in tests. The server side records every call so state can
//! be inspected after the fact.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::framebuffer::{AccelRenderer, Pixmap, SwapImage};
use crate::host::{
    ConnectionState, DisplayConfig, HostConnection, HostOutput, HostSurface, Orientation,
    SubpixelOrder,
};
use crate::server::{
    CrtcId, ModeInfo, OutputId, PointerDevice, Rotation, ScreenConfigHooks, WindowServer,
};
use crate::utils::Rect;

#[derive(Default)]
struct HeadlessHostInner {
    config: Mutex<DisplayConfig>,
    applied: Mutex<Vec<DisplayConfig>>,
    callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

/// A compositor connection backed by plain data.
#[derive(Clone, Default)]
pub struct HeadlessHost {
    inner: Arc<HeadlessHostInner>,
}

impl HeadlessHost {
    pub fn new(outputs: Vec<HostOutput>) -> Self {
        let host = Self::default();
        *host.inner.config.lock().unwrap() = DisplayConfig { outputs };
        host
    }

    /// Replaces the host-side configuration, as a hardware change would.
    pub fn set_outputs(&self, outputs: Vec<HostOutput>) {
        self.inner.config.lock().unwrap().outputs = outputs;
    }

    /// Invokes the registered change callback, like the compositor does.
    /// Callable from any thread.
    pub fn notify_config_change(&self) {
        let callback = self.inner.callback.lock().unwrap();
        if let Some(callback) = &*callback {
            callback();
        }
    }

    pub fn apply_count(&self) -> usize {
        self.inner.applied.lock().unwrap().len()
    }

    pub fn last_applied(&self) -> Option<DisplayConfig> {
        self.inner.applied.lock().unwrap().last().cloned()
    }
}

impl HostConnection for HeadlessHost {
    fn create_display_config(&self) -> DisplayConfig {
        self.inner.config.lock().unwrap().clone()
    }

    fn apply_display_config(&self, config: &DisplayConfig) {
        *self.inner.config.lock().unwrap() = config.clone();
        self.inner.applied.lock().unwrap().push(config.clone());
    }

    fn set_config_change_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        *self.inner.callback.lock().unwrap() = Some(callback);
    }
}

/// A hosted-window surface with a settable orientation.
pub struct HeadlessSurface {
    pub orientation: Rc<Cell<Orientation>>,
}

impl HostSurface for HeadlessSurface {
    fn orientation(&self) -> Orientation {
        self.orientation.get()
    }
}

#[derive(Debug, Default)]
pub struct OutputRecord {
    pub name: String,
    pub connection: Option<ConnectionState>,
    pub subpixel: Option<SubpixelOrder>,
    pub physical_size: Option<(i32, i32)>,
    pub modes: Vec<ModeInfo>,
    pub crtcs: Vec<CrtcId>,
}

#[derive(Debug, Default)]
pub struct CrtcRecord {
    pub gamma_size: u16,
    pub mode: Option<ModeInfo>,
    pub x: i32,
    pub y: i32,
    pub rotation: Option<Rotation>,
    pub outputs: Vec<OutputId>,
}

#[derive(Debug, Default)]
pub struct HeadlessPointer {
    pub x: i32,
    pub y: i32,
    pub sprite_screen: Option<(u16, u16)>,
    pub warps: Vec<(i32, i32)>,
}

impl HeadlessPointer {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }
}

impl PointerDevice for HeadlessPointer {
    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn update_sprite(&mut self, screen_width: u16, screen_height: u16) {
        self.sprite_screen = Some((screen_width, screen_height));
    }

    fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.warps.push((x, y));
    }
}

/// A window system that records everything the registry tells it.
#[derive(Default)]
pub struct HeadlessServer {
    next_id: u32,
    pub outputs: HashMap<OutputId, OutputRecord>,
    pub crtcs: HashMap<CrtcId, CrtcRecord>,
    pub size_range: Option<((u16, u16), (u16, u16))>,
    pub hooks: Option<Box<dyn ScreenConfigHooks>>,
    pub connection_info_ready: bool,
    pub announced_sizes: Vec<(u16, u16)>,
    pub desktop_dimension_updates: usize,
    pub refresh_requests: usize,
    pub screensaver_disabled: bool,
    pub pointers: Vec<HeadlessPointer>,
}

pub type SharedServer = Rc<RefCell<HeadlessServer>>;

impl HeadlessServer {
    pub fn new_shared() -> SharedServer {
        Rc::new(RefCell::new(Self::default()))
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl WindowServer for SharedServer {
    fn create_crtc(&mut self) -> CrtcId {
        let mut server = self.borrow_mut();
        let id = CrtcId(server.next_id());
        server.crtcs.insert(id, CrtcRecord::default());
        id
    }

    fn create_output(&mut self, name: &str) -> OutputId {
        let mut server = self.borrow_mut();
        let id = OutputId(server.next_id());
        server.outputs.insert(
            id,
            OutputRecord {
                name: name.to_owned(),
                ..OutputRecord::default()
            },
        );
        id
    }

    fn destroy_crtc(&mut self, crtc: CrtcId) {
        self.borrow_mut().crtcs.remove(&crtc);
    }

    fn destroy_output(&mut self, output: OutputId) {
        self.borrow_mut().outputs.remove(&output);
    }

    fn set_gamma_size(&mut self, crtc: CrtcId, size: u16) {
        if let Some(record) = self.borrow_mut().crtcs.get_mut(&crtc) {
            record.gamma_size = size;
        }
    }

    fn set_output_crtcs(&mut self, output: OutputId, crtcs: &[CrtcId]) {
        if let Some(record) = self.borrow_mut().outputs.get_mut(&output) {
            record.crtcs = crtcs.to_vec();
        }
    }

    fn set_connection(&mut self, output: OutputId, state: ConnectionState) {
        if let Some(record) = self.borrow_mut().outputs.get_mut(&output) {
            record.connection = Some(state);
        }
    }

    fn set_subpixel_order(&mut self, output: OutputId, subpixel: SubpixelOrder) {
        if let Some(record) = self.borrow_mut().outputs.get_mut(&output) {
            record.subpixel = Some(subpixel);
        }
    }

    fn set_physical_size(&mut self, output: OutputId, width_mm: i32, height_mm: i32) {
        if let Some(record) = self.borrow_mut().outputs.get_mut(&output) {
            record.physical_size = Some((width_mm, height_mm));
        }
    }

    fn set_modes(&mut self, output: OutputId, modes: &[ModeInfo]) {
        if let Some(record) = self.borrow_mut().outputs.get_mut(&output) {
            record.modes = modes.to_vec();
        }
    }

    fn notify_crtc(
        &mut self,
        crtc: CrtcId,
        mode: Option<&ModeInfo>,
        x: i32,
        y: i32,
        rotation: Rotation,
        outputs: &[OutputId],
    ) {
        if let Some(record) = self.borrow_mut().crtcs.get_mut(&crtc) {
            record.mode = mode.cloned();
            record.x = x;
            record.y = y;
            record.rotation = Some(rotation);
            record.outputs = outputs.to_vec();
        }
    }

    fn set_screen_size_range(&mut self, min: (u16, u16), max: (u16, u16)) {
        self.borrow_mut().size_range = Some((min, max));
    }

    fn set_config_hooks(&mut self, hooks: Box<dyn ScreenConfigHooks>) {
        self.borrow_mut().hooks = Some(hooks);
    }

    fn connection_info_ready(&self) -> bool {
        self.borrow().connection_info_ready
    }

    fn announce_screen_size(&mut self, width: u16, height: u16) {
        self.borrow_mut().announced_sizes.push((width, height));
    }

    fn update_desktop_dimensions(&mut self) {
        self.borrow_mut().desktop_dimension_updates += 1;
    }

    fn request_refresh(&mut self) {
        self.borrow_mut().refresh_requests += 1;
    }

    fn disable_screensaver(&mut self) {
        self.borrow_mut().screensaver_disabled = true;
    }

    fn for_each_pointer(&mut self, f: &mut dyn FnMut(&mut dyn PointerDevice)) {
        for pointer in &mut self.borrow_mut().pointers {
            f(pointer);
        }
    }
}

/// An accelerated renderer that blits with the CPU.
#[derive(Default)]
pub struct HeadlessRenderer {
    pub copies: usize,
    pub destroyed_images: usize,
}

pub type SharedRenderer = Rc<RefCell<HeadlessRenderer>>;

impl HeadlessRenderer {
    pub fn new_shared() -> SharedRenderer {
        Rc::new(RefCell::new(Self::default()))
    }
}

impl AccelRenderer for SharedRenderer {
    fn copy_root(&mut self, old: &Pixmap, new: &mut Pixmap, copy: Rect) -> anyhow::Result<()> {
        // Clear to opaque black, then blit the overlap; same contract as the
        // GL implementation.
        new.data_mut().fill(0);

        if !copy.is_empty() {
            let bpp = new.bytes_per_pixel();
            let line_len = copy.w as usize * bpp;
            for row in 0..copy.h as usize {
                let y = copy.y as usize + row;
                let src_at = y * old.stride() + copy.x as usize * bpp;
                let dst_at = y * new.stride() + copy.x as usize * bpp;
                new.data_mut()[dst_at..dst_at + line_len]
                    .copy_from_slice(&old.data()[src_at..src_at + line_len]);
            }
        }

        self.borrow_mut().copies += 1;
        Ok(())
    }

    fn destroy_image(&mut self, image: SwapImage) {
        drop(image);
        self.borrow_mut().destroyed_images += 1;
    }
}
