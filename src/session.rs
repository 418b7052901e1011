//! The per-connection driver session and its event-loop plumbing.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use calloop::ping::{make_ping, Ping, PingSource};

use crate::framebuffer::{Pixmap, RenderBackend};
use crate::host::{DisplayConfig, HostConnection};
use crate::outputs::OutputSet;
use crate::server::WindowServer;
use crate::utils::Rect;

/// A callback posted to run on the main event loop.
pub type PostedCallback = Box<dyn FnOnce(&mut Session) + Send>;

/// Cross-thread handle for posting work onto the main event loop.
///
/// Posted callbacks run in posting order when the loop drains them. The
/// handle may be used from any thread.
#[derive(Clone)]
pub struct EventProxy {
    tx: Arc<Mutex<Sender<PostedCallback>>>,
    ping: Ping,
}

impl EventProxy {
    pub fn post(&self, callback: impl FnOnce(&mut Session) + Send + 'static) {
        let tx = self.tx.lock().unwrap();
        if tx.send(Box::new(callback)).is_err() {
            warn!("posting a callback to a stopped session");
            return;
        }
        drop(tx);
        self.ping.ping();
    }
}

/// Geometry and framebuffer state of the hosted virtual screen.
#[derive(Debug)]
pub struct Screen {
    pub width: u16,
    pub height: u16,
    pub mm_width: u32,
    pub mm_height: u32,
    pub bits_per_pixel: u8,
    pub root_clip: Rect,
}

/// Driver options, from the server command line.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Host each client window separately instead of a shared root.
    pub rootless: bool,
    /// Double the resolution of the hosted screen.
    pub doubled: bool,
    /// Target DPI for physical-dimension calculations.
    pub dpi: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rootless: false,
            doubled: false,
            dpi: 96,
        }
    }
}

/// One driver session: the bridge between a compositor connection and the
/// window system's screen.
pub struct Session {
    pub host: Box<dyn HostConnection>,
    pub server: Box<dyn WindowServer>,
    pub renderer: RenderBackend,

    /// The configuration snapshot the session currently trusts.
    pub display: DisplayConfig,
    pub outputs: OutputSet,

    pub rootless: bool,
    pub doubled: bool,
    pub dpi: u32,

    pub screen: Screen,
    pub root_pixmap: Pixmap,

    /// Bound on waiting for the presentation pipeline to release a swap
    /// image during a resize.
    pub release_timeout: Duration,

    proxy: EventProxy,
    posted_rx: Receiver<PostedCallback>,
}

impl Session {
    /// Creates a session around the given collaborators.
    ///
    /// The returned ping source must be inserted into the main event loop; it
    /// wakes the loop whenever a callback is posted through [`EventProxy`].
    pub fn new(
        host: Box<dyn HostConnection>,
        server: Box<dyn WindowServer>,
        renderer: RenderBackend,
        options: Options,
        initial_size: (u16, u16),
    ) -> anyhow::Result<(Self, PingSource)> {
        let (ping, ping_source) = make_ping().context("error creating event loop ping")?;
        let (tx, posted_rx) = mpsc::channel();
        let proxy = EventProxy {
            tx: Arc::new(Mutex::new(tx)),
            ping,
        };

        let display = host.create_display_config();
        let (width, height) = initial_size;
        let dpi = options.dpi.max(1);
        let bits_per_pixel = 32;

        let session = Self {
            host,
            server,
            renderer,
            display,
            outputs: OutputSet::Hardware(Vec::new()),
            rootless: options.rootless,
            doubled: options.doubled,
            dpi,
            screen: Screen {
                width,
                height,
                mm_width: u32::from(width) * 254 / (10 * dpi),
                mm_height: u32::from(height) * 254 / (10 * dpi),
                bits_per_pixel,
                root_clip: Rect::from_size(i32::from(width), i32::from(height)),
            },
            root_pixmap: Pixmap::new(width, height, bits_per_pixel),
            release_timeout: Duration::from_secs(5),
            proxy,
            posted_rx,
        };

        Ok((session, ping_source))
    }

    pub fn proxy(&self) -> EventProxy {
        self.proxy.clone()
    }

    /// Runs every callback posted so far, in posting order.
    pub fn drain_posted(&mut self) {
        loop {
            let callback = match self.posted_rx.try_recv() {
                Ok(callback) => callback,
                Err(_) => break,
            };
            callback(self);
        }
    }

    /// Tears down every virtual output at driver shutdown.
    pub fn shutdown(&mut self) {
        let outputs = std::mem::replace(&mut self.outputs, OutputSet::Hardware(Vec::new()));
        for output in outputs.into_vec() {
            self.destroy_output(output);
        }
    }
}
