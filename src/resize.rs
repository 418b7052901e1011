//! Resize and rotation of the hosted root window.
//!
//! A geometry change from the compositor replaces the backing pixmap while
//! preserving the content that both the old and the new screen can show.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use crate::framebuffer::{copy_root_software, Pixmap, RenderBackend, SwapImage};
use crate::host::Orientation;
use crate::outputs::OutputSet;
use crate::session::Session;
use crate::utils::Rect;
use crate::window::HostedWindow;

impl Session {
    /// The hosted window was rotated by the compositor.
    pub fn handle_window_orientation_change(
        &mut self,
        window: &mut HostedWindow,
        orientation: Orientation,
    ) {
        debug!("orientation: {orientation:?}");

        if let Err(err) = self.resize_root(window, None) {
            warn!("error applying orientation change: {err:?}");
        }
    }

    /// The hosted window was resized by the compositor.
    pub fn handle_window_resize(&mut self, window: &mut HostedWindow, width: i32, height: i32) {
        if let Err(err) = self.resize_root(window, Some((width, height))) {
            warn!("error resizing root: {err:?}");
        }
    }

    fn resize_root(
        &mut self,
        window: &mut HostedWindow,
        size: Option<(i32, i32)>,
    ) -> anyhow::Result<()> {
        let old_orientation = window.orientation;
        window.orientation = window.surface_orientation();

        let (cur_w, cur_h) = window.size();
        let scale = 1 + i32::from(self.doubled);
        let (target_w, target_h) = match size {
            // Orientation-only trigger: the window keeps its size unless the
            // rotation exchanged the axes.
            None => {
                if old_orientation.swaps_axes_with(window.orientation) {
                    (i32::from(cur_h), i32::from(cur_w))
                } else {
                    (i32::from(cur_w), i32::from(cur_h))
                }
            }
            Some((width, height)) => match window.orientation {
                Orientation::Normal | Orientation::Inverted => (width * scale, height * scale),
                Orientation::Left | Orientation::Right => (height * scale, width * scale),
            },
        };

        if target_w == i32::from(cur_w) && target_h == i32::from(cur_h) {
            // Damage the window if it was rotated in place.
            if old_orientation != window.orientation {
                window.damage_region(window.region);
            }
            return Ok(());
        }

        // The swap image must not be referenced while the presentation
        // pipeline still owns its buffer; destroy it once the pipeline lets
        // go.
        if let Some(image) = window.swap_image.take() {
            if let Err(err) = self.wait_for_image_release(&image) {
                window.swap_image = Some(image);
                return Err(err).context("swap image still held by the presentation pipeline");
            }
            if let RenderBackend::Accel(renderer) = &mut self.renderer {
                renderer.destroy_image(image);
            }
        }

        if self.rootless {
            return Ok(());
        }

        if !self.outputs.is_windowed() {
            debug!("root resized, replacing all outputs with a single windowed output");

            let outputs = std::mem::replace(&mut self.outputs, OutputSet::Hardware(Vec::new()));
            for vout in outputs.into_vec() {
                self.destroy_output(vout);
            }

            let vout = self.create_virtual_output("Windowed");
            self.outputs = OutputSet::Windowed(vout);
            self.server.disable_screensaver();
        }

        debug!(
            "root resized to {target_w}x{target_h} with orientation {:?}",
            window.orientation
        );

        let old_w = i32::from(self.screen.width);
        let old_h = i32::from(self.screen.height);
        let mut pixmap = Pixmap::new(target_w as u16, target_h as u16, self.screen.bits_per_pixel);

        let copy = Rect::from_size(target_w, target_h).intersection(Rect::from_size(old_w, old_h));
        match &mut self.renderer {
            RenderBackend::Accel(renderer) => renderer
                .copy_root(&self.root_pixmap, &mut pixmap, copy)
                .context("error migrating root content")?,
            RenderBackend::Software => copy_root_software(&self.root_pixmap, &mut pixmap, copy),
        }

        self.screen.width = target_w as u16;
        self.screen.height = target_h as u16;
        self.screen.mm_width = target_w as u32 * 254 / (10 * self.dpi);
        self.screen.mm_height = target_h as u32 * 254 / (10 * self.dpi);

        self.root_pixmap = pixmap;
        self.screen.root_clip = Rect::from_size(target_w, target_h);

        window.set_size(target_w as u16, target_h as u16);
        window.region = Rect::from_size(target_w, target_h);
        window.damage_region(window.region);

        // Geometry recompute invalidates cached sprite state, so walk every
        // pointer back onto the screen at its old position.
        let (width, height) = (self.screen.width, self.screen.height);
        self.server.for_each_pointer(&mut |device| {
            let (x, y) = device.position();
            device.update_sprite(width, height);
            device.set_position(x, y);
        });

        self.sync_windowed_output();
        if self.server.connection_info_ready() {
            self.server.announce_screen_size(width, height);
        }
        self.server.update_desktop_dimensions();

        Ok(())
    }

    /// Waits for the presentation pipeline to release a swap image, draining
    /// posted main-loop work in between checks since that work may be what
    /// releases it. Gives up after [`Session::release_timeout`].
    fn wait_for_image_release(&mut self, image: &SwapImage) -> anyhow::Result<()> {
        if image.is_released() {
            return Ok(());
        }

        let deadline = Instant::now() + self.release_timeout;
        loop {
            self.drain_posted();
            if image.is_released() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for swap image release");
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}
