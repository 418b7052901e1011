//! The virtual output registry.
//!
//! Mirrors the compositor's output configuration into the window system's
//! virtual output objects. Entries correlate with configuration snapshots by
//! list position; an output-count change between snapshots therefore breaks
//! the correlation and is fatal. If the host ever grows stable output
//! identifiers, the lockstep walk in [`Session::resync_outputs`] should key
//! on them instead.

use std::collections::HashMap;

use crate::cvt;
use crate::host::{ConnectionState, HostOutput, OutputType, PowerMode, SubpixelOrder};
use crate::server::{CrtcId, DpmsMode, OutputId, Rotation, ScreenConfigHooks, WindowServer};
use crate::session::Session;

/// Number of entries in a timing controller's gamma ramp.
const GAMMA_SIZE: u16 = 256;

/// One virtual output, real or synthetic.
#[derive(Debug)]
pub struct VirtualOutput {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub connected: bool,
    pub output: OutputId,
    pub crtc: CrtcId,
}

/// The session's outputs: either one virtual output per hardware output, or
/// a single synthetic output tracking the hosted window.
pub enum OutputSet {
    Hardware(Vec<VirtualOutput>),
    Windowed(VirtualOutput),
}

impl OutputSet {
    pub fn is_windowed(&self) -> bool {
        matches!(self, OutputSet::Windowed(_))
    }

    pub fn len(&self) -> usize {
        match self {
            OutputSet::Hardware(list) => list.len(),
            OutputSet::Windowed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VirtualOutput> {
        match self {
            OutputSet::Hardware(list) => list.iter(),
            OutputSet::Windowed(output) => std::slice::from_ref(output).iter(),
        }
    }

    pub fn into_vec(self) -> Vec<VirtualOutput> {
        match self {
            OutputSet::Hardware(list) => list,
            OutputSet::Windowed(output) => vec![output],
        }
    }
}

/// The registry's answers to the window system's legacy configuration hooks:
/// no rotations, and whole-screen configuration requests are rejected. The
/// only supported reconfiguration path is host-driven resize.
pub struct RegistryHooks;

impl ScreenConfigHooks for RegistryHooks {
    fn supported_rotations(&self) -> Rotation {
        Rotation::empty()
    }

    fn set_screen_config(
        &mut self,
        _rotation: Rotation,
        _rate: i32,
        _width: u16,
        _height: u16,
    ) -> bool {
        false
    }
}

/// Synchronizes one virtual output with its snapshot entry.
pub fn update_output(server: &mut dyn WindowServer, vout: &mut VirtualOutput, host: &HostOutput) {
    let connected =
        host.connection != ConnectionState::Disconnected && host.current_mode.is_some();
    vout.connected = connected;

    server.set_connection(
        vout.output,
        if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        },
    );
    server.set_subpixel_order(vout.output, SubpixelOrder::Unknown);

    if connected {
        let mode = host.current_mode.unwrap();

        vout.width = mode.width;
        vout.height = mode.height;
        vout.x = host.position.0;
        vout.y = host.position.1;

        let mut info = cvt::generate_mode(mode.width, mode.height, mode.refresh);
        // Odd resolutions like 1366x768 don't show correctly otherwise.
        info.width = mode.width as u16;
        info.height = mode.height as u16;
        info.name = format!("{}x{}", info.width, info.height);

        server.set_physical_size(vout.output, host.physical_size_mm.0, host.physical_size_mm.1);
        server.set_modes(vout.output, std::slice::from_ref(&info));
        // The host and window-system subpixel enumerations line up.
        server.set_subpixel_order(vout.output, host.subpixel);

        server.notify_crtc(
            vout.crtc,
            Some(&info),
            vout.x,
            vout.y,
            Rotation::from_orientation(host.orientation),
            &[vout.output],
        );
    } else {
        vout.width = 0;
        vout.height = 0;
        vout.x = 0;
        vout.y = 0;

        server.set_physical_size(vout.output, 0, 0);
        server.set_modes(vout.output, &[]);
        server.notify_crtc(vout.crtc, None, 0, 0, Rotation::ROTATE_0, &[vout.output]);
    }
}

impl Session {
    /// Creates a virtual output and its timing controller in the window
    /// system. The caller decides where the descriptor lives.
    pub fn create_virtual_output(&mut self, name: &str) -> VirtualOutput {
        let crtc = self.server.create_crtc();
        let output = self.server.create_output(name);
        self.server.set_gamma_size(crtc, GAMMA_SIZE);
        self.server.set_output_crtcs(output, &[crtc]);

        VirtualOutput {
            name: name.to_owned(),
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            connected: false,
            output,
            crtc,
        }
    }

    /// Destroys a descriptor's window-system handles and drops it.
    pub fn destroy_output(&mut self, vout: VirtualOutput) {
        self.server.destroy_crtc(vout.crtc);
        self.server.destroy_output(vout.output);
    }

    /// Builds the registry from the session's configuration snapshot and
    /// hands the configuration hooks to the window system.
    pub fn init_outputs(&mut self) -> anyhow::Result<()> {
        self.server.set_config_hooks(Box::new(RegistryHooks));

        let proxy = self.proxy();
        self.host.set_config_change_callback(Box::new(move || {
            proxy.post(|session| session.handle_hotplug());
        }));

        let mut type_counts: HashMap<OutputType, u32> = HashMap::new();
        let mut list = Vec::with_capacity(self.display.num_outputs());
        for host in self.display.outputs.clone() {
            let index = type_counts.entry(host.ty).or_insert(0);
            let name = format!("{}-{}", host.ty.name(), index);
            *index += 1;

            let mut vout = self.create_virtual_output(&name);
            update_output(self.server.as_mut(), &mut vout, &host);
            list.push(vout);
        }
        self.outputs = OutputSet::Hardware(list);

        self.server.set_screen_size_range((320, 200), (32767, 32767));
        self.recompute_screen_size();

        Ok(())
    }

    /// Reconciles the registry against a fresh configuration snapshot.
    ///
    /// No-op in windowed mode: the synthetic output tracks the hosted window,
    /// not the hardware.
    pub fn resync_outputs(&mut self) {
        if self.outputs.is_windowed() {
            return;
        }

        let new_config = self.host.create_display_config();
        let new_count = new_config.num_outputs();
        let old_count = self.display.num_outputs();
        if new_count != old_count {
            panic!("number of outputs changed on update: {old_count} -> {new_count}");
        }
        self.display = new_config;

        let Session {
            server,
            display,
            outputs,
            ..
        } = self;
        if let OutputSet::Hardware(list) = outputs {
            for (vout, host) in list.iter_mut().zip(&display.outputs) {
                update_output(server.as_mut(), vout, host);
            }
        }

        self.recompute_screen_size();
    }

    /// Recomputes the virtual screen size as the bounding box of all outputs
    /// and announces it.
    pub fn recompute_screen_size(&mut self) {
        let mut width = 0;
        let mut height = 0;
        for vout in self.outputs.iter() {
            width = width.max(vout.x + vout.width);
            height = height.max(vout.y + vout.height);
        }

        self.screen.width = width.clamp(0, i32::from(u16::MAX)) as u16;
        self.screen.height = height.clamp(0, i32::from(u16::MAX)) as u16;

        if self.server.connection_info_ready() {
            self.server
                .announce_screen_size(self.screen.width, self.screen.height);
        }
        self.server.update_desktop_dimensions();
    }

    /// Refreshes the synthetic windowed output from the current screen size.
    pub fn sync_windowed_output(&mut self) {
        let Session {
            server,
            outputs,
            screen,
            ..
        } = self;
        let OutputSet::Windowed(vout) = outputs else {
            return;
        };

        vout.connected = true;
        server.set_connection(vout.output, ConnectionState::Connected);
        server.set_subpixel_order(vout.output, SubpixelOrder::Unknown);

        vout.width = i32::from(screen.width);
        vout.height = i32::from(screen.height);
        vout.x = 0;
        vout.y = 0;

        let mut info = cvt::generate_mode(vout.width, vout.height, 60.0);
        info.width = vout.width as u16;
        info.height = vout.height as u16;
        info.name = format!("{}x{}", info.width, info.height);

        server.set_physical_size(vout.output, 0, 0);
        server.set_modes(vout.output, std::slice::from_ref(&info));
        server.notify_crtc(
            vout.crtc,
            Some(&info),
            0,
            0,
            Rotation::ROTATE_0,
            &[vout.output],
        );
    }

    /// Maps a DPMS request onto the host's per-output power modes.
    ///
    /// Returns whether the request was handled. Power management is
    /// meaningless for a client-embedded surface, so rootless and windowed
    /// sessions report unhandled without touching the host.
    pub fn set_power_mode(&mut self, mode: DpmsMode) -> bool {
        if self.rootless || self.outputs.is_windowed() {
            return false;
        }

        let target = match mode {
            DpmsMode::On => PowerMode::On,
            DpmsMode::Standby => PowerMode::Standby,
            DpmsMode::Suspend => PowerMode::Suspend,
            DpmsMode::Off => PowerMode::Off,
        };

        debug!("setting DPMS mode to {mode:?}");

        let mut changed = false;
        for output in &mut self.display.outputs {
            if output.power != target {
                output.power = target;
                changed = true;
            }
        }

        if changed {
            self.host.apply_display_config(&self.display);
        }

        true
    }

    /// Runs on the main loop after the host reports a configuration change.
    pub fn handle_hotplug(&mut self) {
        self.resync_outputs();
        self.server.request_refresh();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;
    use crate::framebuffer::RenderBackend;
    use crate::headless::{HeadlessHost, HeadlessServer, SharedServer};
    use crate::host::{HostMode, Orientation};
    use crate::session::Options;

    fn host_output(ty: OutputType, x: i32, y: i32, w: i32, h: i32) -> HostOutput {
        HostOutput {
            ty,
            connection: ConnectionState::Connected,
            current_mode: Some(HostMode {
                width: w,
                height: h,
                refresh: 60.0,
            }),
            position: (x, y),
            physical_size_mm: (rough_mm(w), rough_mm(h)),
            subpixel: SubpixelOrder::HorizontalRgb,
            orientation: Orientation::Normal,
            power: PowerMode::On,
        }
    }

    fn rough_mm(px: i32) -> i32 {
        px * 254 / 960
    }

    fn make_session(outputs: Vec<HostOutput>) -> (Session, HeadlessHost, SharedServer) {
        make_session_with_options(outputs, Options::default())
    }

    fn make_session_with_options(
        outputs: Vec<HostOutput>,
        options: Options,
    ) -> (Session, HeadlessHost, SharedServer) {
        let host = HeadlessHost::new(outputs);
        let server = HeadlessServer::new_shared();
        let (session, _source) = Session::new(
            Box::new(host.clone()),
            Box::new(server.clone()),
            RenderBackend::Software,
            options,
            (0, 0),
        )
        .unwrap();
        (session, host, server)
    }

    #[test]
    fn init_creates_one_descriptor_per_snapshot_entry() {
        let (mut session, _host, server) = make_session(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            host_output(OutputType::Hdmi, 1920, 0, 1280, 1024),
            host_output(OutputType::Vga, 3200, 0, 800, 600),
        ]);
        session.init_outputs().unwrap();

        let names: Vec<_> = session.outputs.iter().map(|o| o.name.clone()).collect();
        assert_eq!(names, vec!["HDMI-0", "HDMI-1", "VGA-0"]);

        let server = server.borrow();
        assert_eq!(server.outputs.len(), 3);
        assert_eq!(server.crtcs.len(), 3);
        for crtc in server.crtcs.values() {
            assert_eq!(crtc.gamma_size, 256);
        }
        assert_eq!(server.size_range, Some(((320, 200), (32767, 32767))));
        assert!(server.hooks.is_some());
    }

    #[test]
    fn init_with_no_outputs_yields_empty_registry() {
        let (mut session, _host, _server) = make_session(Vec::new());
        session.init_outputs().unwrap();
        assert_eq!(session.outputs.len(), 0);
        assert_eq!(session.screen.width, 0);
        assert_eq!(session.screen.height, 0);
    }

    #[test]
    fn update_publishes_mode_with_forced_dimensions() {
        let (mut session, _host, server) =
            make_session(vec![host_output(OutputType::Edp, 0, 0, 1366, 768)]);
        session.init_outputs().unwrap();

        let server = server.borrow();
        let record = server.outputs.values().next().unwrap();
        assert_eq!(record.modes.len(), 1);
        let mode = &record.modes[0];
        // CVT rounds 1366 down to 1360, then the reported size wins.
        assert_eq!(mode.width, 1366);
        assert_eq!(mode.height, 768);
        assert_eq!(mode.name, "1366x768");
        assert_eq!(record.connection, Some(ConnectionState::Connected));
        assert_eq!(record.subpixel, Some(SubpixelOrder::HorizontalRgb));
        assert_eq!(record.physical_size, Some((rough_mm(1366), rough_mm(768))));
    }

    #[test]
    fn disconnected_output_is_zeroed() {
        let mut output = host_output(OutputType::Hdmi, 100, 100, 1920, 1080);
        output.connection = ConnectionState::Disconnected;
        let (mut session, _host, server) = make_session(vec![output]);
        session.init_outputs().unwrap();

        let vout = session.outputs.iter().next().unwrap();
        assert_eq!((vout.x, vout.y, vout.width, vout.height), (0, 0, 0, 0));
        assert!(!vout.connected);

        let server = server.borrow();
        let record = server.outputs.values().next().unwrap();
        assert!(record.modes.is_empty());
        assert_eq!(record.connection, Some(ConnectionState::Disconnected));
        let crtc = server.crtcs.values().next().unwrap();
        assert!(crtc.mode.is_none());
    }

    #[test]
    fn rotation_follows_snapshot_orientation() {
        let mut output = host_output(OutputType::Hdmi, 0, 0, 1920, 1080);
        output.orientation = Orientation::Left;
        let (mut session, _host, server) = make_session(vec![output]);
        session.init_outputs().unwrap();

        let server = server.borrow();
        let crtc = server.crtcs.values().next().unwrap();
        assert_eq!(crtc.rotation, Some(Rotation::ROTATE_90));
    }

    #[test]
    fn resync_preserves_descriptor_identity() {
        let (mut session, host, _server) = make_session(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            host_output(OutputType::DisplayPort, 1920, 0, 1280, 1024),
        ]);
        session.init_outputs().unwrap();

        let before: Vec<_> = session
            .outputs
            .iter()
            .map(|o| (o.name.clone(), o.output, o.crtc))
            .collect();

        host.set_outputs(vec![
            host_output(OutputType::Hdmi, 0, 0, 2560, 1440),
            host_output(OutputType::DisplayPort, 2560, 0, 1280, 1024),
        ]);
        session.resync_outputs();

        let after: Vec<_> = session
            .outputs
            .iter()
            .map(|o| (o.name.clone(), o.output, o.crtc))
            .collect();
        assert_eq!(before, after);

        let first = session.outputs.iter().next().unwrap();
        assert_eq!((first.width, first.height), (2560, 1440));
        assert_eq!(session.screen.width, 2560 + 1280);
    }

    #[test]
    #[should_panic(expected = "number of outputs changed")]
    fn resync_with_changed_count_is_fatal() {
        let (mut session, host, _server) =
            make_session(vec![host_output(OutputType::Hdmi, 0, 0, 1920, 1080)]);
        session.init_outputs().unwrap();

        host.set_outputs(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            host_output(OutputType::Hdmi, 1920, 0, 1920, 1080),
        ]);
        session.resync_outputs();
    }

    #[test]
    fn aggregate_size_covers_gaps_and_overlaps() {
        let (mut session, _host, _server) = make_session(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            // Overlapping.
            host_output(OutputType::Hdmi, 1000, 500, 1920, 1080),
            // Gapped.
            host_output(OutputType::Vga, 5000, 0, 640, 480),
        ]);
        session.init_outputs().unwrap();

        assert_eq!(session.screen.width, 5640);
        assert_eq!(session.screen.height, 1580);
    }

    #[test]
    fn size_announcement_waits_for_connection_info() {
        let (mut session, _host, server) =
            make_session(vec![host_output(OutputType::Hdmi, 0, 0, 1920, 1080)]);
        session.init_outputs().unwrap();
        assert!(server.borrow().announced_sizes.is_empty());
        assert_eq!(server.borrow().desktop_dimension_updates, 1);

        server.borrow_mut().connection_info_ready = true;
        session.recompute_screen_size();
        assert_eq!(server.borrow().announced_sizes, vec![(1920, 1080)]);
        assert_eq!(server.borrow().desktop_dimension_updates, 2);
    }

    #[test]
    fn dpms_applies_batched_and_idempotent() {
        let (mut session, host, _server) = make_session(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            host_output(OutputType::Hdmi, 1920, 0, 1920, 1080),
        ]);
        session.init_outputs().unwrap();

        assert!(session.set_power_mode(DpmsMode::Off));
        assert_eq!(host.apply_count(), 1);
        let applied = host.last_applied().unwrap();
        assert!(applied.outputs.iter().all(|o| o.power == PowerMode::Off));

        // Same mode again: nothing left to change, no further apply.
        assert!(session.set_power_mode(DpmsMode::Off));
        assert_eq!(host.apply_count(), 1);

        assert!(session.set_power_mode(DpmsMode::On));
        assert_eq!(host.apply_count(), 2);
    }

    #[test]
    fn dpms_unhandled_when_rootless() {
        let options = Options {
            rootless: true,
            ..Options::default()
        };
        let (mut session, host, _server) = make_session_with_options(
            vec![host_output(OutputType::Hdmi, 0, 0, 1920, 1080)],
            options,
        );
        session.init_outputs().unwrap();

        assert!(!session.set_power_mode(DpmsMode::Off));
        assert_eq!(host.apply_count(), 0);
    }

    #[test]
    fn legacy_hooks_reject_reconfiguration() {
        let mut hooks = RegistryHooks;
        assert_eq!(hooks.supported_rotations(), Rotation::empty());
        assert!(!hooks.set_screen_config(Rotation::ROTATE_90, 60, 1024, 768));
    }

    #[test]
    fn hotplug_from_another_thread_resyncs_on_the_main_loop() {
        let (mut session, host, server) =
            make_session(vec![host_output(OutputType::Hdmi, 0, 0, 1920, 1080)]);
        session.init_outputs().unwrap();

        host.set_outputs(vec![host_output(OutputType::Hdmi, 0, 0, 2560, 1440)]);
        let host2 = host.clone();
        thread::spawn(move || host2.notify_config_change())
            .join()
            .unwrap();

        // Nothing happens until the main loop drains the posted callback.
        assert_eq!(session.screen.width, 1920);
        assert_eq!(server.borrow().refresh_requests, 0);

        session.drain_posted();
        assert_eq!(session.screen.width, 2560);
        assert_eq!(server.borrow().refresh_requests, 1);
    }

    #[test]
    fn hotplugs_are_processed_in_posting_order() {
        let (mut session, host, server) =
            make_session(vec![host_output(OutputType::Hdmi, 0, 0, 1920, 1080)]);
        session.init_outputs().unwrap();
        server.borrow_mut().connection_info_ready = true;

        host.set_outputs(vec![host_output(OutputType::Hdmi, 0, 0, 800, 600)]);
        host.notify_config_change();
        host.set_outputs(vec![host_output(OutputType::Hdmi, 0, 0, 2560, 1440)]);
        host.notify_config_change();

        session.drain_posted();
        assert_eq!(server.borrow().refresh_requests, 2);
        // Both resyncs ran; the latest configuration wins.
        assert_eq!(session.screen.width, 2560);
        assert_eq!(
            server.borrow().announced_sizes.last(),
            Some(&(2560, 1440))
        );
    }

    #[test]
    fn shutdown_destroys_window_system_handles() {
        let (mut session, _host, server) = make_session(vec![
            host_output(OutputType::Hdmi, 0, 0, 1920, 1080),
            host_output(OutputType::Vga, 1920, 0, 800, 600),
        ]);
        session.init_outputs().unwrap();
        session.shutdown();

        assert_eq!(session.outputs.len(), 0);
        let server = server.borrow();
        assert!(server.outputs.is_empty());
        assert!(server.crtcs.is_empty());
    }

    proptest! {
        #[test]
        fn aggregate_size_is_the_bounding_box(
            placements in prop::collection::vec(
                (0i32..2000, 0i32..2000, 1i32..2000, 1i32..2000),
                0..6,
            ),
        ) {
            let outputs = placements
                .iter()
                .map(|&(x, y, w, h)| host_output(OutputType::Hdmi, x, y, w, h))
                .collect();
            let (mut session, _host, _server) = make_session(outputs);
            session.init_outputs().unwrap();

            let width = placements.iter().map(|&(x, _, w, _)| x + w).max().unwrap_or(0);
            let height = placements.iter().map(|&(_, y, _, h)| y + h).max().unwrap_or(0);
            prop_assert_eq!(i32::from(session.screen.width), width);
            prop_assert_eq!(i32::from(session.screen.height), height);
        }
    }
}
