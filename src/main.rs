#[macro_use]
extern crate tracing;

use std::env;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use xnested::cli::Cli;
use xnested::framebuffer::RenderBackend;
use xnested::headless::{HeadlessHost, HeadlessRenderer, HeadlessServer};
use xnested::host::{
    ConnectionState, HostMode, HostOutput, Orientation, OutputType, PowerMode, SubpixelOrder,
};
use xnested::session::{Options, Session};

fn main() -> anyhow::Result<()> {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| "xnested=debug,info".to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let mut event_loop: EventLoop<Session> = EventLoop::try_new().unwrap();

    // Without a real compositor to connect to, drive the session against the
    // in-memory host with a single output matching the requested window.
    let host = HeadlessHost::new(vec![HostOutput {
        ty: OutputType::Hdmi,
        connection: ConnectionState::Connected,
        current_mode: Some(HostMode {
            width: i32::from(cli.width),
            height: i32::from(cli.height),
            refresh: 60.0,
        }),
        position: (0, 0),
        physical_size_mm: (0, 0),
        subpixel: SubpixelOrder::Unknown,
        orientation: Orientation::Normal,
        power: PowerMode::On,
    }]);
    let server = HeadlessServer::new_shared();
    server.borrow_mut().connection_info_ready = true;

    let renderer = if cli.software {
        RenderBackend::Software
    } else {
        RenderBackend::Accel(Box::new(HeadlessRenderer::new_shared()))
    };

    let (mut session, ping_source) = Session::new(
        Box::new(host.clone()),
        Box::new(server),
        renderer,
        Options {
            rootless: cli.rootless,
            doubled: cli.doubled,
            dpi: cli.dpi,
        },
        (cli.width, cli.height),
    )?;

    session.init_outputs()?;
    info!(
        "initialized {} outputs, screen {}x{}",
        session.outputs.len(),
        session.screen.width,
        session.screen.height
    );

    event_loop
        .handle()
        .insert_source(ping_source, |_, _, session| session.drain_posted())
        .unwrap();

    // Report one configuration change from off the main thread to exercise
    // the hotplug path.
    {
        let host = host.clone();
        std::thread::spawn(move || host.notify_config_change());
    }

    let signal = event_loop.get_signal();
    event_loop
        .handle()
        .insert_source(
            Timer::from_duration(Duration::from_millis(500)),
            move |_, _, _| {
                signal.stop();
                TimeoutAction::Drop
            },
        )
        .unwrap();

    event_loop.run(None, &mut session, |_| ())?;

    session.shutdown();
    info!("session torn down");
    Ok(())
}
