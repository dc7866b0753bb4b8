// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{Context, Result};
use clap::Parser;
use smithay::{
    reexports::{calloop::EventLoop, wayland_server::Display},
    wayland::socket::ListeningSocketSource,
};
use tracing::{error, info};

mod backend;
mod config;
mod environment;
mod input;
mod output_layout;
mod plugins;
mod scene;
mod shell;
mod startup;
mod state;
mod utils;
mod wayland;

pub use state::State;

/// A tiling/floating Wayland compositor core.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
struct Cli {
    /// Path to a config file (TOML while the INI loader is out of scope).
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

fn main() {
    install_signal_handlers();
    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));

    if let Err(err) = main_inner() {
        error!("Error occurred in main(): {:?}", err);
        std::process::exit(1);
    }
}

fn main_inner() -> Result<()> {
    init_logger()?;
    let cli = Cli::parse();
    info!("tessera starting up!");

    let config = match &cli.config {
        Some(path) => config::load_toml(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => config::Config::default(),
    };

    let mut event_loop = EventLoop::try_new().context("Failed to initialize event loop")?;

    let (display, socket) = init_wayland_display(&mut event_loop)?;

    let mut state = State::new(
        &display,
        socket,
        event_loop.handle(),
        event_loop.get_signal(),
        config,
    );

    backend::init_backend(&display.handle(), &mut event_loop, &mut state)?;

    environment::update_environment(state.socket_name());
    startup::run_startup_program();

    info!("Starting event loop");

    event_loop.run(None, &mut state, |state| {
        if state.should_stop {
            info!("Shutting down");
            state.loop_signal.stop();
            state.loop_signal.wakeup();
            return;
        }

        let _ = state.display_handle.flush_clients();
    })?;

    info!("Event loop exited");
    Ok(())
}

fn init_logger() -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessera=info"));

    fmt().with_env_filter(filter).init();

    Ok(())
}

fn init_wayland_display(
    event_loop: &mut EventLoop<'static, State>,
) -> Result<(Display<State>, String)> {
    let display = Display::<State>::new().context("Failed to create wayland display")?;

    let listening_socket =
        ListeningSocketSource::new_auto().context("Failed to create listening socket")?;

    let socket_name = listening_socket.socket_name().to_string_lossy().into_owned();

    info!("Listening on wayland socket: {}", socket_name);

    event_loop
        .handle()
        .insert_source(listening_socket, |client_stream, _, state| {
            let _ = state.display_handle.insert_client(
                client_stream,
                std::sync::Arc::new(crate::wayland::handlers::ClientState::new()),
            );
        })
        .context("Failed to init wayland socket source")?;

    Ok((display, socket_name))
}

/// SIGSEGV/SIGFPE/SIGABRT get a trace-and-exit handler; SIGUSR1 is reserved
/// for XWayland-ready synchronization and otherwise ignored here.
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGSEGV, fatal_signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGFPE, fatal_signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGABRT, fatal_signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGUSR1, libc::SIG_IGN);
    }
}

extern "C" fn fatal_signal_handler(sig: libc::c_int) {
    let msg: &[u8] = match sig {
        libc::SIGSEGV => b"tessera: received SIGSEGV, aborting\n",
        libc::SIGFPE => b"tessera: received SIGFPE, aborting\n",
        libc::SIGABRT => b"tessera: received SIGABRT, aborting\n",
        _ => b"tessera: received fatal signal, aborting\n",
    };
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(101);
    }
}
