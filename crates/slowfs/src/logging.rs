//! Tracing setup shared by the workspace binaries.

use std::io;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default tokio-console port, overridable with `TOKIO_CONSOLE_PORT`.
#[cfg(feature = "tokio-console")]
const DEFAULT_CONSOLE_PORT: u16 = 6669;

/// Maps a `-v` count to a filter directive.
pub fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over the verbosity count. With the
/// `tokio-console` feature a console layer is added when its port is free.
pub fn setup_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(verbose)));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(filter);
    let registry = tracing_subscriber::registry().with(fmt_layer);

    #[cfg(feature = "tokio-console")]
    {
        let (console_layer, port) = console_layer();
        let enabled = console_layer.is_some();
        registry.with(console_layer).init();
        if enabled {
            tracing::info!("tokio-console enabled on 127.0.0.1:{port}");
        } else {
            tracing::warn!("tokio-console port {port} already in use, running without console");
        }
    }

    #[cfg(not(feature = "tokio-console"))]
    registry.init();
}

/// Builds the console layer if its port can be bound.
#[cfg(feature = "tokio-console")]
fn console_layer() -> (Option<console_subscriber::ConsoleLayer>, u16) {
    use std::net::{SocketAddr, TcpListener};

    let port = std::env::var("TOKIO_CONSOLE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CONSOLE_PORT);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let layer = TcpListener::bind(addr).is_ok().then(|| {
        console_subscriber::ConsoleLayer::builder()
            .server_addr(addr)
            .spawn()
    });
    (layer, port)
}
