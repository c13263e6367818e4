pub mod acceptor;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_sink;
pub mod game;
pub mod lobby;
pub mod membership;
pub mod rng;

pub use config::Config;
pub use error::RelayError;
pub use error_sink::{ErrorSink, FileErrorSink, NullErrorSink, VecErrorSink};
pub use membership::LobbyMembership;

use std::net::TcpListener;
use std::sync::Arc;

use chessrelay_net::EventLoop;

/// Binds `config.bind_addr()` and serves it forever. Returns only if
/// binding the listener fails.
pub fn run(config: Config) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind_addr())?;
    serve(listener, config)
}

/// Wires the three long-lived workers together around an already-bound
/// listener and blocks forever running the lobby loop on the calling
/// thread, exactly the way the original server's `main` ran
/// `lobbyManagerThreadStart` after spinning off
/// `connectionsAcceptorThreadStart`. Taking the listener rather than an
/// address lets callers (tests, in particular) bind to an OS-assigned
/// port and learn it before the server starts accepting.
pub fn serve(listener: TcpListener, config: Config) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "listening for connections");

    let membership = Arc::new(LobbyMembership::new(config.lobby_capacity()));
    let error_sink: Arc<dyn ErrorSink> = Arc::new(FileErrorSink::new(config.error_log_path()));

    let event_loop = EventLoop::new(config.lobby_capacity())?;
    let lobby_registry = event_loop.registry().try_clone()?;

    {
        let membership = Arc::clone(&membership);
        std::thread::Builder::new().name("acceptor".into()).spawn(move || {
            acceptor::run_acceptor(listener, membership, lobby_registry);
        })?;
    }

    lobby::run_lobby(event_loop, membership, config, error_sink);
    Ok(())
}
