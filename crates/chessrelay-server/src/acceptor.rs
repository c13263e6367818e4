use std::net::TcpListener;
use std::sync::Arc;

use mio::Registry;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::membership::{Full, LobbyMembership};
use chessrelay_wire::message;

/// Runs forever on its own thread, blocking in `accept` between
/// connections exactly like the original `connectionsAcceptor.c`. Never
/// touches mio itself: registration with the lobby's poll group happens
/// inside [`LobbyMembership::try_admit`].
pub fn run_acceptor(listener: TcpListener, membership: Arc<LobbyMembership>, registry: Registry) {
    // Seeded once per process by virtue of this thread being the only
    // caller of `try_admit`; see DESIGN.md's open-question resolution on
    // PRNG seeding.
    let mut rng = StdRng::from_os_rng();

    loop {
        let (stream, addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(%addr, error = %e, "failed to set accepted socket non-blocking");
            continue;
        }
        let mio_stream = mio::net::TcpStream::from_std(stream);

        match membership.try_admit(mio_stream, addr, &registry, &mut rng) {
            Ok(id) => {
                tracing::info!(%addr, id, "accepted connection");
            }
            Err(Full(mut rejected)) => {
                // Capacity rejection is routine, expected traffic, not an
                // error: it stays on the operational tracing line and never
                // reaches the error sink.
                tracing::info!(%addr, "lobby at capacity, rejecting connection");
                if let Err(e) = chessrelay_net::send_all(&mut rejected, message::encode_server_full().as_bytes()) {
                    tracing::warn!(%addr, error = %e, "failed to send SERVER_FULL");
                }
            }
        }
    }
}
