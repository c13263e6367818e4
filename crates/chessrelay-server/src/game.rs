use std::sync::Arc;

use chessrelay_net::{EventLoop, ReadOutcome};
use chessrelay_wire::message::{self, MessageType, Side};
use chessrelay_wire::Frame;
use mio::{Interest, Registry, Token};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::error_sink::{log_and_record, ErrorSink};
use crate::membership::LobbyMembership;

/// Runs an entire game session to completion on its own thread, owning both
/// players' sockets outright for as long as the game lasts. Mirrors the
/// original `chessGameThreadStart`, which copied its two `LobbyConnection`s
/// onto its own stack and never touched the lobby's table again until the
/// session ended.
///
/// `lobby_registry` is a clone of the lobby's own poll group handle (see
/// `mio::Registry::try_clone`), not this game's own event loop: a returning
/// player must be reregistered with the lobby's poll group so the lobby
/// worker actually observes its readiness, not with a `Poll` this thread is
/// about to drop.
pub fn run_game(
    first: Connection,
    second: Connection,
    membership: Arc<LobbyMembership>,
    lobby_registry: Registry,
    config: Config,
    error_sink: Arc<dyn ErrorSink>,
) {
    let mut event_loop = match EventLoop::new(2) {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!(error = %e, "failed to create game event loop");
            quit_game(&membership, &lobby_registry, [first, second], &[0, 1]);
            return;
        }
    };

    let mut players = [first, second];
    for (i, conn) in players.iter_mut().enumerate() {
        if let Err(e) = event_loop.registry().register(&mut conn.stream, Token(i), Interest::READABLE) {
            tracing::warn!(id = conn.id, error = %e, "failed to register game socket with poll group");
        }
    }

    if let Err(failed) = send_pairing_complete(&mut players, &error_sink) {
        let survivor = 1 - failed;
        quit_game(&membership, &lobby_registry, players, &[survivor]);
        return;
    }

    loop {
        let events = match event_loop.poll(Some(config.game_poll_timeout())) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "game poll failed");
                quit_game(&membership, &lobby_registry, players, &[0, 1]);
                return;
            }
        };

        let mut termination = None;
        for ev in &events {
            let i = ev.token.0;
            if i > 1 || (!ev.readable && !ev.closed && !ev.errored) {
                continue;
            }
            if let Some(returning) = handle_event(&mut players, i, &error_sink) {
                termination = Some(returning);
                break;
            }
        }

        if let Some(returning) = termination {
            quit_game(&membership, &lobby_registry, players, &returning);
            return;
        }
    }
}

/// Assigns one side to each player at random and sends `PAIRING_COMPLETE`.
/// On a send failure, returns the index of the player whose socket failed;
/// that player is not coming back, but nothing has been said yet about what
/// happens to the other one (the caller sends them home).
fn send_pairing_complete(players: &mut [Connection; 2], error_sink: &Arc<dyn ErrorSink>) -> Result<(), usize> {
    let mut rng = StdRng::from_os_rng();
    let first_side = if rng.random::<bool>() { Side::White } else { Side::Black };
    let sides = [first_side, first_side.opposite()];

    for (i, conn) in players.iter_mut().enumerate() {
        let frame = message::encode_pairing_complete(sides[i]);
        if let Err(e) = chessrelay_net::send_all(&mut conn.stream, frame.as_bytes()) {
            let context = format!("failed to send PAIRING_COMPLETE to connection {}", conn.id);
            log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
            return Err(i);
        }
    }
    Ok(())
}

/// Reads whatever is ready on `players[i]`'s socket and decides whether the
/// game continues. `Some(returning)` ends the session; `returning` lists
/// which of the two indices should be sent back to the lobby.
fn handle_event(players: &mut [Connection; 2], i: usize, error_sink: &Arc<dyn ErrorSink>) -> Option<Vec<usize>> {
    let other = 1 - i;

    enum ReadResult {
        Frames(Vec<Frame>),
        WouldBlock,
        Closed,
        IoError,
        Malformed,
    }

    let result = {
        let conn = &mut players[i];
        let mut buf = [0u8; chessrelay_wire::BUFFER_CAPACITY];
        let remaining = conn.reassembler.remaining_capacity().max(1).min(buf.len());
        match chessrelay_net::read_nonblocking(&mut conn.stream, &mut buf[..remaining]) {
            Ok(ReadOutcome::Data(n)) => {
                if conn.reassembler.feed(&buf[..n]).is_err() {
                    tracing::warn!(id = conn.id, "game reassembly buffer overflow");
                    ReadResult::Malformed
                } else {
                    let mut frames = Vec::new();
                    let mut malformed = false;
                    loop {
                        match conn.reassembler.take_frame() {
                            Ok(Some(frame)) => frames.push(frame),
                            Ok(None) => break,
                            Err(e) => {
                                let context = format!("connection {} sent a malformed frame during a game", conn.id);
                                log_and_record(error_sink.as_ref(), &context, &RelayError::Decode(e));
                                malformed = true;
                                break;
                            }
                        }
                    }
                    if malformed { ReadResult::Malformed } else { ReadResult::Frames(frames) }
                }
            }
            Ok(ReadOutcome::WouldBlock) => ReadResult::WouldBlock,
            Ok(ReadOutcome::Closed) => ReadResult::Closed,
            Err(e) => {
                let context = format!("connection {} read failed during a game", conn.id);
                log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
                ReadResult::IoError
            }
        }
    };

    match result {
        ReadResult::WouldBlock => None,
        ReadResult::IoError => {
            // Mirrors handleRecvErr: the failing side is simply dropped, no
            // notification is attempted, the opponent returns silently.
            Some(vec![other])
        }
        ReadResult::Closed | ReadResult::Malformed => {
            // Mirrors handleClosedConnection / handleInvalidMessageType: try
            // to tell the opponent, and only send them home if that send
            // actually went through.
            if notify_opponent_closed(players, other) {
                Some(vec![other])
            } else {
                Some(vec![])
            }
        }
        ReadResult::Frames(frames) => {
            for frame in &frames {
                if let Some(returning) = dispatch_frame(players, i, frame, error_sink) {
                    return Some(returning);
                }
            }
            None
        }
    }
}

fn notify_opponent_closed(players: &mut [Connection; 2], opponent: usize) -> bool {
    let frame = message::encode_opponent_closed_connection();
    let conn = &mut players[opponent];
    if let Err(e) = chessrelay_net::send_all(&mut conn.stream, frame.as_bytes()) {
        tracing::warn!(id = conn.id, error = %e, "failed to notify opponent of closed connection");
        false
    } else {
        true
    }
}

/// Forwards `frame` byte-for-byte from `players[from]` to `players[to]`.
fn forward(players: &mut [Connection; 2], from: usize, to: usize, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> bool {
    let from_id = players[from].id;
    let conn = &mut players[to];
    tracing::info!(from = from_id, to = conn.id, msg_type = ?frame.msg_type(), "forwarding game message");
    if let Err(e) = chessrelay_net::send_all(&mut conn.stream, frame.as_bytes()) {
        let context = format!("write failed when sending a message from connection {from_id} to connection {}", conn.id);
        log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
        false
    } else {
        true
    }
}

/// Applies one game-legal frame from `players[i]`. Returns `Some(returning)`
/// when the session ends as a result.
fn dispatch_frame(players: &mut [Connection; 2], i: usize, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> Option<Vec<usize>> {
    let other = 1 - i;

    match frame.msg_type() {
        MessageType::Unpair => {
            // The original sends the same UNPAIR frame back to both players
            // unconditionally and always puts both back in the lobby,
            // regardless of whether either send actually landed.
            let _ = forward(players, i, other, frame, error_sink);
            let _ = forward(players, other, i, frame, error_sink);
            Some(vec![0, 1])
        }
        MessageType::RematchDecline => {
            if forward(players, i, other, frame, error_sink) {
                Some(vec![0, 1])
            } else {
                Some(vec![i])
            }
        }
        t if t.is_game_legal() => {
            if forward(players, i, other, frame, error_sink) {
                None
            } else {
                Some(vec![i])
            }
        }
        other_type => {
            let context = format!("connection {} sent message type {other_type:?}, which is not legal during a game", players[i].id);
            log_and_record(error_sink.as_ref(), &context, &RelayError::IllegalMessage);
            if notify_opponent_closed(players, other) {
                Some(vec![other])
            } else {
                Some(vec![])
            }
        }
    }
}

fn quit_game(membership: &LobbyMembership, registry: &Registry, players: [Connection; 2], returning: &[usize]) {
    chessrelay_utils::safe_assert!(returning.iter().all(|&i| i < 2), "quit_game returning index out of range: {returning:?}");

    for (i, conn) in players.into_iter().enumerate() {
        if !returning.contains(&i) {
            continue;
        }
        let id = conn.id;
        if let Err(dropped) = membership.readmit(conn, registry) {
            tracing::warn!(id = dropped.id, "lobby had no room to re-admit a returning connection");
        } else {
            tracing::info!(id, "connection returned to the lobby");
        }
    }
}
