use std::sync::Arc;
use std::time::{Duration, Instant};

use chessrelay_net::{EventLoop, ReadOutcome, TokenSlab};
use chessrelay_wire::message::{self, Frame, MessageType};
use mio::Token;

use crate::config::Config;
use crate::connection::{Connection, PendingPairRequest};
use crate::error::RelayError;
use crate::error_sink::{log_and_record, ErrorSink};
use crate::game;
use crate::membership::{LobbyMembership, TakeForGame};

/// What happened while processing one event; applied once the per-event
/// pass is done so nothing mutates the slab mid-iteration.
enum Outcome {
    Continue,
    Disconnect(Token),
    /// A `PAIR_ACCEPT` naming `requester`'s id, sent by `accepter`.
    Paired { requester: Token, accepter: Token, requester_id: u32 },
}

/// Runs forever: waits for the lobby to be non-empty, polls every member's
/// socket, dispatches `PAIR_REQUEST`/`PAIR_ACCEPT`/`PAIR_DECLINE`, sweeps
/// timed-out pair requests, and spawns a game worker the moment two
/// connections agree to play.
pub fn run_lobby(mut event_loop: EventLoop, membership: Arc<LobbyMembership>, config: Config, error_sink: Arc<dyn ErrorSink>) {
    loop {
        // Block only while the lobby is genuinely empty; this is the same
        // wake-on-non-empty contract the original server got from
        // `g_lobbyEmptyCond`.
        drop(membership.wait_non_empty());

        let events = match event_loop.poll(Some(config.lobby_poll_timeout())) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "lobby poll failed");
                continue;
            }
        };

        let mut slab = membership.lock_for_poll();

        let mut outcomes = Vec::new();
        for ev in &events {
            if !ev.readable && !ev.closed && !ev.errored {
                continue;
            }
            outcomes.push(handle_readable(&mut slab, ev.token, &error_sink));
        }
        sweep_timeouts(&mut slab, config.pair_request_timeout(), &error_sink);

        let mut disconnected = Vec::new();
        let mut paired = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Continue => {}
                Outcome::Disconnect(token) => disconnected.push(token),
                Outcome::Paired { requester, accepter, requester_id } => paired.push((requester, accepter, requester_id)),
            }
        }

        for token in disconnected {
            if let Some(mut conn) = slab.remove(token) {
                let _ = event_loop.registry().deregister(&mut conn.stream);
                tracing::info!(id = conn.id, "connection left the lobby");
            }
        }

        drop(slab);

        for (requester, accepter, requester_id) in paired {
            spawn_if_ready(&membership, event_loop.registry(), requester, accepter, requester_id, &config, &error_sink);
        }
    }
}

/// Resolves one `PAIR_ACCEPT` against the current membership now that the
/// whole readiness pass has finished. Two accepts in the same pass naming the
/// same requester race here: `take_for_game` checks both sides are still
/// resident before removing either, so the loser finds its requester already
/// gone and is told `ID_NOT_IN_LOBBY` instead of being silently dropped.
fn spawn_if_ready(
    membership: &Arc<LobbyMembership>,
    registry: &mio::Registry,
    requester: Token,
    accepter: Token,
    requester_id: u32,
    config: &Config,
    error_sink: &Arc<dyn ErrorSink>,
) {
    match membership.take_for_game(requester, accepter, registry) {
        TakeForGame::Paired([first, second]) => {
            let lobby_registry = match registry.try_clone() {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "failed to clone lobby registry for game thread");
                    return;
                }
            };
            let membership = Arc::clone(membership);
            let config = config.clone();
            let error_sink = Arc::clone(error_sink);
            let ids = (first.id, second.id);
            if let Err(e) = std::thread::Builder::new()
                .name(format!("game-{}-{}", ids.0, ids.1))
                .spawn(move || game::run_game(first, second, membership, lobby_registry, config, error_sink))
            {
                tracing::error!(error = %e, "failed to spawn game thread");
            }
        }
        TakeForGame::RequesterMissing => {
            if let Err(e) = membership.send_to(accepter, message::encode_id_not_in_lobby(requester_id).as_bytes()) {
                let context = format!("failed to reply to connection that lost a pair-accept race for requester {requester_id}");
                log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
            }
        }
        TakeForGame::AccepterMissing => {}
    }
}

/// Reads whatever is available on `token`'s socket, decodes as many
/// complete frames as arrived, and dispatches each one. Only the last,
/// most consequential outcome survives (a disconnect or successful pairing
/// always takes priority over a plain `Continue`).
fn handle_readable(slab: &mut TokenSlab<Connection>, token: Token, error_sink: &Arc<dyn ErrorSink>) -> Outcome {
    let mut frames = Vec::new();
    let closed = {
        let conn = match slab.get_mut(token) {
            Some(c) => c,
            None => return Outcome::Continue,
        };
        let mut buf = [0u8; chessrelay_wire::BUFFER_CAPACITY];
        let remaining = conn.reassembler.remaining_capacity().max(1).min(buf.len());
        match chessrelay_net::read_nonblocking(&mut conn.stream, &mut buf[..remaining]) {
            Ok(ReadOutcome::Data(n)) => {
                if conn.reassembler.feed(&buf[..n]).is_err() {
                    tracing::warn!(id = conn.id, "lobby reassembly buffer overflow");
                    return Outcome::Disconnect(token);
                }
                loop {
                    match conn.reassembler.take_frame() {
                        Ok(Some(frame)) => frames.push(frame),
                        Ok(None) => break,
                        Err(e) => {
                            let context = format!("connection {} sent a malformed frame", conn.id);
                            log_and_record(error_sink.as_ref(), &context, &RelayError::Decode(e));
                            return Outcome::Disconnect(token);
                        }
                    }
                }
                false
            }
            Ok(ReadOutcome::WouldBlock) => false,
            Ok(ReadOutcome::Closed) => true,
            Err(e) => {
                let context = format!("connection {} read failed", conn.id);
                log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
                true
            }
        }
    };

    if closed {
        return Outcome::Disconnect(token);
    }

    let mut result = Outcome::Continue;
    for frame in frames {
        let outcome = dispatch(slab, token, &frame, error_sink);
        if !matches!(outcome, Outcome::Continue) {
            result = outcome;
            break;
        }
    }
    result
}

fn dispatch(slab: &mut TokenSlab<Connection>, token: Token, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> Outcome {
    match frame.msg_type() {
        MessageType::PairRequest => handle_pair_request(slab, token, frame, error_sink),
        MessageType::PairAccept => handle_pair_accept(slab, token, frame, error_sink),
        MessageType::PairDecline => handle_pair_decline(slab, token, frame, error_sink),
        other => {
            let id = slab.get(token).map(|c| c.id).unwrap_or_default();
            let context = format!("connection {id} sent lobby-illegal message {other:?}");
            log_and_record(error_sink.as_ref(), &context, &RelayError::IllegalMessage);
            Outcome::Disconnect(token)
        }
    }
}

fn handle_pair_request(slab: &mut TokenSlab<Connection>, token: Token, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> Outcome {
    let Some(target_id) = message::frame_peer_id(frame) else { return Outcome::Continue };

    let (requester_id, too_soon) = {
        let Some(conn) = slab.get_mut(token) else { return Outcome::Continue };
        let too_soon = conn.pending_pair_request.is_some();
        (conn.id, too_soon)
    };

    if too_soon {
        reply(slab, token, message::encode_pair_request_too_soon(), error_sink);
        return Outcome::Continue;
    }

    if target_id == requester_id {
        reply(slab, token, message::encode_id_not_in_lobby(target_id), error_sink);
        return Outcome::Continue;
    }

    let Some(target_token) = find_by_id(slab, target_id) else {
        reply(slab, token, message::encode_id_not_in_lobby(target_id), error_sink);
        return Outcome::Continue;
    };

    if let Some(conn) = slab.get_mut(token) {
        conn.pending_pair_request = Some(PendingPairRequest { target_id, sent_at: Instant::now() });
    }
    reply(slab, target_token, message::encode_pair_request(requester_id), error_sink);
    Outcome::Continue
}

fn handle_pair_accept(slab: &mut TokenSlab<Connection>, token: Token, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> Outcome {
    let Some(requester_id) = message::frame_peer_id(frame) else { return Outcome::Continue };

    // The server doesn't remember who a PAIR_REQUEST went out to; the peer-id
    // being resident in the lobby is the only precondition for pairing.
    let Some(requester_token) = find_by_id(slab, requester_id) else {
        reply(slab, token, message::encode_id_not_in_lobby(requester_id), error_sink);
        return Outcome::Continue;
    };

    Outcome::Paired { requester: requester_token, accepter: token, requester_id }
}

fn handle_pair_decline(slab: &mut TokenSlab<Connection>, token: Token, frame: &Frame, error_sink: &Arc<dyn ErrorSink>) -> Outcome {
    let Some(requester_id) = message::frame_peer_id(frame) else { return Outcome::Continue };
    let decliner_id = slab.get(token).map(|c| c.id).unwrap_or_default();

    let Some(requester_token) = find_by_id(slab, requester_id) else {
        reply(slab, token, message::encode_id_not_in_lobby(requester_id), error_sink);
        return Outcome::Continue;
    };

    // The decline resolves the requester's outstanding watchdog; without
    // this the requester would stay rate-limited and still get a spurious
    // PAIR_NORESPONSE once sweep_timeouts catches up to it.
    if let Some(conn) = slab.get_mut(requester_token) {
        if conn.pending_pair_request.is_some_and(|p| p.target_id == decliner_id) {
            conn.pending_pair_request = None;
        }
    }

    reply(slab, requester_token, message::encode_pair_decline(decliner_id), error_sink);
    Outcome::Continue
}

fn sweep_timeouts(slab: &mut TokenSlab<Connection>, timeout: Duration, error_sink: &Arc<dyn ErrorSink>) {
    let mut expired = Vec::new();
    for (token, conn) in slab.iter_mut() {
        if let Some(pending) = conn.pending_pair_request {
            if pending.sent_at.elapsed() >= timeout {
                conn.pending_pair_request = None;
                expired.push(token);
            }
        }
    }
    for token in expired {
        reply(slab, token, message::encode_pair_no_response(), error_sink);
    }
}

fn find_by_id(slab: &TokenSlab<Connection>, id: u32) -> Option<Token> {
    slab.iter().find(|(_, c)| c.id == id).map(|(t, _)| t)
}

fn reply(slab: &mut TokenSlab<Connection>, token: Token, frame: Frame, error_sink: &Arc<dyn ErrorSink>) {
    if let Some(conn) = slab.get_mut(token) {
        if let Err(e) = chessrelay_net::send_all(&mut conn.stream, frame.as_bytes()) {
            let context = format!("failed to reply to connection {}", conn.id);
            log_and_record(error_sink.as_ref(), &context, &RelayError::Io(e));
        }
    }
}
