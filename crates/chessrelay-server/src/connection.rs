use std::net::SocketAddr;
use std::time::Instant;

use chessrelay_wire::Reassembler;

/// A pair request this connection is waiting on a reply to. Tracked so the
/// lobby can time it out with `PAIR_NORESPONSE` and rate-limit a follow-up
/// request sent before the timeout elapses.
#[derive(Debug, Clone, Copy)]
pub struct PendingPairRequest {
    pub target_id: u32,
    pub sent_at: Instant,
}

/// One socket sitting in the lobby. Owned entirely by whichever worker
/// currently holds it: the lobby while unpaired, a game worker once paired
/// (a game assigns each `Connection` a `Side` for the match but otherwise
/// uses it exactly as the lobby does).
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    pub stream: mio::net::TcpStream,
    pub reassembler: Reassembler,
    pub pending_pair_request: Option<PendingPairRequest>,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, stream: mio::net::TcpStream) -> Self {
        Self { id, addr, stream, reassembler: Reassembler::new(), pending_pair_request: None }
    }
}
