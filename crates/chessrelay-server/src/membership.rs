use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex, MutexGuard};

use chessrelay_net::TokenSlab;
use chessrelay_wire as wire;
use mio::{Interest, Registry, Token};
use rand::Rng;

use crate::connection::Connection;
use crate::rng::allocate_id;

/// The lobby was full; the socket the caller tried to admit is handed back
/// so it can reply `SERVER_FULL` before dropping it.
pub struct Full(pub mio::net::TcpStream);

/// Result of resolving a `PAIR_ACCEPT` against the current membership.
pub enum TakeForGame {
    /// Both sides were resident; they've been removed from the lobby and
    /// handed back so a game worker can be spawned with them.
    Paired([Connection; 2]),
    /// The requester this accept named is no longer in the lobby — either it
    /// disconnected, or another `PAIR_ACCEPT` resolved against it first in
    /// the same pass. The accepter remains resident and should be told
    /// `ID_NOT_IN_LOBBY`.
    RequesterMissing,
    /// The accepter itself is no longer resident (consumed by an earlier
    /// pairing in the same pass). Nothing to reply to.
    AccepterMissing,
}

/// The shared lobby table: every connection that isn't currently inside a
/// game. Mirrors the original server's `g_lobbyConnections` array plus
/// `g_lobbyMutex`/`g_lobbyEmptyCond`, generalized onto `TokenSlab` so the
/// lobby's own mio registrations survive swap-remove compaction.
pub struct LobbyMembership {
    capacity: usize,
    inner: Mutex<TokenSlab<Connection>>,
    non_empty: Condvar,
}

impl LobbyMembership {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(TokenSlab::with_capacity(capacity)), non_empty: Condvar::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, TokenSlab<Connection>> {
        self.inner.lock().expect("lobby membership mutex poisoned")
    }

    /// Registers a newly-accepted socket with `registry`, assigns it a
    /// fresh id, and sends `NEW_ID` over the wire, all while holding the
    /// membership lock (mirroring the original `lobbyConnectionCtor`
    /// running entirely under `g_lobbyMutex`). Returns the socket back to
    /// the caller inside `Err(Full)` if the lobby is already at capacity,
    /// so the caller can reply `SERVER_FULL` before dropping it.
    pub fn try_admit(
        &self,
        stream: mio::net::TcpStream,
        addr: SocketAddr,
        registry: &Registry,
        rng: &mut impl Rng,
    ) -> Result<u32, Full> {
        let mut stream = stream;
        let mut slab = self.lock();
        if slab.len() >= self.capacity {
            return Err(Full(stream));
        }

        let existing: HashSet<u32> = slab.iter().map(|(_, c)| c.id).collect();
        let id = allocate_id(&existing, rng);

        slab.insert(|token| {
            if let Err(e) = registry.register(&mut stream, token, Interest::READABLE) {
                tracing::warn!(%addr, error = %e, "failed to register new connection with lobby poll group");
            }
            if let Err(e) = chessrelay_net::send_all(&mut stream, wire::message::encode_new_id(id).as_bytes()) {
                tracing::warn!(%addr, error = %e, "failed to send NEW_ID to new connection");
            }
            Connection::new(id, addr, stream)
        });
        drop(slab);
        self.non_empty.notify_one();
        Ok(id)
    }

    /// Blocks until at least one connection is in the lobby, then returns
    /// the locked table. Mirrors waiting on `g_lobbyEmptyCond`.
    pub fn wait_non_empty(&self) -> MutexGuard<'_, TokenSlab<Connection>> {
        let mut slab = self.lock();
        while slab.is_empty() {
            slab = self.non_empty.wait(slab).expect("lobby membership mutex poisoned");
        }
        slab
    }

    /// Non-blocking variant used by the lobby's own poll loop, which needs
    /// to run its pair-request timeout sweep even when nothing is ready to
    /// read.
    pub fn lock_for_poll(&self) -> MutexGuard<'_, TokenSlab<Connection>> {
        self.lock()
    }

    /// Removes and returns the requester's and accepter's connections once a
    /// `PAIR_ACCEPT` has been resolved, deregistering them from `registry` so
    /// the lobby's poll group stops tracking them (ownership is about to move
    /// to a game worker).
    ///
    /// Checks that *both* tokens are still resident before removing either
    /// one: two `PAIR_ACCEPT`s landing in the same poll pass for the same
    /// requester must not have the first one's removal evict the requester
    /// out from under the second, would-be pairing before that second one is
    /// even looked at (the accepter of the losing pairing is still present
    /// and must stay in the lobby, not be dropped along with a half-removed
    /// pair).
    pub fn take_for_game(&self, requester: Token, accepter: Token, registry: &Registry) -> TakeForGame {
        chessrelay_utils::safe_assert!(requester != accepter, "attempted to pair a connection with itself: {:?}", requester);

        let mut slab = self.lock();
        if slab.get(accepter).is_none() {
            // The accepter itself vanished between dispatch and handoff
            // (e.g. it was already consumed as the requester of a different
            // pairing resolved earlier in the same pass). Nobody to reply to.
            return TakeForGame::AccepterMissing;
        }
        if slab.get(requester).is_none() {
            return TakeForGame::RequesterMissing;
        }

        let mut removed = slab.remove_many(&[requester, accepter]);
        drop(slab);
        chessrelay_utils::safe_assert!(removed.len() == 2, "both tokens were confirmed resident but only {} were removed", removed.len());
        for c in &mut removed {
            let _ = registry.deregister(&mut c.stream);
        }
        let second = removed.pop().unwrap();
        let first = removed.pop().unwrap();
        TakeForGame::Paired([first, second])
    }

    /// Sends `bytes` to `token`'s socket if it's still resident. Used to
    /// reply to the loser of a `PAIR_ACCEPT` race after the winning pairing
    /// has already removed the requester it was also aiming for.
    pub fn send_to(&self, token: Token, bytes: &[u8]) -> io::Result<()> {
        let mut slab = self.lock();
        match slab.get_mut(token) {
            Some(conn) => chessrelay_net::send_all(&mut conn.stream, bytes),
            None => Ok(()),
        }
    }

    /// Re-admits a connection returning from a finished game (e.g. after a
    /// declined rematch), registering it fresh with the lobby's poll group.
    /// Hands the connection back on error so the caller can decide what to
    /// do with a socket the lobby has no room for.
    pub fn readmit(&self, mut connection: Connection, registry: &Registry) -> Result<(), Connection> {
        let mut slab = self.lock();
        if slab.len() >= self.capacity {
            return Err(connection);
        }
        connection.pending_pair_request = None;
        slab.insert(|token| {
            if let Err(e) = registry.register(&mut connection.stream, token, Interest::READABLE) {
                tracing::warn!(id = connection.id, error = %e, "failed to reregister returning connection");
            }
            connection
        });
        drop(slab);
        self.non_empty.notify_one();
        Ok(())
    }
}
