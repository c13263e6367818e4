use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// The port the original chess server listened on; kept as the default so
/// an unconfigured run behaves the way it always has.
const DEFAULT_PORT: u16 = 42069;

/// Runtime configuration, built with `with_*` setters over a sensible
/// default the way `TcpConnector` is configured in the teacher crate.
#[derive(Debug, Clone)]
pub struct Config {
    bind_addr: SocketAddr,
    lobby_capacity: usize,
    pair_request_timeout: Duration,
    lobby_poll_timeout: Duration,
    game_poll_timeout: Duration,
    error_log_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            lobby_capacity: 50,
            pair_request_timeout: Duration::from_secs(10),
            lobby_poll_timeout: Duration::from_micros(20),
            game_poll_timeout: Duration::from_micros(10),
            error_log_path: PathBuf::from("errorLog.txt"),
        }
    }
}

impl Config {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_lobby_capacity(mut self, cap: usize) -> Self {
        self.lobby_capacity = cap;
        self
    }

    pub fn with_pair_request_timeout(mut self, timeout: Duration) -> Self {
        self.pair_request_timeout = timeout;
        self
    }

    pub fn with_lobby_poll_timeout(mut self, timeout: Duration) -> Self {
        self.lobby_poll_timeout = timeout;
        self
    }

    pub fn with_game_poll_timeout(mut self, timeout: Duration) -> Self {
        self.game_poll_timeout = timeout;
        self
    }

    pub fn with_error_log_path(mut self, path: PathBuf) -> Self {
        self.error_log_path = path;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn lobby_capacity(&self) -> usize {
        self.lobby_capacity
    }

    pub fn pair_request_timeout(&self) -> Duration {
        self.pair_request_timeout
    }

    pub fn lobby_poll_timeout(&self) -> Duration {
        self.lobby_poll_timeout
    }

    pub fn game_poll_timeout(&self) -> Duration {
        self.game_poll_timeout
    }

    pub fn error_log_path(&self) -> &std::path::Path {
        &self.error_log_path
    }
}
