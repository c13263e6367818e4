//! End-to-end scenarios driven over real loopback sockets, one server per
//! test bound to an OS-assigned port so tests can run concurrently.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use chessrelay_server::Config;

fn spawn_server(config: Config) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        chessrelay_server::serve(listener, config).unwrap();
    });
    // Give the acceptor thread a moment to reach `accept()`.
    std::thread::sleep(Duration::from_millis(50));
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

fn read_exact_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Reads one full frame (header + payload) off `stream`.
fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let header = read_exact_n(stream, 2);
    let total = header[1] as usize;
    let mut frame = header;
    if total > 2 {
        frame.extend(read_exact_n(stream, total - 2));
    }
    frame
}

fn read_new_id(stream: &mut TcpStream) -> u32 {
    let frame = read_frame(stream);
    assert_eq!(frame[0], 19, "expected NEW_ID");
    assert_eq!(frame[1], 6);
    u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]])
}

fn encode_pair_request(id: u32) -> [u8; 6] {
    let b = id.to_be_bytes();
    [9, 6, b[0], b[1], b[2], b[3]]
}

fn encode_pair_accept(id: u32) -> [u8; 6] {
    let b = id.to_be_bytes();
    [10, 6, b[0], b[1], b[2], b[3]]
}

#[test]
fn s1_assignment() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let a_id = read_new_id(&mut a);
    assert_ne!(a_id, 0);

    let mut b = connect(addr);
    let b_id = read_new_id(&mut b);
    assert_ne!(b_id, a_id);
}

#[test]
fn s2_pair_success_and_s3_relay_a_move() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let a_id = read_new_id(&mut a);
    let mut b = connect(addr);
    let b_id = read_new_id(&mut b);

    a.write_all(&encode_pair_request(b_id)).unwrap();

    let forwarded = read_frame(&mut b);
    assert_eq!(forwarded[0], 9);
    assert_eq!(u32::from_be_bytes([forwarded[2], forwarded[3], forwarded[4], forwarded[5]]), a_id);

    b.write_all(&encode_pair_accept(a_id)).unwrap();

    let complete_a = read_frame(&mut a);
    let complete_b = read_frame(&mut b);
    assert_eq!(complete_a[0], 8);
    assert_eq!(complete_b[0], 8);
    let sides: std::collections::HashSet<u8> = [complete_a[2], complete_b[2]].into_iter().collect();
    assert_eq!(sides, std::collections::HashSet::from([1, 2]), "exactly one white, one black");

    // S3: relay a move byte-for-byte.
    let mv = [1u8, 10, 4, 1, 4, 3, 0, 0, 0, 0];
    a.write_all(&mv).unwrap();
    let received = read_frame(&mut b);
    assert_eq!(received, mv);
}

#[test]
fn s4_self_pair_rejected() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let a_id = read_new_id(&mut a);

    a.write_all(&encode_pair_request(a_id)).unwrap();
    let reply = read_frame(&mut a);
    assert_eq!(reply[0], 14);
    assert_eq!(u32::from_be_bytes([reply[2], reply[3], reply[4], reply[5]]), a_id);

    // A should still be resident: a second request should at least get a
    // response (not a dropped connection).
    a.write_all(&encode_pair_request(0xABCD_EF01)).unwrap();
    let reply2 = read_frame(&mut a);
    assert_eq!(reply2[0], 14);
}

#[test]
fn s5_unknown_id() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let _a_id = read_new_id(&mut a);

    a.write_all(&encode_pair_request(0xFFFF_FFFF)).unwrap();
    let reply = read_frame(&mut a);
    assert_eq!(reply[0], 14);
    assert_eq!(u32::from_be_bytes([reply[2], reply[3], reply[4], reply[5]]), 0xFFFF_FFFF);
}

#[test]
fn s6_peer_close_mid_game() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let a_id = read_new_id(&mut a);
    let mut b = connect(addr);
    let b_id = read_new_id(&mut b);

    a.write_all(&encode_pair_request(b_id)).unwrap();
    let _ = read_frame(&mut b);
    b.write_all(&encode_pair_accept(a_id)).unwrap();
    let _ = read_frame(&mut a);
    let _ = read_frame(&mut b);

    drop(b);

    let notice = read_frame(&mut a);
    assert_eq!(notice[0], 16, "expected OPPONENT_CLOSED_CONNECTION");
}

#[test]
fn s7_rate_limit_then_timeout() {
    let addr = spawn_server(Config::default().with_pair_request_timeout(Duration::from_millis(200)));
    let mut a = connect(addr);
    let _a_id = read_new_id(&mut a);
    let mut b = connect(addr);
    let b_id = read_new_id(&mut b);

    a.write_all(&encode_pair_request(b_id)).unwrap();
    // b's forwarded PAIR_REQUEST is sitting unread; that's fine, a's second
    // request races ahead of any reply.
    a.write_all(&encode_pair_request(b_id)).unwrap();

    let second_reply = read_frame(&mut a);
    assert_eq!(second_reply[0], 18, "expected PAIR_REQUEST_TOO_SOON");

    let timeout_reply = read_frame(&mut a);
    assert_eq!(timeout_reply[0], 12, "expected PAIR_NORESPONSE after the watchdog fires");
}

#[test]
fn s8_server_full() {
    let addr = spawn_server(Config::default().with_lobby_capacity(2));
    let mut a = connect(addr);
    let _ = read_new_id(&mut a);
    let mut b = connect(addr);
    let _ = read_new_id(&mut b);

    let mut c = connect(addr);
    let reply = read_frame(&mut c);
    assert_eq!(reply[0], 13, "expected SERVER_FULL");

    // The connection should be closed right after.
    let mut buf = [0u8; 1];
    let n = c.read(&mut buf).unwrap();
    assert_eq!(n, 0, "server should close the rejected connection");
}

#[test]
fn unpair_returns_both_players_to_the_lobby() {
    let addr = spawn_server(Config::default());
    let mut a = connect(addr);
    let a_id = read_new_id(&mut a);
    let mut b = connect(addr);
    let b_id = read_new_id(&mut b);

    a.write_all(&encode_pair_request(b_id)).unwrap();
    let _ = read_frame(&mut b);
    b.write_all(&encode_pair_accept(a_id)).unwrap();
    let _ = read_frame(&mut a);
    let _ = read_frame(&mut b);

    a.write_all(&[15, 2]).unwrap();
    let echo_a = read_frame(&mut a);
    let echo_b = read_frame(&mut b);
    assert_eq!(echo_a[0], 15);
    assert_eq!(echo_b[0], 15);

    // Both should be back in the lobby: a fresh pair request from A against
    // B should be honored again rather than failing with ID_NOT_IN_LOBBY.
    a.write_all(&encode_pair_request(b_id)).unwrap();
    let forwarded = read_frame(&mut b);
    assert_eq!(forwarded[0], 9);
}
