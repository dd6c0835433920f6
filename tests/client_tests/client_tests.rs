//! Client Tests
//!
//! Runs the client against scripted fake servers to check reply
//! correlation, framing of replies and connection teardown.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use respkv::protocol::{FrameBuffer, RespValue};
use respkv::{Client, Config, KvError};

// =============================================================================
// Helper Functions
// =============================================================================

/// Accept one connection and hand it to `script`
fn fake_server<F>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream);
    });
    (addr, handle)
}

/// Read exactly `count` request frames
fn read_requests(stream: &mut TcpStream, count: usize) -> Vec<RespValue> {
    let mut frames = FrameBuffer::new();
    let mut requests = Vec::new();
    let mut chunk = [0u8; 1024];

    while requests.len() < count {
        while let Some(frame) = frames.next_frame().unwrap() {
            requests.push(frame);
        }
        if requests.len() >= count {
            break;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "client closed early");
        frames.extend(&chunk[..n]);
    }
    requests
}

/// Block until the client hangs up
fn wait_for_eof(stream: &mut TcpStream) {
    let mut chunk = [0u8; 1024];
    while let Ok(n) = stream.read(&mut chunk) {
        if n == 0 {
            break;
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

fn connection_reason(result: respkv::Result<RespValue>) -> String {
    match result {
        Err(KvError::Connection(reason)) => reason,
        other => panic!("Expected connection error, got {:?}", other),
    }
}

// =============================================================================
// Reply Correlation Tests
// =============================================================================

#[test]
fn test_pipelined_replies_in_one_write() {
    let (addr, server) = fake_server(|mut stream| {
        let requests = read_requests(&mut stream, 3);
        assert_eq!(requests[0], RespValue::command(["PING", "a"]));
        assert_eq!(requests[2], RespValue::command(["PING", "c"]));
        stream.write_all(b"+a\r\n+b\r\n+c\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    let a = client.send(["PING", "a"]).unwrap();
    let b = client.send(["PING", "b"]).unwrap();
    let c = client.send(["PING", "c"]).unwrap();

    // Waiting out of order still yields each request its own reply
    assert_eq!(c.wait().unwrap(), RespValue::simple("c"));
    assert_eq!(a.wait().unwrap(), RespValue::simple("a"));
    assert_eq!(b.wait().unwrap(), RespValue::simple("b"));
    assert_eq!(client.pending_len(), 0);

    client.close();
    server.join().unwrap();
}

#[test]
fn test_reply_split_into_single_bytes() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        for byte in b"$5\r\nhello\r\n" {
            stream.write_all(std::slice::from_ref(byte)).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    assert_eq!(client.get("k").unwrap(), Some("hello".to_string()));

    client.close();
    server.join().unwrap();
}

#[test]
fn test_typed_helpers() {
    let (addr, server) = fake_server(|mut stream| {
        let requests = read_requests(&mut stream, 5);
        assert_eq!(requests[1], RespValue::command(["SET", "k", "v"]));
        stream
            .write_all(b"+PONG\r\n+OK\r\n$1\r\nv\r\n$-1\r\n:1\r\n")
            .unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    let handles = vec![
        client.send(["PING"]).unwrap(),
        client.send(["SET", "k", "v"]).unwrap(),
        client.send(["GET", "k"]).unwrap(),
        client.send(["GET", "missing"]).unwrap(),
        client.send(["DEL", "k"]).unwrap(),
    ];
    let replies: Vec<RespValue> = handles.into_iter().map(|h| h.wait().unwrap()).collect();

    assert_eq!(
        replies,
        vec![
            RespValue::simple("PONG"),
            RespValue::ok(),
            RespValue::bulk(b"v"),
            RespValue::null_bulk(),
            RespValue::Integer(1),
        ]
    );

    client.close();
    server.join().unwrap();
}

#[test]
fn test_unsolicited_reply_is_dropped() {
    let (addr, server) = fake_server(|mut stream| {
        stream.write_all(b"+hello\r\n").unwrap();
        read_requests(&mut stream, 1);
        stream.write_all(b"+PONG\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(client.ping(None).unwrap(), "PONG");

    client.close();
    server.join().unwrap();
}

// =============================================================================
// Error Reply Tests
// =============================================================================

#[test]
fn test_error_reply_is_server_error() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 2);
        stream.write_all(b"-ERR boom\r\n+OK\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    let failing = client.send(["GET", "k"]).unwrap();
    let next = client.send(["SET", "k", "v"]).unwrap();

    match failing.wait() {
        Err(KvError::Server(message)) => assert_eq!(message, "ERR boom"),
        other => panic!("Expected server error, got {:?}", other),
    }
    // The connection stays usable after an error reply
    assert_eq!(next.wait().unwrap(), RespValue::ok());
    assert!(client.is_open());

    client.close();
    server.join().unwrap();
}

#[test]
fn test_unexpected_reply_type() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        stream.write_all(b":1\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    assert!(matches!(client.get("k"), Err(KvError::Protocol(_))));

    client.close();
    server.join().unwrap();
}

#[test]
fn test_unparseable_reply_closes_connection() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        stream.write_all(b"%nope\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    assert!(matches!(client.call(["PING"]), Err(KvError::Protocol(_))));

    wait_until(|| !client.is_open());
    let reason = connection_reason(client.call(["PING"]));
    assert!(reason.starts_with("unparseable reply"), "{}", reason);

    client.close();
    server.join().unwrap();
}

// =============================================================================
// Connection Teardown Tests
// =============================================================================

#[test]
fn test_idle_timeout_rejects_pending() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        // Never reply
        wait_for_eof(&mut stream);
    });

    let config = Config::builder().idle_timeout_ms(200).build();
    let client = Client::connect_with(&addr, &config).unwrap();

    let started = Instant::now();
    assert_eq!(connection_reason(client.call(["PING"])), "idle timeout");
    assert!(started.elapsed() >= Duration::from_millis(150));

    wait_until(|| !client.is_open());
    assert_eq!(client.pending_len(), 0);

    server.join().unwrap();
}

#[test]
fn test_outbound_request_resets_idle_timeout() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        thread::sleep(Duration::from_millis(80));
        stream.write_all(b"+PONG\r\n").unwrap();
        wait_for_eof(&mut stream);
    });

    let config = Config::builder().idle_timeout_ms(300).build();
    let client = Client::connect_with(&addr, &config).unwrap();

    // The request goes out shortly before the inbound-only deadline; the
    // reply lands after it
    thread::sleep(Duration::from_millis(250));
    assert_eq!(client.ping(None).unwrap(), "PONG");
    assert!(client.is_open());

    client.close();
    server.join().unwrap();
}

#[test]
fn test_set_idle_timeout() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        stream.write_all(b"+PONG\r\n").unwrap();
        read_requests(&mut stream, 1);
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    assert!(matches!(
        client.set_idle_timeout(Some(Duration::ZERO)),
        Err(KvError::Config(_))
    ));

    // The new timeout applies from the next read on, i.e. after PONG
    client.set_idle_timeout(Some(Duration::from_millis(100))).unwrap();
    assert_eq!(client.ping(None).unwrap(), "PONG");
    assert_eq!(connection_reason(client.call(["PING"])), "idle timeout");

    server.join().unwrap();
}

#[test]
fn test_server_close_rejects_pending() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 1);
        drop(stream);
    });

    let client = Client::connect(&addr).unwrap();
    assert_eq!(
        connection_reason(client.call(["GET", "k"])),
        "connection closed by server"
    );

    server.join().unwrap();
    wait_until(|| !client.is_open());
    assert!(matches!(client.call(["PING"]), Err(KvError::Connection(_))));
}

#[test]
fn test_close_rejects_pending() {
    let (addr, server) = fake_server(|mut stream| {
        read_requests(&mut stream, 2);
        wait_for_eof(&mut stream);
    });

    let client = Client::connect(&addr).unwrap();
    let first = client.send(["GET", "a"]).unwrap();
    let second = client.send(["GET", "b"]).unwrap();
    assert_eq!(client.pending_len(), 2);

    client.close();
    assert!(!client.is_open());

    assert_eq!(connection_reason(first.wait()), "connection closed by client");
    assert_eq!(connection_reason(second.wait()), "connection closed by client");
    assert!(matches!(client.send(["PING"]), Err(KvError::Connection(_))));

    // Closing twice is harmless
    client.close();
    server.join().unwrap();
}

#[test]
fn test_backpressure() {
    let (addr, server) = fake_server(|mut stream| {
        wait_for_eof(&mut stream);
    });

    let config = Config::builder().max_pending_requests(2).build();
    let client = Client::connect_with(&addr, &config).unwrap();

    let _first = client.send(["PING"]).unwrap();
    let _second = client.send(["PING"]).unwrap();
    assert!(matches!(
        client.send(["PING"]),
        Err(KvError::Backpressure { capacity: 2 })
    ));
    assert_eq!(client.pending_len(), 2);
    assert!(client.is_open());

    client.close();
    server.join().unwrap();
}

#[test]
fn test_connect_refused() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    assert!(matches!(
        Client::connect(&addr),
        Err(KvError::Connection(_))
    ));
}
