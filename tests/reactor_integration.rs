//! End-to-end tests against a real `EventLoop`, a real `Acceptor`, and real
//! `127.0.0.1` sockets — the scenarios from the scatter/gather send path and the
//! half-close edge that a fake-socket unit test cannot exercise honestly, since they
//! depend on the kernel actually returning a partial `writev`.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactor_core::{Acceptor, AcceptorConfig, Callbacks, Connection, EventLoop, Registrar, State};

/// Shrinks the kernel send buffer on `fd` so a single `write_vectored` call on a
/// multi-kilobyte payload is forced to return a partial count instead of buffering
/// the whole thing. Mirrors the socket setup `Acceptor::bind` already does with
/// `socket2` for listening sockets, applied here to an already-accepted connection fd.
fn shrink_send_buffer(fd: RawFd, bytes: usize) {
    let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
    sock.set_send_buffer_size(bytes).unwrap();
    std::mem::forget(sock);
}

fn run_until<F: Fn() -> bool>(lp: &EventLoop, done: F, max_turns: usize) {
    for _ in 0..max_turns {
        lp.turn(Some(Duration::from_millis(50))).unwrap();
        if done() {
            return;
        }
    }
    panic!("condition did not become true within {} turns", max_turns);
}

#[test]
fn echo_over_real_sockets_across_two_loop_turns() {
    let lp: Rc<EventLoop> = Rc::new(EventLoop::new().unwrap());

    let received = Arc::new(Mutex::new(Vec::new()));
    let conn_slot: Rc<RefCell<Option<Rc<Connection>>>> = Rc::new(RefCell::new(None));

    let lp_for_accept = lp.clone();
    let conn_slot_for_accept = conn_slot.clone();
    let received_for_accept = received.clone();
    let on_accept: reactor_core::OnAccept = Box::new(move |stream, peer, conn_config| {
        let conn = Connection::new(
            stream,
            peer,
            lp_for_accept.clone() as Rc<dyn Registrar>,
            conn_config,
        );
        let received2 = received_for_accept.clone();
        conn.set_callbacks(Callbacks {
            on_message: Some(Box::new(move |c, data| {
                received2.lock().unwrap().extend_from_slice(data);
                let _ = c.send(data);
                data.len()
            })),
            ..Default::default()
        });
        Connection::register_with_loop(&conn).unwrap();
        conn.fire_on_connect();
        *conn_slot_for_accept.borrow_mut() = Some(conn);
    });

    let acceptor = Acceptor::bind(
        "127.0.0.1:0".parse().unwrap(),
        lp.clone() as Rc<dyn Registrar>,
        &AcceptorConfig::default(),
        on_accept,
    )
    .unwrap();
    let addr = acceptor.local_addr().unwrap();
    Acceptor::register_with_loop(&acceptor).unwrap();

    let mut client = StdTcpStream::connect(addr).unwrap();
    run_until(&lp, || conn_slot.borrow().is_some(), 20);

    client.write_all(b"abc").unwrap();
    client.write_all(b"def").unwrap();

    let mut echoed = [0u8; 6];
    client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut arrived = false;
    for _ in 0..20 {
        lp.turn(Some(Duration::from_millis(50))).unwrap();
        if client.peek(&mut echoed[..1]).is_ok() {
            arrived = true;
            break;
        }
    }
    assert!(arrived, "echoed bytes did not arrive within 20 turns");
    client.set_read_timeout(None).unwrap();
    client.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, b"abcdef");
    assert_eq!(*received.lock().unwrap(), b"abcdef");
}

#[test]
fn partial_send_drains_across_writable_edges() {
    let lp: Rc<EventLoop> = Rc::new(EventLoop::new().unwrap());
    let conn_slot: Rc<RefCell<Option<Rc<Connection>>>> = Rc::new(RefCell::new(None));
    let write_complete = Arc::new(Mutex::new(0u32));

    let lp_for_accept = lp.clone();
    let conn_slot_for_accept = conn_slot.clone();
    let write_complete_for_accept = write_complete.clone();
    let on_accept: reactor_core::OnAccept = Box::new(move |stream, peer, conn_config| {
        shrink_send_buffer(stream.as_raw_fd(), 4096);
        let conn = Connection::new(
            stream,
            peer,
            lp_for_accept.clone() as Rc<dyn Registrar>,
            conn_config,
        );
        let write_complete2 = write_complete_for_accept.clone();
        conn.set_callbacks(Callbacks {
            on_write_complete: Some(Box::new(move |_c| {
                *write_complete2.lock().unwrap() += 1;
            })),
            ..Default::default()
        });
        Connection::register_with_loop(&conn).unwrap();
        *conn_slot_for_accept.borrow_mut() = Some(conn);
    });

    let acceptor = Acceptor::bind(
        "127.0.0.1:0".parse().unwrap(),
        lp.clone() as Rc<dyn Registrar>,
        &AcceptorConfig::default(),
        on_accept,
    )
    .unwrap();
    let addr = acceptor.local_addr().unwrap();
    Acceptor::register_with_loop(&acceptor).unwrap();

    let mut client = StdTcpStream::connect(addr).unwrap();
    run_until(&lp, || conn_slot.borrow().is_some(), 20);

    let payload = vec![7u8; 512 * 1024];
    {
        let conn = conn_slot.borrow().clone().unwrap();
        assert!(conn.send(&payload).unwrap());
    }

    // One turn: the gathered write almost certainly returns a partial count against a
    // 4 KiB kernel send buffer, leaving a remainder queued and write interest armed.
    lp.turn(Some(Duration::from_millis(50))).unwrap();

    let mut total_read = 0usize;
    let mut buf = [0u8; 64 * 1024];
    client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    for _ in 0..200 {
        if total_read >= payload.len() {
            break;
        }
        lp.turn(Some(Duration::from_millis(50))).unwrap();
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => panic!("client read failed: {}", e),
        }
    }

    assert_eq!(total_read, payload.len());
    assert_eq!(*write_complete.lock().unwrap(), 1, "on_write_complete must fire exactly once");
}

#[test]
fn half_close_with_queued_writes_drains_then_disconnects() {
    let lp: Rc<EventLoop> = Rc::new(EventLoop::new().unwrap());
    let conn_slot: Rc<RefCell<Option<Rc<Connection>>>> = Rc::new(RefCell::new(None));
    let disconnected = Arc::new(Mutex::new(false));

    let lp_for_accept = lp.clone();
    let conn_slot_for_accept = conn_slot.clone();
    let disconnected_for_accept = disconnected.clone();
    let on_accept: reactor_core::OnAccept = Box::new(move |stream, peer, conn_config| {
        shrink_send_buffer(stream.as_raw_fd(), 4096);
        let conn = Connection::new(
            stream,
            peer,
            lp_for_accept.clone() as Rc<dyn Registrar>,
            conn_config,
        );
        let disconnected2 = disconnected_for_accept.clone();
        conn.set_callbacks(Callbacks {
            on_message: Some(Box::new(|c, data| {
                // Echo back a much larger reply than the request so the send cannot
                // complete in one write against the shrunk kernel buffer.
                let reply = vec![9u8; 512 * 1024];
                let _ = c.send(&reply);
                data.len()
            })),
            on_disconnect: Some(Box::new(move |_c| {
                *disconnected2.lock().unwrap() = true;
            })),
            ..Default::default()
        });
        Connection::register_with_loop(&conn).unwrap();
        *conn_slot_for_accept.borrow_mut() = Some(conn);
    });

    let acceptor = Acceptor::bind(
        "127.0.0.1:0".parse().unwrap(),
        lp.clone() as Rc<dyn Registrar>,
        &AcceptorConfig::default(),
        on_accept,
    )
    .unwrap();
    let addr = acceptor.local_addr().unwrap();
    Acceptor::register_with_loop(&acceptor).unwrap();

    let mut client = StdTcpStream::connect(addr).unwrap();
    run_until(&lp, || conn_slot.borrow().is_some(), 20);

    client.write_all(b"request").unwrap();
    // Drive the server's read + reply-send turn, then immediately half-close our
    // write side — the server's next read sees EOF while sendBuf is still non-empty,
    // which is the CloseWaitWrite edge.
    lp.turn(Some(Duration::from_millis(50))).unwrap();
    client.shutdown(std::net::Shutdown::Write).unwrap();

    run_until(
        &lp,
        || conn_slot.borrow().as_ref().unwrap().state() == State::CloseWaitWrite,
        20,
    );

    let mut buf = [0u8; 64 * 1024];
    client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut total_read = 0usize;
    for _ in 0..200 {
        if *disconnected.lock().unwrap() {
            break;
        }
        lp.turn(Some(Duration::from_millis(50))).unwrap();
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => panic!("client read failed: {}", e),
        }
    }

    assert_eq!(total_read, 512 * 1024);
    assert!(*disconnected.lock().unwrap(), "on_disconnect must fire once draining finishes");
}
