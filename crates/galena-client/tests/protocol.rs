//! End-to-end protocol scenarios against a scripted fake server.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use galena_client::{modules, BindRequest, Client, ClientEvent, CommandResult};
use galena_proto::{
    Color, CoreBindReply, CoreBindRequest, CoreRunCommandRequest, CoreTextFragment,
    CoreTextNotification, EmptyMessage, IntMessage,
};
use prost::Message;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Spawns a one-connection server running the given script.
fn spawn_server(script: impl FnOnce(TcpStream) + Send + 'static) -> (u16, JoinHandle<()>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(EVENT_TIMEOUT))
            .expect("read timeout");
        script(stream);
    });
    (port, handle)
}

/// Reads the client handshake and answers with the reply magic.
fn accept_handshake(stream: &mut TcpStream) {
    let mut buf = [0u8; 12];
    stream.read_exact(&mut buf).expect("handshake request");
    assert_eq!(&buf[..8], b"DFHack?\n");
    assert_eq!(i32::from_le_bytes(buf[8..12].try_into().unwrap()), 1);

    stream.write_all(b"DFHack!\n").expect("handshake magic");
    stream
        .write_all(&1i32.to_le_bytes())
        .expect("handshake version");
}

fn read_header(stream: &mut TcpStream) -> (i16, i32) {
    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf).expect("header");
    (
        i16::from_le_bytes(buf[0..2].try_into().unwrap()),
        i32::from_le_bytes(buf[2..6].try_into().unwrap()),
    )
}

/// Reads one request frame (header + payload).
fn read_request(stream: &mut TcpStream) -> (i16, Vec<u8>) {
    let (id, size) = read_header(stream);
    let mut payload = vec![0u8; size as usize];
    stream.read_exact(&mut payload).expect("payload");
    (id, payload)
}

fn write_header(stream: &mut TcpStream, id: i16, size: i32) {
    stream.write_all(&id.to_le_bytes()).expect("header id");
    stream.write_all(&size.to_le_bytes()).expect("header size");
}

/// Writes a result frame (id -1) carrying an encoded message.
fn write_result(stream: &mut TcpStream, message: &impl Message) {
    let payload = message.encode_to_vec();
    write_header(stream, -1, payload.len() as i32);
    stream.write_all(&payload).expect("result payload");
}

/// Writes a text frame (id -3) with the given (text, color) fragments.
fn write_text(stream: &mut TcpStream, fragments: &[(&str, i32)]) {
    let text = CoreTextNotification {
        fragments: fragments
            .iter()
            .map(|(text, color)| CoreTextFragment {
                text: Some((*text).to_string()),
                color: Some(*color),
            })
            .collect(),
    };
    let payload = text.encode_to_vec();
    write_header(stream, -3, payload.len() as i32);
    stream.write_all(&payload).expect("text payload");
}

/// Writes a failure frame (id -2) whose size field is the result code.
fn write_fail(stream: &mut TcpStream, code: i32) {
    write_header(stream, -2, code);
}

fn wait_for_disconnect_event(events: &std::sync::mpsc::Receiver<ClientEvent>) {
    loop {
        match events.recv_timeout(EVENT_TIMEOUT).expect("client event") {
            ClientEvent::ConnectionChanged(false) => return,
            _ => continue,
        }
    }
}

#[test]
fn connect_bind_call() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, payload) = read_request(&mut stream);
        assert_eq!(id, 0);
        let request = CoreBindRequest::decode(&payload[..]).expect("bind request");
        assert_eq!(request.method, "CoreSuspend");
        assert_eq!(request.input_msg, "dfproto.EmptyMessage");
        assert_eq!(request.output_msg, "dfproto.IntMessage");
        write_result(&mut stream, &CoreBindReply { assigned_id: 7 });

        let (id, payload) = read_request(&mut stream);
        assert_eq!(id, 7);
        assert!(payload.is_empty());
        write_result(&mut stream, &IntMessage { value: 1 });
    });

    let client = Client::new().expect("client");
    assert!(client.connect("127.0.0.1", port).wait());

    let suspend = modules::core::suspend(&client);
    assert!(suspend.bind().wait());

    let (handle, _notifications) = suspend.call(&EmptyMessage {});
    let reply = handle.wait();
    assert_eq!(reply.result, CommandResult::Ok);
    assert_eq!(reply.output.expect("output").value, 1);

    server.join().unwrap();
}

#[test]
fn text_fragments_before_result() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, payload) = read_request(&mut stream);
        assert_eq!(id, 1);
        let request = CoreRunCommandRequest::decode(&payload[..]).expect("run request");
        assert_eq!(request.command, "ls");

        write_text(&mut stream, &[("listing", Color::Green.as_i32())]);
        write_text(&mut stream, &[("done", Color::White.as_i32())]);
        write_result(&mut stream, &EmptyMessage {});
    });

    let client = Client::new().expect("client");
    assert!(client.connect("127.0.0.1", port).wait());

    let run_command = modules::core::run_command(&client);
    let (handle, notifications) = run_command.call(&CoreRunCommandRequest {
        command: "ls".to_string(),
        arguments: Vec::new(),
    });

    let reply = handle.wait();
    assert_eq!(reply.result, CommandResult::Ok);

    // The stream is already closed: it drains in order, then ends.
    let notes: Vec<_> = notifications.into_iter().collect();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].text, "listing");
    assert_eq!(notes[0].color, Color::Green);
    assert_eq!(notes[1].text, "done");
    assert_eq!(notes[1].color, Color::White);

    server.join().unwrap();
}

#[test]
fn server_reported_failure_keeps_link_usable() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, _) = read_request(&mut stream);
        assert_eq!(id, 1);
        write_fail(&mut stream, 2);

        // The link stays Ready: the next call goes through normally.
        let (id, _) = read_request(&mut stream);
        assert_eq!(id, 1);
        write_result(&mut stream, &EmptyMessage {});
    });

    let client = Client::new().expect("client");
    assert!(client.connect("127.0.0.1", port).wait());

    let run_command = modules::core::run_command(&client);
    let request = CoreRunCommandRequest {
        command: "nonsense".to_string(),
        arguments: Vec::new(),
    };

    let (handle, _notes) = run_command.call(&request);
    let reply = handle.wait();
    assert_eq!(reply.result, CommandResult::WrongUsage);
    assert!(reply.output.is_none());

    let (handle, _notes) = run_command.call(&request);
    assert_eq!(handle.wait().result, CommandResult::Ok);

    server.join().unwrap();
}

#[test]
fn disconnect_mid_queue_cancels_remaining_calls() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, _) = read_request(&mut stream);
        assert_eq!(id, 0);
        write_result(&mut stream, &CoreBindReply { assigned_id: 7 });

        let (id, _) = read_request(&mut stream);
        assert_eq!(id, 7);
        write_result(&mut stream, &IntMessage { value: 1 });

        // Close with two calls still queued on the client.
        drop(stream);
    });

    let client = Client::new().expect("client");
    let events = client.subscribe();
    assert!(client.connect("127.0.0.1", port).wait());

    let suspend = modules::core::suspend(&client);
    let bind = suspend.bind();
    assert!(bind.wait());

    let (first, _n1) = suspend.call(&EmptyMessage {});
    let (second, _n2) = suspend.call(&EmptyMessage {});
    let (third, _n3) = suspend.call(&EmptyMessage {});

    assert_eq!(first.wait().result, CommandResult::Ok);
    assert_eq!(second.wait().result, CommandResult::LinkFailure);
    assert_eq!(third.wait().result, CommandResult::LinkFailure);

    wait_for_disconnect_event(&events);
    // Every cached binding was invalidated by the disconnect.
    assert!(!bind.is_bound());

    server.join().unwrap();
}

#[test]
fn concurrent_bind_requests_coalesce() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, payload) = read_request(&mut stream);
        assert_eq!(id, 0);
        let request = CoreBindRequest::decode(&payload[..]).expect("bind request");
        assert_eq!(request.method, "CoreResume");

        // Let both lookups land before the reply.
        thread::sleep(Duration::from_millis(100));
        write_result(&mut stream, &CoreBindReply { assigned_id: 9 });

        // The only further frame on the wire is the quit request issued by
        // the client on drop: the repeated lookups were served from cache.
        let (id, size) = read_header(&mut stream);
        assert_eq!(id, -4);
        assert_eq!(size, 0);
    });

    let client = Client::new().expect("client");
    assert!(client.connect("127.0.0.1", port).wait());

    let request = BindRequest::new(
        "",
        "CoreResume",
        "dfproto.EmptyMessage",
        "dfproto.IntMessage",
    );
    let first = client.get_binding(&request);
    let second = client.get_binding(&request);
    assert!(Arc::ptr_eq(&first, &second));

    assert!(first.wait());
    assert!(second.wait());
    assert_eq!(first.assigned_id(), Some(9));
    assert_eq!(second.assigned_id(), Some(9));

    // A lookup after resolution is also served from cache.
    let third = client.get_binding(&request);
    assert!(Arc::ptr_eq(&first, &third));

    drop(client);
    server.join().unwrap();
}

#[test]
fn oversize_reply_tears_down_link() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, _) = read_request(&mut stream);
        assert_eq!(id, 1);

        // 256 MiB, four times the protocol maximum.
        write_header(&mut stream, -1, 0x1000_0000);

        // Wait for the client to drop the connection.
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let client = Client::new().expect("client");
    let events = client.subscribe();
    assert!(client.connect("127.0.0.1", port).wait());

    let run_command = modules::core::run_command(&client);
    let (handle, _notes) = run_command.call(&CoreRunCommandRequest {
        command: "ls".to_string(),
        arguments: Vec::new(),
    });

    assert_eq!(handle.wait().result, CommandResult::LinkFailure);
    wait_for_disconnect_event(&events);

    server.join().unwrap();
}

#[test]
fn handshake_mismatch_fails_connect() {
    let (port, server) = spawn_server(|mut stream| {
        let mut buf = [0u8; 12];
        stream.read_exact(&mut buf).expect("handshake request");

        stream.write_all(b"DFHacX!\n").expect("bad magic");
        stream.write_all(&1i32.to_le_bytes()).expect("version");
    });

    let client = Client::new().expect("client");
    let events = client.subscribe();
    assert!(!client.connect("127.0.0.1", port).wait());

    // A socket-error event describes the rejected handshake.
    let saw_error = loop {
        match events.recv_timeout(EVENT_TIMEOUT) {
            Ok(ClientEvent::SocketError { kind, .. }) => {
                assert_eq!(kind, ErrorKind::InvalidData);
                break true;
            }
            Ok(_) => continue,
            Err(_) => break false,
        }
    };
    assert!(saw_error);

    server.join().unwrap();
}

#[test]
fn clean_disconnect_sends_quit() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        let (id, size) = read_header(&mut stream);
        assert_eq!(id, -4);
        assert_eq!(size, 0);

        // The server answers a quit by closing the connection.
        drop(stream);
    });

    let client = Client::new().expect("client");
    let events = client.subscribe();
    assert!(client.connect("127.0.0.1", port).wait());

    client.disconnect().wait();
    wait_for_disconnect_event(&events);

    server.join().unwrap();
}

#[test]
fn calls_are_served_fifo() {
    let (port, server) = spawn_server(|mut stream| {
        accept_handshake(&mut stream);

        // Replies strictly follow request order; payloads echo back a
        // per-request value so the client can check pairing.
        for expected in 0..3 {
            let (id, payload) = read_request(&mut stream);
            assert_eq!(id, 1);
            let request = CoreRunCommandRequest::decode(&payload[..]).expect("request");
            assert_eq!(request.command, format!("cmd-{expected}"));
            write_text(&mut stream, &[(request.command.as_str(), 7)]);
            write_result(&mut stream, &EmptyMessage {});
        }
    });

    let client = Client::new().expect("client");
    assert!(client.connect("127.0.0.1", port).wait());

    let run_command = modules::core::run_command(&client);
    let handles: Vec<_> = (0..3)
        .map(|i| {
            run_command.call(&CoreRunCommandRequest {
                command: format!("cmd-{i}"),
                arguments: Vec::new(),
            })
        })
        .collect();

    for (i, (handle, notifications)) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().result, CommandResult::Ok);
        let notes: Vec<_> = notifications.into_iter().collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, format!("cmd-{i}"));
    }

    server.join().unwrap();
}
