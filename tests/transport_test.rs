use aqueduct::transport::mock::MockLink;
use aqueduct::transport::{Event, Framing, Message, RequestOptions, Transport, TransportSettings};
use serde_json::json;
use std::thread;
use std::time::Duration;

fn options(max_attempts: u32) -> RequestOptions {
    RequestOptions::default()
        .with_attempts(max_attempts)
        .with_delay(Duration::ZERO)
}

fn live_request() -> Message {
    Message::new(Event::GetDeviceLive, &json!({"user_id": "bench", "device_id": 1})).unwrap()
}

#[test]
fn test_matching_reply_on_third_attempt() {
    let link = MockLink::new();
    let handle = link.handle();
    handle.reply("device_action", json!({"v": 1}));
    handle.reply("pid_controllers_updated", json!({"v": 2}));
    handle.reply("get_device_live", json!({"v": 42}));

    let transport = Transport::from_link(link, TransportSettings::default());
    let payload = transport.send_and_wait(&live_request(), Event::GetDeviceLive, &options(3));

    assert_eq!(payload, Some(json!({"v": 42})));
    assert_eq!(handle.sent().len(), 3);
}

#[test]
fn test_all_attempts_mismatch_returns_none() {
    let link = MockLink::new();
    let handle = link.handle();
    for _ in 0..3 {
        handle.reply("device_action", json!({"v": 1}));
    }
    // A matching reply that would only arrive on a fourth attempt
    handle.reply("get_device_live", json!({"v": 42}));

    let transport = Transport::from_link(link, TransportSettings::default());
    let payload = transport.send_and_wait(&live_request(), Event::GetDeviceLive, &options(3));

    assert_eq!(payload, None);
    assert_eq!(handle.sent().len(), 3);
    assert_eq!(handle.remaining(), 1);
}

#[test]
fn test_decode_failures_and_timeouts_consume_attempts() {
    let link = MockLink::new();
    let handle = link.handle();
    handle.reply_raw(b"[\"get_device_live\", {truncated".to_vec());
    handle.silence();
    handle.reply("get_device_live", "{\"live\": []}".into());

    let transport = Transport::from_link(link, TransportSettings::default());
    let payload = transport.send_and_wait(&live_request(), Event::GetDeviceLive, &options(3));

    // The last payload arrived as an encoded string and is decoded again
    assert_eq!(payload, Some(json!({"live": []})));
}

#[test]
fn test_length_prefixed_round_trip() {
    let link = MockLink::with_framing(Framing::LengthPrefixed);
    let handle = link.handle();
    handle.reply("device_action", json!({"ok": true}));

    let settings = TransportSettings {
        framing: Framing::LengthPrefixed,
        recv_buffer_bytes: 4096,
    };
    let transport = Transport::from_link(link, settings);
    let msg = Message::new(Event::DeviceAction, &json!({"action": "stop"})).unwrap();

    assert_eq!(
        transport.send_and_wait(&msg, Event::DeviceAction, &options(1)),
        Some(json!({"ok": true}))
    );
    assert_eq!(
        handle.sent_events(),
        vec![("device_action".to_string(), json!({"action": "stop"}))]
    );
}

#[test]
fn test_concurrent_callers_share_one_connection() {
    let link = MockLink::new();
    let handle = link.handle();
    const CALLERS: usize = 8;
    for _ in 0..CALLERS {
        handle.reply("device_action", json!({"ok": true}));
    }

    let transport = Transport::from_link(link, TransportSettings::default());
    let workers: Vec<_> = (0..CALLERS)
        .map(|i| {
            let transport = transport.clone();
            thread::spawn(move || {
                let msg = Message::new(Event::DeviceAction, &json!({"device_id": i})).unwrap();
                transport.send_and_wait(&msg, Event::DeviceAction, &options(1))
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), Some(json!({"ok": true})));
    }
    // Every request got exactly one reply, so no exchange overlapped another
    assert_eq!(handle.sent().len(), CALLERS);
    assert_eq!(handle.remaining(), 0);
}

#[test]
fn test_connect_fails_without_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = aqueduct::ClientConfig::default();
    config.server.port = port;
    config.server.connect_timeout_ms = 200;
    assert!(Transport::connect(&config).is_err());
}
