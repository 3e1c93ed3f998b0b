//! Shared fixtures for integration tests.
#![allow(dead_code)]

use aqueduct::device::{Device, DeviceDescriptor};
use aqueduct::transport::mock::{MockHandle, MockLink};
use aqueduct::transport::{Framing, RequestOptions, Transport, TransportSettings};
use aqueduct::{ClientConfig, Session};
use serde_json::{json, Value};

pub const USER: &str = "bench";

pub fn setup_entry(device_id: u64, interface: u8, channels: usize) -> Value {
    json!({
        "base": {
            "user_id": USER,
            "device_id": device_id,
            "name": format!("DEV{device_id}"),
            "type": "PP",
            "interface": interface,
        },
        "live": vec![json!({}); channels],
    })
}

pub fn mock_session(framing: Framing) -> (Session, MockHandle) {
    let link = MockLink::with_framing(framing);
    let handle = link.handle();
    let mut config = ClientConfig::default();
    config.server.user_id = USER.to_string();
    config.transport.framing = framing;
    config.transport.max_attempts = 3;
    config.transport.socket_delay_ms = 0;
    config.pid.sync_attempts = 3;
    let transport = Transport::from_link(link, TransportSettings::from(&config.transport));
    (Session::from_transport(config, transport), handle)
}

pub fn mock_device(device_id: u64, interface: u8, channels: usize) -> (Device, MockHandle) {
    let (session, handle) = mock_session(Framing::Raw);
    let descriptor = DeviceDescriptor::from_setup_entry(&setup_entry(device_id, interface, channels))
        .expect("valid setup entry");
    let mut device = session.device(descriptor);
    device.set_command_delay(std::time::Duration::ZERO);
    device.set_request_options(RequestOptions::default().with_attempts(3));
    (device, handle)
}
