mod common;

use aqueduct::pid::{
    AccessorData, AccessorKind, Controller, ControllerSchedule, GainUpdate, Pid, PidController, Registration,
    Schedule,
};
use aqueduct::transport::mock::MockHandle;
use aqueduct::transport::Framing;
use aqueduct::SyncError;
use common::mock_session;
use serde_json::{json, Value};

const ID: u64 = 21;

fn signal(kind: AccessorKind, device_id: u64) -> AccessorData {
    AccessorData {
        kind,
        units: 0,
        device_id,
        index: 0,
    }
}

fn fill_pid() -> Pid {
    let mut pid = Pid::new(20.0).with_output_limits(Some(0.0), Some(100.0));
    pid.add_schedule(Schedule::new(
        Controller {
            kp: 10.0,
            kd: 10.0,
            ..Controller::default()
        },
        ControllerSchedule::unconstrained(),
    ));
    pid
}

fn echo(handle: &MockHandle, event: &str, pid: &Pid) {
    handle.reply(event, json!({"controllers": [{"id": ID, "pid": pid}]}));
}

fn created(framing: Framing) -> (PidController, MockHandle) {
    let (session, handle) = mock_session(framing);
    let mut controller = session.pid_controller(
        Some("fill_controller"),
        signal(AccessorKind::Weight, 1),
        signal(AccessorKind::PeristalticRate, 2),
        fill_pid(),
    );
    echo(&handle, "pid_controllers_created", controller.pid());
    assert_eq!(controller.create(), Ok(ID));
    handle.clear_sent();
    (controller, handle)
}

#[test]
fn test_change_parameters_adopts_server_triple() {
    let (mut controller, handle) = created(Framing::Raw);

    let mut server = controller.pid().clone();
    server.schedule[0].controller.kp = 30.0;
    server.schedule[0].controller.kd = 10.0;
    server.schedule[0].controller.ki = 0.0;
    echo(&handle, "pid_controllers_updated", &server);

    let pid = controller.change_parameters(&GainUpdate::new().kp(30.0)).unwrap();
    let gains = &pid.schedule[0].controller;
    assert_eq!((gains.kp, gains.kd, gains.ki), (30.0, 10.0, 0.0));
    assert_eq!(controller.pid(), &server);

    let (_, sent) = handle.sent_events().remove(0);
    let sent_gains = &sent["controllers"][0]["pid"]["schedule"][0];
    assert_eq!(sent_gains["kp"], json!(30.0));
    assert_eq!(sent_gains["kd"], json!(10.0));
}

#[test]
fn test_server_state_replaces_local_merge() {
    let (mut controller, handle) = created(Framing::LengthPrefixed);

    // The server clamps the request and reports a different integral term
    let mut server = controller.pid().clone();
    server.schedule[0].controller.kp = 25.0;
    server.integral_term = 3.5;
    echo(&handle, "pid_controllers_updated", &server);

    controller.change_parameters(&GainUpdate::new().kp(30.0)).unwrap();
    assert_eq!(controller.pid().schedule[0].controller.kp, 25.0);
    assert_eq!(controller.pid().integral_term, 3.5);
}

#[test]
fn test_disable_is_idempotent() {
    let (mut controller, handle) = created(Framing::Raw);
    let disabled = controller.pid().clone();
    echo(&handle, "pid_controllers_updated", &disabled);
    echo(&handle, "pid_controllers_updated", &disabled);

    let first = controller.disable().unwrap().clone();
    let second = controller.disable().unwrap().clone();
    assert_eq!(first, second);
    assert!(!second.enabled);

    let sent: Vec<Value> = handle
        .sent_events()
        .into_iter()
        .map(|(_, payload)| payload["controllers"][0]["pid"]["enabled"].clone())
        .collect();
    assert_eq!(sent, vec![json!(false), json!(false)]);
}

#[test]
fn test_enable_and_clear_integral() {
    let (mut controller, handle) = created(Framing::Raw);
    let mut server = controller.pid().clone();
    server.enabled = true;
    echo(&handle, "pid_controllers_updated", &server);
    assert!(controller.enable().unwrap().enabled);

    server.integral_term = 0.0;
    echo(&handle, "pid_controllers_updated", &server);
    controller.clear_integral().unwrap();

    let sent = handle.sent_events();
    assert_eq!(sent[0].1["controllers"][0]["pid"]["enabled"], json!(true));
    assert_eq!(sent[1].1["controllers"][0]["pid"]["integral_term"], json!(0.0));
}

#[test]
fn test_per_schedule_change_touches_one_schedule() {
    let (mut controller, handle) = created(Framing::Raw);
    controller.pid_mut().add_schedule(Schedule::default());
    let mut server = controller.pid().clone();
    server.schedule[1].controller.dead_zone = Some(0.5);
    echo(&handle, "pid_controllers_updated", &server);

    controller
        .change_schedule_parameters(1, &GainUpdate::new().dead_zone(Some(0.5)))
        .unwrap();

    let (_, sent) = handle.sent_events().remove(0);
    let schedules = &sent["controllers"][0]["pid"]["schedule"];
    assert_eq!(schedules[0]["dead_zone"], Value::Null);
    assert_eq!(schedules[1]["dead_zone"], json!(0.5));
}

#[test]
fn test_unanswered_update_keeps_local_state() {
    let (mut controller, handle) = created(Framing::Raw);
    let before = controller.pid().clone();

    let err = controller.change_setpoint(40.0, true).unwrap_err();
    assert_eq!(
        err,
        SyncError::NoResponse {
            event: "pid_controllers_updated".to_string(),
            attempts: 3
        }
    );
    assert_eq!(controller.pid(), &before);
    assert_eq!(handle.sent().len(), 3);
}

#[test]
fn test_delete_then_update_fails() {
    let (mut controller, handle) = created(Framing::Raw);
    handle.reply("pid_controllers_deleted", json!({"ids": [ID]}));

    controller.delete().unwrap();
    assert_eq!(controller.registration(), Registration::Deleted(ID));
    assert_eq!(controller.id(), None);
    assert_eq!(handle.sent_events()[0], ("delete_pid_controllers".to_string(), json!({"ids": [ID]})));

    handle.clear_sent();
    assert_eq!(controller.enable().unwrap_err(), SyncError::Deleted(ID));
    assert_eq!(controller.delete().unwrap_err(), SyncError::Deleted(ID));
    assert!(handle.sent().is_empty());
}

#[test]
fn test_schedule_selection() {
    let mut pid = Pid::new(0.0);
    pid.add_schedule(Schedule::new(
        Controller {
            kp: 1.0,
            ..Controller::default()
        },
        ControllerSchedule {
            error: Some((-50.0, 50.0)),
            ..ControllerSchedule::default()
        },
    ))
    .add_schedule(Schedule::new(
        Controller {
            kp: 2.0,
            ..Controller::default()
        },
        ControllerSchedule::unconstrained(),
    ));

    assert_eq!(pid.active_schedule(0.0, 0.0, 0.0).map(|s| s.controller.kp), Some(1.0));
    assert_eq!(pid.active_schedule(0.0, 1000.0, 0.0).map(|s| s.controller.kp), Some(2.0));
}
