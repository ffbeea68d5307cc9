#![cfg(feature = "overlay")]

use chatpoints_core::command::{ChatCommand, Platform};
use chatpoints_core::host::MemoryHost;
use chatpoints_core::overlay::{etag, start_overlay_server, OverlayBoard};
use chatpoints_core::scripts::DonateScript;
use chatpoints_core::settings::DonateSettings;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

fn get(addr: SocketAddr, path: &str) -> (String, String, String) {
    let mut stream = TcpStream::connect(addr).expect("connect overlay");
    let req = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    stream.write_all(req.as_bytes()).expect("write request");
    let mut resp = String::new();
    stream.read_to_string(&mut resp).expect("read response");
    let (head, body) = resp.split_once("\r\n\r\n").expect("http response");
    let status = head.lines().next().unwrap_or("").to_string();
    let tag = head
        .lines()
        .find_map(|l| l.strip_prefix("ETag: "))
        .unwrap_or("")
        .to_string();
    (status, tag, body.to_string())
}

#[test]
fn donation_progress_is_served_to_overlays() {
    let board = OverlayBoard::new();
    let addr = start_overlay_server("127.0.0.1:0", board.clone()).expect("bind overlay");

    let mut host = MemoryHost::new("coins");
    host.set_event_listener(board.listener());
    host.register("Ann", 1_000);
    let script = DonateScript::new(DonateSettings {
        donate_goal: 200,
        ..DonateSettings::default()
    });
    script.handle(
        &ChatCommand::parse("Ann", "!donate 50", Platform::Stream, false),
        &mut host,
    );

    let (status, tag, body) = get(addr, "/events/EVENT_DONATION");
    assert_eq!(status, "HTTP/1.1 200 OK");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["progress"], 25);
    assert_eq!(json["value"], 50);
    assert_eq!(tag, etag(&body));

    let (status, _, body) = get(addr, "/events");
    assert_eq!(status, "HTTP/1.1 200 OK");
    let all: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(all["EVENT_DONATION"]["goal"], 200);
}

#[test]
fn unknown_paths_are_not_found() {
    let addr = start_overlay_server("127.0.0.1:0", OverlayBoard::new()).expect("bind overlay");
    let (status, _, _) = get(addr, "/events/EVENT_NOPE");
    assert_eq!(status, "HTTP/1.1 404 Not Found");
    let (status, _, _) = get(addr, "/tip");
    assert_eq!(status, "HTTP/1.1 404 Not Found");
}
