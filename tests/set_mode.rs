mod common;

use chrono::{TimeZone, Utc};
use nextion_bridge::bus::{Delta, MemoryBus};
use nextion_bridge::model::{
    DeviceModel, Fallback, Item, ItemKind, Mode, ModeCommands, ModeValues, Page, Theme,
    POSITION_PATH,
};
use nextion_bridge::nextion::PanelEvent;
use nextion_bridge::session::SessionSettings;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

fn global_theme() -> Theme {
    let mut color_vars = BTreeMap::new();
    color_vars.insert("Battery.textColor".to_string(), ModeValues::new(65535, 55296));
    color_vars.insert("Anchor.bco".to_string(), ModeValues::new(0, 10));
    Theme {
        color_vars,
        mode_commands: Some(ModeCommands::fixed(ModeValues::new(
            vec!["Weather.Weather.pic=0".to_string()],
            vec!["Weather.Weather.pic=14".to_string()],
        ))),
    }
}

fn device_model() -> DeviceModel {
    let mut model = DeviceModel::new().page(
        1,
        Page::new().item(
            Item::new("icon", ItemKind::Picture, "nothing.here").with_unknown(Fallback::computed(
                |ctx| match ctx.mode {
                    Some(Mode::Night) => json!(8),
                    _ => json!(4),
                },
            )),
        ),
    );
    model
        .theme
        .color_vars
        .insert("Home.pco".to_string(), ModeValues::new(1, 2));
    model
}

#[test]
fn set_mode_emits_batch_once() {
    let bus = MemoryBus::new();
    let mut session =
        common::session_with(device_model(), global_theme(), SessionSettings::default(), &bus);
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    session.take_commands();

    assert!(session.set_mode(Some(Mode::Night)));
    assert_eq!(
        session.take_commands(),
        vec![
            "Anchor.bco=10",
            "Battery.textColor=55296",
            "Home.pco=2",
            "Weather.Weather.pic=14",
            "page 1",
            "dim=33",
        ]
    );
    assert!(!session.set_mode(Some(Mode::Night)));
    assert!(session.take_commands().is_empty());
    assert!(!session.set_mode(None));
    assert_eq!(session.state().current_mode, Some(Mode::Night));
}

#[test]
fn initial_mode_falls_back_to_default_without_position() {
    let bus = MemoryBus::new();
    let settings = SessionSettings {
        default_mode: Mode::Night,
        night_dim: 20,
        ..SessionSettings::default()
    };
    let mut session = common::session_with(device_model(), Theme::default(), settings, &bus);
    session.apply_initial_mode(Utc::now());
    assert_eq!(session.state().current_mode, Some(Mode::Night));
    // No page yet: no page refresh and nothing to redraw.
    assert_eq!(session.take_commands(), vec!["Home.pco=2", "dim=20"]);
}

#[test]
fn initial_mode_is_calculated_from_position() {
    let bus = MemoryBus::new();
    bus.set(POSITION_PATH, json!({"latitude": 37.8, "longitude": -122.4}));
    let mut session = common::session(device_model(), &bus);
    let midday = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    session.apply_initial_mode(midday);
    assert_eq!(session.state().current_mode, Some(Mode::Day));

    let mut manual = common::session_with(
        device_model(),
        Theme::default(),
        SessionSettings {
            auto_mode: false,
            default_mode: Mode::Night,
            ..SessionSettings::default()
        },
        &bus,
    );
    manual.apply_initial_mode(midday);
    assert_eq!(manual.state().current_mode, Some(Mode::Night));
}

#[test]
fn position_delta_switches_mode_and_redraws() {
    let bus = MemoryBus::new();
    let mut session = common::session(device_model(), &bus);
    let midday = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    session.apply_initial_mode(midday);
    session.take_commands();

    let position = Delta::new(POSITION_PATH, Some(json!({"latitude": 1.0, "longitude": 2.0})));
    session.on_delta(&position, midday);
    assert!(session.take_commands().is_empty(), "still day");

    session.on_delta(&position, midnight);
    assert_eq!(
        session.take_commands(),
        vec!["Home.pco=2", "page 1", "dim=33", "icon.pic=8"]
    );
}

#[test]
fn position_updates_ignored_without_auto_mode() {
    let bus = MemoryBus::new();
    let settings = SessionSettings {
        auto_mode: false,
        ..SessionSettings::default()
    };
    let mut session = common::session_with(device_model(), Theme::default(), settings, &bus);
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    session.take_commands();
    let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
    session.on_delta(
        &Delta::new(POSITION_PATH, Some(json!({"latitude": 1.0, "longitude": 2.0}))),
        midnight,
    );
    assert!(session.take_commands().is_empty());
    assert_eq!(session.state().current_mode, None);
}

#[test]
fn mode_refresh_echo_does_not_pause_paging() {
    let bus = MemoryBus::new();
    let model = DeviceModel::new().page(0, Page::new()).page(1, Page::new());
    let settings = SessionSettings {
        advance_pages: Duration::from_secs(5),
        ..SessionSettings::default()
    };
    let mut session = common::session_with(model, Theme::default(), settings, &bus);
    let t0 = Instant::now();
    session.handle_event(PanelEvent::PageReport(0), t0);
    session.set_mode(Some(Mode::Night));
    assert!(session.take_commands().contains(&"page 0".to_string()));

    session.handle_event(PanelEvent::PageReport(0), t0 + Duration::from_secs(1));
    session.page_tick(t0 + Duration::from_secs(6));
    assert_eq!(session.take_commands(), vec!["page 1"]);
}

#[test]
fn navigating_away_still_pauses_paging() {
    let bus = MemoryBus::new();
    let model = DeviceModel::new()
        .page(0, Page::new())
        .page(1, Page::new())
        .page(2, Page::new());
    let mut session = common::session(model, &bus);
    let t0 = Instant::now();
    session.handle_event(PanelEvent::PageReport(0), t0);
    session.handle_event(PanelEvent::PageReport(2), t0 + Duration::from_secs(1));
    session.take_commands();

    session.page_tick(t0 + Duration::from_secs(5));
    assert!(session.take_commands().is_empty());
    session.page_tick(t0 + Duration::from_secs(10));
    assert_eq!(session.take_commands(), vec!["page 0"]);
}
