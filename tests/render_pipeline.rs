mod common;

use nextion_bridge::bus::{Delta, MemoryBus};
use nextion_bridge::model::helpers::value_as_f64;
use nextion_bridge::model::{
    Button, ButtonValue, ChangingPicture, DeviceModel, Fallback, FormatError, Formatter, Item,
    ItemKind, Mode, Page, WaveformSpec,
};
use nextion_bridge::nextion::PanelEvent;
use serde_json::json;
use tokio::time::Instant;

fn wave() -> Item {
    Item::new(
        "s0",
        ItemKind::Waveform(WaveformSpec {
            range_lo: 0.0,
            range_hi: 30.0,
            height: 81.0,
            channel: 0,
            id: 2,
        }),
        "environment.wind.speedApparent",
    )
}

#[test]
fn absent_values_follow_unknown_rules() {
    let bus = MemoryBus::new();
    let mut session = common::session(DeviceModel::new(), &bus);
    let cases = [
        (
            Item::new("t0", ItemKind::Text, "a").with_unknown(Fallback::Constant(json!("--"))),
            vec!["t0.txt=\"--\""],
        ),
        (
            Item::new("n0", ItemKind::Numeric, "a").with_unknown(Fallback::Constant(json!(0))),
            vec!["n0.val=0"],
        ),
        (
            Item::new("g0", ItemKind::Gauge, "a").with_unknown(Fallback::Constant(json!(0))),
            vec!["vis g0,0"],
        ),
        (
            wave().with_unknown(Fallback::Constant(json!(0))),
            vec!["cle 2,0"],
        ),
        (Item::new("t1", ItemKind::Text, "a"), vec![]),
    ];
    for (item, expected) in cases {
        session.display_item(0, &item, None);
        assert_eq!(session.take_commands(), expected, "item {}", item.objname);
    }
}

#[test]
fn computed_fallback_sees_the_mode() {
    let bus = MemoryBus::new();
    let mut session = common::session(DeviceModel::new(), &bus);
    let item = Item::new("p1", ItemKind::Picture, "electrical.switches.acr.state").with_unknown(
        Fallback::computed(|ctx| match ctx.mode {
            Some(Mode::Night) => json!(7),
            _ => json!(6),
        }),
    );
    session.display_item(0, &item, None);
    assert_eq!(session.take_commands(), vec!["p1.pic=6"]);
    session.set_mode(Some(Mode::Night));
    session.take_commands();
    session.display_item(0, &item, None);
    assert_eq!(session.take_commands(), vec!["p1.pic=7"]);
}

#[test]
fn formatter_applies_and_errors_skip_only_that_item() {
    let percent = Formatter::new(|v, _| {
        let f = value_as_f64(v).ok_or_else(|| FormatError::NotNumeric(v.clone()))?;
        Ok(json!(format!("{:.0}%", f * 100.0)))
    });
    let model = DeviceModel::new().page(
        0,
        Page::new()
            .item(Item::new("soc", ItemKind::Text, "battery.soc").with_format(percent.clone()))
            .item(Item::new("soc2", ItemKind::Text, "battery.soc2").with_format(percent))
            .item(Item::new("volts", ItemKind::Text, "battery.voltage")),
    );
    let bus = MemoryBus::new();
    bus.set("battery.soc", json!(0.87));
    bus.set("battery.soc2", json!({"broken": true}));
    bus.set("battery.voltage", json!(12.6));
    let mut session = common::session(model, &bus);
    session.handle_event(PanelEvent::PageReport(0), Instant::now());
    assert_eq!(
        session.take_commands(),
        vec!["soc.txt=\"87%\"", "volts.txt=\"12.6\""]
    );
}

#[test]
fn hidden_gauge_reappears_with_a_value() {
    let bus = MemoryBus::new();
    let model = DeviceModel::new().page(
        1,
        Page::new().item(Item::new("windG", ItemKind::Gauge, "environment.wind.angleApparent")),
    );
    let mut session = common::session(model, &bus);
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    assert_eq!(session.take_commands(), vec!["vis windG,0"]);
    assert!(session.state().is_hidden(1, "windG"));

    session.on_delta(
        &Delta::new("environment.wind.angleApparent", Some(json!(270))),
        chrono::Utc::now(),
    );
    assert_eq!(session.take_commands(), vec!["vis windG,1", "windG.val=270"]);
    assert!(!session.state().is_hidden(1, "windG"));

    session.on_delta(
        &Delta::new("environment.wind.angleApparent", Some(json!(271))),
        chrono::Utc::now(),
    );
    assert_eq!(session.take_commands(), vec!["windG.val=271"]);
}

#[test]
fn hidden_gauge_stays_tracked_across_reconnect() {
    let bus = MemoryBus::new();
    let model =
        DeviceModel::new().page(1, Page::new().item(Item::new("windG", ItemKind::Gauge, "w")));
    let mut session = common::session(model, &bus);
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    assert_eq!(session.take_commands(), vec!["vis windG,0"]);

    session.on_disconnected();
    session.on_connected();
    session.take_commands();
    assert!(session.state().is_hidden(1, "windG"));

    bus.set("w", json!(90));
    session.handle_event(PanelEvent::PageReport(1), Instant::now());
    assert_eq!(session.take_commands(), vec!["vis windG,1", "windG.val=90"]);
}

#[test]
fn waveform_clamps_to_range() {
    let bus = MemoryBus::new();
    let mut session = common::session(DeviceModel::new(), &bus);
    let item = wave();
    for (value, expected) in [(json!(45), "add 2,0,81"), (json!(-1), "add 2,0,0"), (json!(10), "add 2,0,27")] {
        session.display_item(0, &item, Some(value));
        assert_eq!(session.take_commands(), vec![expected]);
    }
}

#[test]
fn changing_path_suppresses_updates_until_write_resolves() {
    let path = "electrical.switches.acr.state";
    let model = DeviceModel::new().page(
        0,
        Page::new()
            .item(Item::new("p1", ItemKind::Picture, path))
            .button(
                "16",
                Button::new(path, ButtonValue::toggle())
                    .with_changing_picture(ChangingPicture::new("p1", |_, _| 26)),
            ),
    );
    let bus = MemoryBus::new();
    bus.set(path, json!(0));
    let mut session = common::session(model, &bus);
    session.handle_event(PanelEvent::PageReport(0), Instant::now());
    session.take_commands();

    session.press(0, "16");
    assert_eq!(session.take_commands(), vec!["p1.pic=26"]);
    session.on_delta(&Delta::new(path, Some(json!(1))), chrono::Utc::now());
    assert!(session.take_commands().is_empty());

    assert!(session.complete_write(path, &Err(nextion_bridge::bus::BusError::Unavailable)));
    session.on_delta(&Delta::new(path, Some(json!(1))), chrono::Utc::now());
    assert_eq!(session.take_commands(), vec!["p1.pic=1"]);
}

#[test]
fn text_is_quoted_and_escaped() {
    let bus = MemoryBus::new();
    let mut session = common::session(DeviceModel::new(), &bus);
    let item = Item::new("name", ItemKind::Text, "vessel.name");
    session.display_item(0, &item, Some(json!("Say \"hi\"")));
    assert_eq!(session.take_commands(), vec![r#"name.txt="Say \"hi\"""#]);
}
