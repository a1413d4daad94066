//! # Display Session
//!
//! Per-device engine state and the rendering pipeline. A [`Session`] decides, for every
//! page report, touch, telemetry delta and timer tick, which commands go to the panel.
//! It performs no I/O: commands accumulate in an outbox drained with
//! [`Session::take_commands`], and Data Bus writes requested by buttons are drained with
//! [`Session::take_writes`]. The device actor (see [`crate::device`]) owns one session
//! and does the actual serial and bus work.
//!
//! ## Rendering an item
//!
//! 1. Absent value: gauges are hidden, waveforms cleared, other kinds fall back to
//!    their `unknown` value or draw nothing.
//! 2. Present value: the formatter (if any) is applied; a formatter error skips only
//!    that item.
//! 3. Paths with an outstanding button write are not rendered.
//! 4. A previously hidden gauge is shown again.
//! 5. The kind-specific command is emitted.

pub mod buttons;
pub mod mode;
pub mod pager;

use crate::bus::{DataBus, Delta};
use crate::logutil::command_preview;
use crate::model::helpers::value_as_f64;
use crate::model::{
    DeviceModel, FormatError, Item, ItemKind, Mode, RenderContext, Theme, Value, POSITION_PATH,
};
use crate::nextion::{self, framer::EVENT_PRESS, PanelEvent};
use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub use mode::{calculate_mode, FixedSchedule, SunTimes, SunTimesProvider};
pub use pager::PagerState;

/// Per-device behaviour knobs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Recompute day/night from position updates.
    pub auto_mode: bool,
    /// Mode used when none can be calculated.
    pub default_mode: Mode,
    pub day_dim: u8,
    pub night_dim: u8,
    /// Seconds without touch before the panel sleeps (0 = never).
    pub sleep_timeout: u32,
    pub wake_on_touch: bool,
    /// Page advance period; zero disables paging.
    pub advance_pages: Duration,
    /// How long a manual page change holds off paging.
    pub advance_page_pause: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_mode: true,
            default_mode: Mode::Day,
            day_dim: 100,
            night_dim: 33,
            sleep_timeout: 0,
            wake_on_touch: true,
            advance_pages: Duration::ZERO,
            advance_page_pause: Duration::from_secs(5),
        }
    }
}

/// Mutable state of one device.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Page the panel last reported; `None` until it announces one.
    pub current_page: Option<u8>,
    pub current_mode: Option<Mode>,
    /// Paths with a button write in flight. Rendering for these is suppressed.
    pub changing_paths: HashSet<String>,
    /// Gauges currently hidden, keyed by (page, objname).
    hidden: HashSet<(u8, String)>,
    pub pager: PagerState,
}

impl SessionState {
    /// Forget everything tied to the link. Outstanding writes keep their
    /// `changing_paths` entry until they complete, and hidden gauges stay hidden on
    /// the panel so they stay recorded here.
    pub fn reset(&mut self) {
        self.current_page = None;
        self.current_mode = None;
        self.pager = PagerState::default();
    }

    pub fn is_hidden(&self, page: u8, objname: &str) -> bool {
        self.hidden.contains(&(page, objname.to_string()))
    }
}

/// A button write waiting to be issued on the Data Bus.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub path: String,
    pub value: Value,
}

pub struct Session {
    label: String,
    model: Arc<DeviceModel>,
    theme: Arc<Theme>,
    settings: SessionSettings,
    bus: Arc<dyn DataBus>,
    sun: Arc<dyn SunTimesProvider>,
    state: SessionState,
    outbox: Vec<String>,
    writes: Vec<WriteRequest>,
}

impl Session {
    pub fn new(
        label: impl Into<String>,
        model: Arc<DeviceModel>,
        theme: Arc<Theme>,
        settings: SessionSettings,
        bus: Arc<dyn DataBus>,
        sun: Arc<dyn SunTimesProvider>,
    ) -> Self {
        Self {
            label: label.into(),
            model,
            theme,
            settings,
            bus,
            sun,
            state: SessionState::default(),
            outbox: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Commands produced since the last call, in send order.
    pub fn take_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// Button writes requested since the last call.
    pub fn take_writes(&mut self) -> Vec<WriteRequest> {
        std::mem::take(&mut self.writes)
    }

    fn send(&mut self, command: String) {
        debug!("[{}] queue {}", self.label, command_preview(&command));
        self.outbox.push(command);
    }

    fn render_context(&self) -> RenderContext {
        RenderContext {
            mode: self.state.current_mode,
        }
    }

    /// Link opened: start from a clean state and ask the panel for its page.
    pub fn on_connected(&mut self) {
        self.state.reset();
        self.outbox.clear();
        self.send(nextion::send_me());
    }

    /// Sleep and wake policy, sent once the panel has settled.
    pub fn apply_device_settings(&mut self) {
        self.send(nextion::sleep_after(self.settings.sleep_timeout));
        self.send(nextion::wake_on_touch(self.settings.wake_on_touch));
    }

    /// Pick the first mode after connecting: calculated when possible, otherwise the default.
    pub fn apply_initial_mode(&mut self, now: DateTime<Utc>) {
        let calculated = if self.settings.auto_mode {
            let position = self.bus.read_current(POSITION_PATH);
            calculate_mode(position.as_ref(), now, self.sun.as_ref())
        } else {
            None
        };
        let mode = calculated.unwrap_or(self.settings.default_mode);
        if self.set_mode(Some(mode)) && self.state.current_page.is_some() {
            self.redraw_page();
        }
    }

    /// Link lost: drop page/mode so nothing acts on a stale panel.
    pub fn on_disconnected(&mut self) {
        self.state.reset();
        self.outbox.clear();
    }

    pub fn handle_event(&mut self, event: PanelEvent, now: Instant) {
        match event {
            PanelEvent::PageReport(page) => self.on_page_report(page, now),
            PanelEvent::Touch {
                page,
                component,
                event,
            } => {
                if event == EVENT_PRESS {
                    self.press(page, &component.to_string());
                }
            }
            PanelEvent::VirtualPress(id) => match self.state.current_page {
                Some(page) => self.press(page, &id),
                None => debug!("[{}] press {} before first page report", self.label, id),
            },
            PanelEvent::Text(text) => {
                debug!("[{}] ignoring panel text {}", self.label, command_preview(&text))
            }
        }
    }

    fn on_page_report(&mut self, page: u8, now: Instant) {
        // The first report after connecting answers `sendme`, and a report of the
        // page already shown echoes a `page` refresh. Neither is a manual change.
        if self.state.current_page.is_some_and(|current| current != page)
            && self
                .state
                .pager
                .note_page_report(page, now, self.settings.advance_page_pause)
        {
            debug!("[{}] manual page change to {}, paging paused", self.label, page);
        }
        if self.state.current_page == Some(page) {
            return;
        }
        info!("[{}] on page {}", self.label, page);
        self.state.current_page = Some(page);
        if self.model.get_page(page).is_none() {
            debug!("[{}] page {} has no configured items", self.label, page);
        }
        self.redraw_page();
    }

    /// Render every item of the current page from the Data Bus's current values.
    pub fn redraw_page(&mut self) {
        let Some(index) = self.state.current_page else {
            return;
        };
        let model = Arc::clone(&self.model);
        let Some(page) = model.get_page(index) else {
            return;
        };
        debug!("[{}] redraw page {}", self.label, index);
        for item in &page.items {
            let value = self.bus.read_current(&item.path);
            self.display_item(index, item, value);
        }
    }

    /// Route a telemetry delta to the current page and, for position updates, the mode.
    pub fn on_delta(&mut self, delta: &Delta, now: DateTime<Utc>) {
        let Some(index) = self.state.current_page else {
            return;
        };
        let model = Arc::clone(&self.model);
        if let Some(page) = model.get_page(index) {
            for item in page.items_for_path(&delta.path) {
                self.display_item(index, item, delta.value.clone());
            }
        }
        if delta.path == POSITION_PATH && self.settings.auto_mode {
            let mode = calculate_mode(delta.value.as_ref(), now, self.sun.as_ref());
            if self.set_mode(mode) {
                self.redraw_page();
            }
        }
    }

    /// Render one item on `page`.
    pub fn display_item(&mut self, page: u8, item: &Item, value: Option<Value>) {
        let ctx = self.render_context();
        let value = match value {
            None => match &item.kind {
                ItemKind::Gauge => {
                    debug!("[{}] hiding {}", self.label, item.objname);
                    self.send(nextion::visible(&item.objname, false));
                    self.state.hidden.insert((page, item.objname.clone()));
                    return;
                }
                ItemKind::Waveform(spec) => {
                    self.send(nextion::wave_clear(spec.id, spec.channel));
                    return;
                }
                _ => match &item.unknown {
                    Some(fallback) => fallback.resolve(&ctx),
                    None => return,
                },
            },
            Some(v) => match &item.format {
                Some(format) => match format.apply(&v, &ctx) {
                    Ok(formatted) => formatted,
                    Err(e) => {
                        warn!("[{}] cannot format {} for {}: {}", self.label, v, item.objname, e);
                        return;
                    }
                },
                None => v,
            },
        };

        if self.state.changing_paths.contains(&item.path) {
            debug!("[{}] {} is changing, not drawing {}", self.label, item.path, item.objname);
            return;
        }

        let command = match render_command(item, &value) {
            Ok(c) => c,
            Err(e) => {
                warn!("[{}] cannot render {} for {}: {}", self.label, value, item.objname, e);
                return;
            }
        };

        if self.state.hidden.remove(&(page, item.objname.clone())) {
            debug!("[{}] showing {}", self.label, item.objname);
            self.send(nextion::visible(&item.objname, true));
        }
        self.send(command);
    }

    /// Switch themes. Returns whether anything changed so the caller can redraw.
    pub fn set_mode(&mut self, mode: Option<Mode>) -> bool {
        let Some(mode) = mode else {
            return false;
        };
        if self.state.current_mode == Some(mode) {
            return false;
        }
        info!("[{}] switching to {} mode", self.label, mode);
        self.state.current_mode = Some(mode);

        let global = Arc::clone(&self.theme);
        let model = Arc::clone(&self.model);
        let themes = [global.as_ref(), &model.theme];
        for theme in themes {
            for (var, values) in &theme.color_vars {
                self.send(nextion::assign(var, &values.pick(mode).to_string()));
            }
        }
        for theme in themes {
            if let Some(commands) = &theme.mode_commands {
                for command in commands.commands(mode) {
                    self.send(command);
                }
            }
        }
        if let Some(page) = self.state.current_page {
            self.send(nextion::page(page));
        }
        let level = match mode {
            Mode::Day => self.settings.day_dim,
            Mode::Night => self.settings.night_dim,
        };
        self.send(nextion::dim(level));
        true
    }

    /// Page scheduler tick.
    pub fn page_tick(&mut self, now: Instant) {
        let count = self.model.page_count();
        if self.state.pager.is_paused(now) {
            trace!("[{}] paging paused", self.label);
        }
        if let Some(next) = self.state.pager.tick(self.state.current_page, count, now) {
            debug!("[{}] advancing to page {}", self.label, next);
            self.send(nextion::page(next));
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_int(value: &Value) -> Result<i64, FormatError> {
    value_as_f64(value)
        .filter(|f| f.is_finite())
        .map(|f| f.round() as i64)
        .ok_or_else(|| FormatError::NotNumeric(value.clone()))
}

/// Kind-specific command for a resolved value.
fn render_command(item: &Item, value: &Value) -> Result<String, FormatError> {
    let obj = item.objname.as_str();
    Ok(match &item.kind {
        ItemKind::Text => nextion::set_text(obj, &value_text(value)),
        ItemKind::Numeric | ItemKind::Gauge => nextion::set_val(obj, value_int(value)?),
        ItemKind::Picture => nextion::set_pic(obj, value_int(value)?),
        ItemKind::Waveform(spec) => {
            let v = value_as_f64(value).ok_or_else(|| FormatError::NotNumeric(value.clone()))?;
            if spec.range_hi == 0.0 {
                return Err(FormatError::ZeroRange);
            }
            let clamped = v.max(spec.range_lo).min(spec.range_hi);
            let sample = ((clamped - spec.range_lo) / spec.range_hi) * spec.height;
            nextion::wave_add(spec.id, spec.channel, sample.round().clamp(0.0, 255.0) as u8)
        }
    })
}
