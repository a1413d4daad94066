//! # Display Model
//!
//! The read-only description of what each panel shows: pages of [`Item`]s bound to
//! Data Bus paths, touch [`Button`]s, and the day/night [`Theme`].
//!
//! Values that are sometimes literals and sometimes computed are tagged variants
//! ([`Fallback`], [`ButtonValue`]) so rendering and dispatch match exhaustively
//! instead of probing for callables at runtime.
//!
//! Models are usually built in code and shared between device sessions with `Arc`.
//! The binary loads a declarative subset from TOML via [`file`].
//!
//! ```rust
//! use nextion_bridge::model::{DeviceModel, Fallback, Item, ItemKind, Page};
//! use serde_json::json;
//!
//! let page = Page::new().item(
//!     Item::new("bvolts", ItemKind::Text, "electrical.batteries.260.voltage")
//!         .with_unknown(Fallback::Constant(json!("--V"))),
//! );
//! let device = DeviceModel::new().page(0, page);
//! assert_eq!(device.page_count(), 1);
//! ```

pub mod file;
pub mod helpers;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Values flowing through the Data Bus.
pub type Value = serde_json::Value;

/// Data Bus path carrying the vessel position (`{"latitude": .., "longitude": ..}`).
pub const POSITION_PATH: &str = "navigation.position";

/// Day/night display theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Day,
    Night,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Day => f.write_str("day"),
            Mode::Night => f.write_str("night"),
        }
    }
}

/// A pair of per-mode values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeValues<T> {
    pub day: T,
    pub night: T,
}

impl<T> ModeValues<T> {
    pub fn new(day: T, night: T) -> Self {
        Self { day, night }
    }

    pub fn pick(&self, mode: Mode) -> &T {
        match mode {
            Mode::Day => &self.day,
            Mode::Night => &self.night,
        }
    }
}

/// Session facts visible to formatters and computed fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext {
    pub mode: Option<Mode>,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected a number, got {0}")]
    NotNumeric(Value),
    #[error("waveform range_hi must be non-zero")]
    ZeroRange,
    #[error("{0}")]
    Invalid(String),
}

type FormatFn = dyn Fn(&Value, &RenderContext) -> Result<Value, FormatError> + Send + Sync;

/// Value formatter applied to present values before rendering.
#[derive(Clone)]
pub struct Formatter(Arc<FormatFn>);

impl Formatter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &RenderContext) -> Result<Value, FormatError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, value: &Value, ctx: &RenderContext) -> Result<Value, FormatError> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Formatter(..)")
    }
}

/// Value rendered when the Data Bus has nothing for an item's path.
#[derive(Clone)]
pub enum Fallback {
    Constant(Value),
    Computed(Arc<dyn Fn(&RenderContext) -> Value + Send + Sync>),
}

impl Fallback {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&RenderContext) -> Value + Send + Sync + 'static,
    {
        Fallback::Computed(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &RenderContext) -> Value {
        match self {
            Fallback::Constant(v) => v.clone(),
            Fallback::Computed(f) => f(ctx),
        }
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Fallback::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Waveform scaling and addressing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformSpec {
    pub range_lo: f64,
    pub range_hi: f64,
    /// Sample height in pixels.
    pub height: f64,
    pub channel: u8,
    /// Component id of the waveform on the page.
    pub id: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Text,
    Numeric,
    Picture,
    /// Rendered as a numeric value; hidden while its value is unknown.
    Gauge,
    Waveform(WaveformSpec),
}

/// A widget on a page bound to a Data Bus path.
#[derive(Debug, Clone)]
pub struct Item {
    /// Component name on the panel, unique within its page.
    pub objname: String,
    pub kind: ItemKind,
    pub path: String,
    pub format: Option<Formatter>,
    pub unknown: Option<Fallback>,
}

impl Item {
    pub fn new(objname: impl Into<String>, kind: ItemKind, path: impl Into<String>) -> Self {
        Self {
            objname: objname.into(),
            kind,
            path: path.into(),
            format: None,
            unknown: None,
        }
    }

    pub fn with_format(mut self, format: Formatter) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_unknown(mut self, unknown: Fallback) -> Self {
        self.unknown = Some(unknown);
        self
    }
}

type ButtonFn = dyn Fn(Option<&Value>) -> Value + Send + Sync;

/// Value written to the Data Bus when a button is pressed.
#[derive(Clone)]
pub enum ButtonValue {
    Constant(Value),
    /// Computed from the current value at the button's path.
    Computed(Arc<ButtonFn>),
}

impl ButtonValue {
    /// Flip between `0` and `1` based on the current value.
    pub fn toggle() -> Self {
        ButtonValue::Computed(Arc::new(helpers::toggle))
    }

    pub fn target(&self, current: Option<&Value>) -> Value {
        match self {
            ButtonValue::Constant(v) => v.clone(),
            ButtonValue::Computed(f) => f(current),
        }
    }
}

impl fmt::Debug for ButtonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonValue::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            ButtonValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

type PictureFn = dyn Fn(Mode, &Value) -> i64 + Send + Sync;

/// Transition icon shown while a button's write is outstanding.
#[derive(Clone)]
pub struct ChangingPicture {
    pub objname: String,
    picture: Arc<PictureFn>,
}

impl ChangingPicture {
    pub fn new<F>(objname: impl Into<String>, picture: F) -> Self
    where
        F: Fn(Mode, &Value) -> i64 + Send + Sync + 'static,
    {
        Self {
            objname: objname.into(),
            picture: Arc::new(picture),
        }
    }

    /// Picture id for the given mode and target value.
    pub fn picture(&self, mode: Mode, target: &Value) -> i64 {
        (self.picture)(mode, target)
    }
}

impl fmt::Debug for ChangingPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangingPicture")
            .field("objname", &self.objname)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Button {
    pub path: String,
    pub value: ButtonValue,
    pub changing: Option<ChangingPicture>,
}

impl Button {
    pub fn new(path: impl Into<String>, value: ButtonValue) -> Self {
        Self {
            path: path.into(),
            value,
            changing: None,
        }
    }

    pub fn with_changing_picture(mut self, changing: ChangingPicture) -> Self {
        self.changing = Some(changing);
        self
    }
}

/// Batch of commands sent when the mode changes.
#[derive(Clone)]
pub struct ModeCommands(Arc<dyn Fn(Mode) -> Vec<String> + Send + Sync>);

impl ModeCommands {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Mode) -> Vec<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Static per-mode command lists.
    pub fn fixed(lists: ModeValues<Vec<String>>) -> Self {
        Self::new(move |mode| lists.pick(mode).clone())
    }

    pub fn commands(&self, mode: Mode) -> Vec<String> {
        (self.0)(mode)
    }
}

impl fmt::Debug for ModeCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModeCommands(..)")
    }
}

/// Color/variable table and mode command batch.
#[derive(Debug, Clone, Default)]
pub struct Theme {
    /// Panel variable name -> value per mode, written as `name=value`.
    pub color_vars: BTreeMap<String, ModeValues<i64>>,
    pub mode_commands: Option<ModeCommands>,
}

impl Theme {
    pub fn is_empty(&self) -> bool {
        self.color_vars.is_empty() && self.mode_commands.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Keyed by component id as text (`"16"` for a touch on component 16, or the
    /// id carried by a `b:<id>` string event).
    pub buttons: HashMap<String, Button>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn button(mut self, key: impl Into<String>, button: Button) -> Self {
        self.buttons.insert(key.into(), button);
        self
    }

    pub fn items_for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |item| item.path == path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceModel {
    pub pages: BTreeMap<u8, Page>,
    /// Device-specific additions applied after the global theme.
    pub theme: Theme,
}

impl DeviceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, index: u8, page: Page) -> Self {
        self.pages.insert(index, page);
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn get_page(&self, index: u8) -> Option<&Page> {
        self.pages.get(&index)
    }

    pub fn item_paths(&self) -> impl Iterator<Item = &str> {
        self.pages
            .values()
            .flat_map(|page| page.items.iter().map(|item| item.path.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisplayModel {
    pub devices: Vec<DeviceModel>,
    pub theme: Theme,
}

impl DisplayModel {
    /// Union of all item paths plus the position path.
    pub fn subscribed_paths(&self) -> BTreeSet<String> {
        let mut paths: BTreeSet<String> = self
            .devices
            .iter()
            .flat_map(|d| d.item_paths().map(str::to_string))
            .collect();
        paths.insert(POSITION_PATH.to_string());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fallback_variants_resolve() {
        let ctx = RenderContext {
            mode: Some(Mode::Night),
        };
        assert_eq!(Fallback::Constant(json!("---")).resolve(&ctx), json!("---"));
        let pic = Fallback::computed(|ctx| match ctx.mode {
            Some(Mode::Night) => json!(7),
            _ => json!(6),
        });
        assert_eq!(pic.resolve(&ctx), json!(7));
        assert_eq!(pic.resolve(&RenderContext::default()), json!(6));
    }

    #[test]
    fn subscribed_paths_include_position_once() {
        let page = Page::new()
            .item(Item::new("a", ItemKind::Text, "x.y"))
            .item(Item::new("b", ItemKind::Numeric, "x.y"));
        let model = DisplayModel {
            devices: vec![DeviceModel::new().page(0, page)],
            theme: Theme::default(),
        };
        let paths: Vec<_> = model.subscribed_paths().into_iter().collect();
        assert_eq!(paths, vec![POSITION_PATH.to_string(), "x.y".to_string()]);
    }
}
