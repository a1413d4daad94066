//! Declarative model file.
//!
//! A TOML rendering of the [`DisplayModel`](super::DisplayModel) covering what can be
//! expressed without code: literal fallbacks, per-mode fallbacks, numeric formatting
//! with a fixed set of unit conversions, switch pictures, literal and toggle buttons.
//!
//! ```toml
//! [colors]
//! "Battery.textColor" = { day = 65535, night = 55296 }
//!
//! [mode_commands]
//! day = ["Weather.Weather.pic=0"]
//! night = ["Weather.Weather.pic=14"]
//!
//! [[devices]]
//! [devices.pages.0]
//! items = [
//!   { objname = "bvolts", type = "text", path = "electrical.batteries.260.voltage",
//!     format = { decimals = 2, suffix = "V" }, unknown = "--V" },
//!   { objname = "p1", type = "pic", path = "electrical.switches.acr.state",
//!     format = { switch = { day = { off = 4, on = 5 }, night = { off = 8, on = 9 } } },
//!     unknown = { day = 6, night = 7 } },
//! ]
//! [devices.pages.0.buttons.acr]
//! path = "electrical.switches.acr.state"
//! value = "toggle"
//! picture_obj = "p1"
//! changing_picture = { day = 26, night = 23, day_on = 25, night_on = 24 }
//! ```
use super::helpers::{self, value_as_f64};
use super::{
    Button, ButtonValue, ChangingPicture, DeviceModel, DisplayModel, Fallback, FormatError,
    Formatter, Item, ItemKind, ModeCommands, ModeValues, Page, Theme, Value, WaveformSpec,
};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("page key {0:?} is not a page number 0-255")]
    PageKey(String),
    #[error("waveform item {objname:?} is missing {field}")]
    WaveformField { objname: String, field: &'static str },
    #[error("button {key:?} has changing_picture but no picture_obj")]
    MissingPictureObj { key: String },
}

#[derive(Debug, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub colors: BTreeMap<String, ModeValues<i64>>,
    #[serde(default)]
    pub mode_commands: Option<ModeValues<Vec<String>>>,
    #[serde(default)]
    pub devices: Vec<DeviceFile>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceFile {
    #[serde(default)]
    pub colors: BTreeMap<String, ModeValues<i64>>,
    #[serde(default)]
    pub mode_commands: Option<ModeValues<Vec<String>>>,
    #[serde(default)]
    pub pages: BTreeMap<String, PageFile>,
}

#[derive(Debug, Deserialize)]
pub struct PageFile {
    #[serde(default)]
    pub items: Vec<ItemFile>,
    #[serde(default)]
    pub buttons: BTreeMap<String, ButtonFile>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFile {
    #[serde(alias = "txt")]
    Text,
    #[serde(alias = "val")]
    Numeric,
    #[serde(alias = "pic")]
    Picture,
    Gauge,
    #[serde(alias = "wave")]
    Waveform,
}

#[derive(Debug, Deserialize)]
pub struct ItemFile {
    pub objname: String,
    #[serde(rename = "type")]
    pub kind: KindFile,
    pub path: String,
    #[serde(default)]
    pub format: Option<FormatFile>,
    #[serde(default)]
    pub unknown: Option<FallbackFile>,
    #[serde(default)]
    pub range_lo: Option<f64>,
    #[serde(default)]
    pub range_hi: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub channel: Option<u8>,
    #[serde(default)]
    pub id: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FallbackFile {
    ByMode(ModeValues<Value>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    RadsToDeg,
    RadsToGauge,
    KelvinToFahrenheit,
    KelvinToCelsius,
    MsToKnots,
    /// Seconds rendered as `H:MM`; other numeric options are ignored.
    HoursMinutes,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SwitchPictures {
    pub off: i64,
    pub on: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FormatFile {
    Switch {
        switch: ModeValues<SwitchPictures>,
    },
    Number {
        #[serde(default)]
        convert: Option<Conversion>,
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        decimals: Option<u8>,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        suffix: String,
    },
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct ButtonFile {
    pub path: String,
    /// A literal, or the string `"toggle"`.
    pub value: Value,
    #[serde(default)]
    pub picture_obj: Option<String>,
    #[serde(default)]
    pub changing_picture: Option<ChangingPictureFile>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChangingPictureFile {
    pub day: i64,
    pub night: i64,
    /// Used instead of `day`/`night` when the target value is truthy.
    #[serde(default)]
    pub day_on: Option<i64>,
    #[serde(default)]
    pub night_on: Option<i64>,
}

impl ModelFile {
    /// Load and convert a model file.
    pub async fn load(path: &str) -> Result<DisplayModel> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read model file {}: {}", path, e))?;
        Self::parse(&content).map_err(|e| anyhow!("Failed to load model file {}: {}", path, e))
    }

    pub fn parse(content: &str) -> Result<DisplayModel> {
        let file: ModelFile = toml::from_str(content)?;
        Ok(file.into_model()?)
    }

    pub fn into_model(self) -> Result<DisplayModel, ModelError> {
        let devices = self
            .devices
            .into_iter()
            .map(DeviceFile::into_model)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DisplayModel {
            devices,
            theme: theme(self.colors, self.mode_commands),
        })
    }
}

fn theme(colors: BTreeMap<String, ModeValues<i64>>, cmds: Option<ModeValues<Vec<String>>>) -> Theme {
    Theme {
        color_vars: colors,
        mode_commands: cmds.map(ModeCommands::fixed),
    }
}

impl DeviceFile {
    fn into_model(self) -> Result<DeviceModel, ModelError> {
        let mut pages = BTreeMap::new();
        for (key, page) in self.pages {
            let index: u8 = key.trim().parse().map_err(|_| ModelError::PageKey(key.clone()))?;
            pages.insert(index, page.into_model()?);
        }
        Ok(DeviceModel {
            pages,
            theme: theme(self.colors, self.mode_commands),
        })
    }
}

impl PageFile {
    fn into_model(self) -> Result<Page, ModelError> {
        let items = self
            .items
            .into_iter()
            .map(ItemFile::into_model)
            .collect::<Result<Vec<_>, _>>()?;
        let mut buttons = std::collections::HashMap::new();
        for (key, button) in self.buttons {
            let button = button.into_model(&key)?;
            buttons.insert(key, button);
        }
        Ok(Page { items, buttons })
    }
}

impl ItemFile {
    fn into_model(self) -> Result<Item, ModelError> {
        let kind = match self.kind {
            KindFile::Text => ItemKind::Text,
            KindFile::Numeric => ItemKind::Numeric,
            KindFile::Picture => ItemKind::Picture,
            KindFile::Gauge => ItemKind::Gauge,
            KindFile::Waveform => {
                let missing = |field| ModelError::WaveformField {
                    objname: self.objname.clone(),
                    field,
                };
                ItemKind::Waveform(WaveformSpec {
                    range_lo: self.range_lo.unwrap_or(0.0),
                    range_hi: self.range_hi.ok_or_else(|| missing("range_hi"))?,
                    height: self.height.ok_or_else(|| missing("height"))?,
                    channel: self.channel.unwrap_or(0),
                    id: self.id.ok_or_else(|| missing("id"))?,
                })
            }
        };
        let mut item = Item::new(self.objname, kind, self.path);
        item.format = self.format.map(FormatFile::into_formatter);
        item.unknown = self.unknown.map(|u| match u {
            FallbackFile::ByMode(values) => Fallback::computed(move |ctx| {
                values.pick(ctx.mode.unwrap_or(super::Mode::Day)).clone()
            }),
            FallbackFile::Literal(v) => Fallback::Constant(v),
        });
        Ok(item)
    }
}

impl FormatFile {
    fn into_formatter(self) -> Formatter {
        match self {
            FormatFile::Switch { switch } => Formatter::new(move |value, ctx| {
                let pics = switch.pick(ctx.mode.unwrap_or(super::Mode::Day));
                let pic = if helpers::truthy(value) { pics.on } else { pics.off };
                Ok(Value::from(pic))
            }),
            FormatFile::Number {
                convert,
                scale,
                offset,
                decimals,
                prefix,
                suffix,
            } => Formatter::new(move |value, _ctx| {
                let raw =
                    value_as_f64(value).ok_or_else(|| FormatError::NotNumeric(value.clone()))?;
                let text = match convert {
                    Some(Conversion::HoursMinutes) => helpers::seconds_to_hours_minutes(raw),
                    other => {
                        let converted = match other {
                            Some(Conversion::RadsToDeg) => helpers::rads_to_deg(raw),
                            Some(Conversion::RadsToGauge) => {
                                helpers::deg_to_gauge(helpers::rads_to_deg(raw))
                            }
                            Some(Conversion::KelvinToFahrenheit) => {
                                helpers::kelvin_to_fahrenheit(raw)
                            }
                            Some(Conversion::KelvinToCelsius) => helpers::kelvin_to_celsius(raw),
                            Some(Conversion::MsToKnots) => helpers::ms_to_knots(raw),
                            Some(Conversion::HoursMinutes) | None => raw,
                        };
                        let v = converted * scale + offset;
                        // Plain conversions stay numeric so gauges and waveforms scale
                        // the unrounded value.
                        if decimals.is_none() && prefix.is_empty() && suffix.is_empty() {
                            return Ok(Value::from(v));
                        }
                        let prec = usize::from(decimals.unwrap_or(0));
                        format!("{prefix}{v:.prec$}{suffix}")
                    }
                };
                Ok(Value::String(text))
            }),
        }
    }
}

impl ButtonFile {
    fn into_model(self, key: &str) -> Result<Button, ModelError> {
        let value = match &self.value {
            Value::String(s) if s == "toggle" => ButtonValue::toggle(),
            other => ButtonValue::Constant(other.clone()),
        };
        let mut button = Button::new(self.path, value);
        if let Some(pics) = self.changing_picture {
            let objname = self.picture_obj.ok_or_else(|| ModelError::MissingPictureObj {
                key: key.to_string(),
            })?;
            button = button.with_changing_picture(ChangingPicture::new(
                objname,
                move |mode, target| {
                    let on = helpers::truthy(target);
                    match mode {
                        super::Mode::Day if on => pics.day_on.unwrap_or(pics.day),
                        super::Mode::Day => pics.day,
                        super::Mode::Night if on => pics.night_on.unwrap_or(pics.night),
                        super::Mode::Night => pics.night,
                    }
                },
            ));
        }
        Ok(button)
    }
}
