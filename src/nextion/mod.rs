//! # Nextion Panel Protocol
//!
//! Text command builders for the panel instruction set plus the byte framing
//! used on the serial link ([`framer`]).
//!
//! Only the handful of instructions the bridge needs are modelled here:
//!
//! | Builder | Wire text | Meaning |
//! |---|---|---|
//! | [`send_me`] | `sendme` | ask the panel to report its current page |
//! | [`set_text`] | `obj.txt="..."` | assign a text attribute |
//! | [`set_val`] | `obj.val=n` | assign a numeric attribute |
//! | [`set_pic`] | `obj.pic=n` | select a picture resource |
//! | [`visible`] | `vis obj,0/1` | hide/show a component |
//! | [`wave_add`] | `add id,ch,v` | append a waveform sample |
//! | [`wave_clear`] | `cle id,ch` | clear a waveform channel |
//! | [`page`] | `page n` | switch (or reload) a page |
//! | [`dim`] | `dim=n` | backlight level 0-100 |
//! | [`sleep_after`] | `thsp=n` | sleep after n seconds without touch |
//! | [`wake_on_touch`] | `thup=0/1` | wake the panel on touch |
//! | [`assign`] | `var=v` | generic global/system variable assignment |
//!
//! Commands must not contain `0xFF`; [`framer::encode_command`] enforces it.

pub mod framer;

pub use framer::{classify, encode_command, CodecError, FrameDecoder, PanelEvent};

pub fn send_me() -> String {
    "sendme".to_string()
}

/// `obj.txt="text"` with embedded quotes and backslashes escaped.
pub fn set_text(objname: &str, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            c => escaped.push(c),
        }
    }
    format!("{objname}.txt=\"{escaped}\"")
}

pub fn set_val(objname: &str, value: i64) -> String {
    format!("{objname}.val={value}")
}

pub fn set_pic(objname: &str, picture: i64) -> String {
    format!("{objname}.pic={picture}")
}

pub fn visible(objname: &str, shown: bool) -> String {
    format!("vis {objname},{}", u8::from(shown))
}

pub fn wave_add(id: u8, channel: u8, sample: u8) -> String {
    format!("add {id},{channel},{sample}")
}

pub fn wave_clear(id: u8, channel: u8) -> String {
    format!("cle {id},{channel}")
}

pub fn page(index: u8) -> String {
    format!("page {index}")
}

pub fn dim(level: u8) -> String {
    format!("dim={}", level.min(100))
}

/// `thsp` accepts 3..=65535 seconds; 0 disables auto sleep.
pub fn sleep_after(seconds: u32) -> String {
    let secs = match seconds {
        0 => 0,
        s => s.clamp(3, 65_535),
    };
    format!("thsp={secs}")
}

pub fn wake_on_touch(enabled: bool) -> String {
    format!("thup={}", u8::from(enabled))
}

pub fn assign(var: &str, value: &str) -> String {
    format!("{var}={value}")
}
