//! Terminator-delimited framing for the Nextion serial protocol.
//!
//! Every frame on the wire, in either direction, is:
//!
//!   `<payload bytes> FF FF FF`
//!
//! Outgoing payloads are ASCII-ish command text encoded one byte per character.
//! Incoming payloads start with a tag byte identifying the event. This module provides
//! a validating encoder, an incremental decoder that can be fed arbitrary chunks, and a
//! classifier that turns raw frames into [`PanelEvent`]s.
use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Frame terminator used by the panel firmware.
pub const TERMINATOR: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Page report: `66 <page>`
pub const TAG_PAGE: u8 = 0x66;
/// Touch event: `65 <page> <component> <event>`
pub const TAG_TOUCH: u8 = 0x65;
/// String data: `70 <utf8 text>`
pub const TAG_STRING: u8 = 0x70;

/// Touch event code for a press (release is `1`).
pub const EVENT_PRESS: u8 = 0;

/// Upper bound on a buffered partial frame. Panel frames are tiny; anything larger
/// means we lost a terminator and should start over.
const MAX_PENDING: usize = 4 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("character {0:?} cannot be sent to the panel (outside ISO-8859-1)")]
    Unencodable(char),
    #[error("command contains 0xFF at byte {0}, which would corrupt framing")]
    ContainsTerminator(usize),
}

/// Encode a command into a wire frame.
///
/// Characters map to single bytes (ISO-8859-1). A `0xFF` byte is rejected anywhere in
/// the command: even a trailing one merges with the terminator and shifts framing.
pub fn encode_command(command: &str) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(command.len() + TERMINATOR.len());
    for ch in command.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(CodecError::Unencodable(ch));
        }
        if code == 0xFF {
            return Err(CodecError::ContainsTerminator(out.len()));
        }
        out.push(code as u8);
    }
    out.extend_from_slice(&TERMINATOR);
    Ok(out)
}

/// Incremental decoder splitting a byte stream on [`TERMINATOR`].
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    overflows: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            overflows: 0,
        }
    }

    /// Push bytes, returning any completed frames (terminator stripped, empty frames dropped).
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(pos) = find_terminator(&self.buf) {
            let frame = self.buf.split_to(pos);
            self.buf.advance(TERMINATOR.len());
            if !frame.is_empty() {
                frames.push(frame.to_vec());
            }
        }
        if self.buf.len() > MAX_PENDING {
            // Keep the tail in case it holds the first bytes of a terminator.
            let keep = TERMINATOR.len() - 1;
            let drop = self.buf.len() - keep;
            self.buf.advance(drop);
            self.overflows += 1;
        }
        frames
    }

    /// Bytes buffered waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of times an oversized partial frame was discarded.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Forget any partial frame (used when a link is reopened).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// The panel is now showing this page.
    PageReport(u8),
    /// Raw touch event; `event == EVENT_PRESS` is a press.
    Touch { page: u8, component: u8, event: u8 },
    /// `b:<id>` string from panel-side code: a virtual press on the current page.
    VirtualPress(String),
    /// Any other string data.
    Text(String),
}

/// Classify a frame. Unknown tags and truncated frames yield `None`.
pub fn classify(frame: &[u8]) -> Option<PanelEvent> {
    match *frame.first()? {
        TAG_PAGE => frame.get(1).map(|&p| PanelEvent::PageReport(p)),
        TAG_TOUCH => {
            if frame.len() < 4 {
                return None;
            }
            Some(PanelEvent::Touch {
                page: frame[1],
                component: frame[2],
                event: frame[3],
            })
        }
        TAG_STRING => {
            let text = std::str::from_utf8(&frame[1..]).ok()?;
            match text.strip_prefix("b:") {
                Some(id) if !id.is_empty() => Some(PanelEvent::VirtualPress(id.to_string())),
                _ => Some(PanelEvent::Text(text.to_string())),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_terminator() {
        let bytes = encode_command("page 2").unwrap();
        assert_eq!(&bytes[..6], b"page 2");
        assert_eq!(&bytes[6..], &TERMINATOR);
    }

    #[test]
    fn encode_uses_single_byte_latin1() {
        let bytes = encode_command("t1.txt=\"72°\"").unwrap();
        assert!(bytes.contains(&0xB0));
        assert_eq!(bytes.len(), "t1.txt=\"72°\"".chars().count() + 3);
    }

    #[test]
    fn encode_rejects_terminator_and_wide_chars() {
        assert_eq!(
            encode_command("t0.txt=\"ÿ\""),
            Err(CodecError::ContainsTerminator(8))
        );
        assert_eq!(encode_command("→"), Err(CodecError::Unencodable('→')));
    }

    #[test]
    fn decode_is_left_inverse_of_encode() {
        for cmd in ["sendme", "j0.val=42", "t0.txt=\"--:--\"", "add 14,0,27"] {
            let mut dec = FrameDecoder::new();
            let frames = dec.push(&encode_command(cmd).unwrap());
            assert_eq!(frames, vec![cmd.as_bytes().to_vec()]);
            assert_eq!(dec.pending(), 0);
        }
    }

    #[test]
    fn decode_is_chunk_size_independent() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0x66, 0x02, 0xFF, 0xFF, 0xFF]);
        stream.extend_from_slice(&[0x65, 0x00, 0x10, 0x00, 0xFF, 0xFF, 0xFF]);
        stream.extend_from_slice(b"\x70b:acr\xFF\xFF\xFF");
        stream.extend_from_slice(&[0x1A, 0xFF, 0xFF, 0xFF]);

        let whole = FrameDecoder::new().push(&stream);
        assert_eq!(whole.len(), 4);

        for chunk in 1..=stream.len() {
            let mut dec = FrameDecoder::new();
            let mut frames = Vec::new();
            for part in stream.chunks(chunk) {
                frames.extend(dec.push(part));
            }
            assert_eq!(frames, whole, "chunk size {chunk}");
        }
    }

    #[test]
    fn classify_known_tags() {
        assert_eq!(classify(&[0x66, 0x02]), Some(PanelEvent::PageReport(2)));
        assert_eq!(
            classify(&[0x65, 0x00, 0x10, 0x00]),
            Some(PanelEvent::Touch {
                page: 0,
                component: 16,
                event: 0
            })
        );
        assert_eq!(
            classify(b"\x70b:chargeOn"),
            Some(PanelEvent::VirtualPress("chargeOn".into()))
        );
        assert_eq!(classify(b"\x70hello"), Some(PanelEvent::Text("hello".into())));
    }

    #[test]
    fn classify_drops_unknown_and_truncated() {
        assert_eq!(classify(&[0x1A]), None);
        assert_eq!(classify(&[0x66]), None);
        assert_eq!(classify(&[0x65, 0x00, 0x10]), None);
        assert_eq!(classify(&[0x70, 0xC3]), None);
    }

    #[test]
    fn unknown_frames_do_not_desynchronize() {
        let mut dec = FrameDecoder::new();
        let frames = dec.push(&[0x00, 0x01, 0xFF, 0xFF, 0xFF, 0x66, 0x03, 0xFF, 0xFF, 0xFF]);
        let events: Vec<_> = frames.iter().filter_map(|f| classify(f)).collect();
        assert_eq!(events, vec![PanelEvent::PageReport(3)]);
    }

    #[test]
    fn oversized_partial_frame_is_discarded() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push(&vec![0x41; MAX_PENDING + 10]).is_empty());
        assert_eq!(dec.overflows(), 1);
        let frames = dec.push(&[0xFF, 0xFF, 0xFF, 0x66, 0x01, 0xFF, 0xFF, 0xFF]);
        let events: Vec<_> = frames.iter().filter_map(|f| classify(f)).collect();
        assert_eq!(events.last(), Some(&PanelEvent::PageReport(1)));
    }
}
