//! Frame Codec
//!
//! Encodes a PID as an ASCII-hex request, tokenizes the adapter reply into
//! bytes and validates the echoed header and optional trailing checksum.

use crate::error::ObdError;
use crate::logger::{Journal, LogCategory};
use crate::pid::{Pid, POSITIVE_RESPONSE_OFFSET};
use crate::transport::{ByteStream, Framer};
use tracing::debug;

/// Default number of reply bytes kept per request
pub const DEFAULT_TOKEN_CAPACITY: usize = 40;

/// Progress text some adapters print before the first reply
const SEARCHING: &str = "SEARCHING...";

/// Line printed after a successful ISO 9141 / KWP bus initialisation
const BUS_INIT_OK: &str = "BUS INIT: ...OK";

/// Adapter status replies that carry no data
const ADAPTER_MESSAGES: &[&str] = &[
    "NO DATA",
    "UNABLE TO CONNECT",
    "CAN ERROR",
    "BUS INIT: ...ERROR",
    "BUS BUSY",
    "BUS ERROR",
    "DATA ERROR",
    "FB ERROR",
    "STOPPED",
    "BUFFER FULL",
    "ERR",
];

/// Bytes of one tokenized adapter reply
///
/// Indices 0 and 1 are usually the echoed mode/PID, payload starts at 2.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte at `index`, or a malformed-response error
    pub fn byte(&self, index: usize) -> Result<u8, ObdError> {
        self.bytes
            .get(index)
            .copied()
            .ok_or_else(|| ObdError::missing_byte(index, self.bytes.len()))
    }

    /// Big-endian 16-bit value at `index` and `index + 1`
    pub fn word(&self, index: usize) -> Result<u16, ObdError> {
        Ok(u16::from(self.byte(index)?) << 8 | u16::from(self.byte(index + 1)?))
    }

    /// Big-endian 32-bit value at `index..index + 4`
    pub fn dword(&self, index: usize) -> Result<u32, ObdError> {
        Ok(u32::from(self.word(index)?) << 16 | u32::from(self.word(index + 2)?))
    }

    /// Bytes from index 2 onward
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(2..).unwrap_or(&[])
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

fn parse_hex_byte(token: &str) -> Result<u8, ObdError> {
    u8::from_str_radix(token, 16)
        .map_err(|_| ObdError::MalformedResponse(format!("invalid hex token {token:?}")))
}

/// Tokenize a cleaned reply into at most `capacity` bytes
///
/// Tokens are separated by whitespace. A token longer than two digits is
/// read as packed byte pairs (adapters with spaces turned off). Line
/// indices such as `0:` are skipped.
pub fn tokenize(reply: &str, capacity: usize) -> Result<RawFrame, ObdError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ObdError::MalformedResponse("empty response".into()));
    }
    let upper = reply.to_ascii_uppercase();
    if upper == "?" || ADAPTER_MESSAGES.iter().any(|m| upper.contains(m)) {
        return Err(ObdError::AdapterReported(reply.to_string()));
    }

    let body = upper.replace(BUS_INIT_OK, " ");
    let mut bytes = Vec::new();
    for token in body.split_whitespace() {
        if bytes.len() >= capacity {
            break;
        }
        if token.eq_ignore_ascii_case(SEARCHING) || token.ends_with(':') {
            continue;
        }
        if token.len() <= 2 {
            bytes.push(parse_hex_byte(token)?);
            continue;
        }
        if token.len() % 2 != 0 || !token.is_ascii() {
            return Err(ObdError::MalformedResponse(format!(
                "invalid hex token {token:?}"
            )));
        }
        for pair in token.as_bytes().chunks(2) {
            if bytes.len() >= capacity {
                break;
            }
            // Pairs of ASCII bytes are valid UTF-8
            let pair = std::str::from_utf8(pair).unwrap_or_default();
            bytes.push(parse_hex_byte(pair)?);
        }
    }

    if bytes.is_empty() {
        return Err(ObdError::MalformedResponse(format!(
            "no data bytes in {reply:?}"
        )));
    }
    Ok(RawFrame::new(bytes))
}

/// Check the echoed header against the request
///
/// The header occupies the first `scale_bytes` tokens and must equal
/// `pid + 64 * 256^(scale_bytes - 1)`.
pub fn validate_header(pid: Pid, frame: &RawFrame) -> Result<(), ObdError> {
    let scale = pid.scale_bytes();
    if frame.len() < scale {
        return Err(ObdError::MalformedResponse(format!(
            "header needs {} bytes, frame has {}",
            scale,
            frame.len()
        )));
    }
    let actual = &frame.as_bytes()[..scale];
    let Some(expected) = pid.expected_header() else {
        // The offset carries out of the first header byte, no reply can match
        return Err(ObdError::HeaderMismatch {
            expected: carried_header(pid),
            actual: actual.to_vec(),
        });
    };
    if actual != expected.as_slice() {
        return Err(ObdError::HeaderMismatch {
            expected,
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Header with the offset carry kept as an extra leading byte
fn carried_header(pid: Pid) -> Vec<u8> {
    let scale = pid.scale_bytes();
    let mut header = vec![0u8; scale];
    for (i, byte) in pid.0.to_be_bytes().iter().rev().take(scale).enumerate() {
        header[scale - 1 - i] = *byte;
    }
    let (first, carry) = header[0].overflowing_add(POSITIVE_RESPONSE_OFFSET);
    header[0] = first;
    if carry {
        header.insert(0, 0x01);
    }
    header
}

/// Sum of bytes modulo 256
pub fn frame_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Verify and strip the trailing checksum byte
///
/// The frame must hold the header plus the checksum byte.
pub fn validate_checksum(pid: Pid, frame: RawFrame) -> Result<RawFrame, ObdError> {
    let needed = pid.scale_bytes() + 1;
    if frame.len() < needed {
        return Err(ObdError::MalformedResponse(format!(
            "checksum needs {} bytes, frame has {}",
            needed,
            frame.len()
        )));
    }
    let mut bytes = frame.bytes;
    let actual = bytes.pop().unwrap_or_default();
    let expected = frame_checksum(&bytes);
    if actual != expected {
        return Err(ObdError::ChecksumMismatch { expected, actual });
    }
    Ok(RawFrame::new(bytes))
}

/// Request encoding and reply validation
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    enforce_checksum: bool,
}

impl FrameCodec {
    pub fn new(enforce_checksum: bool) -> Self {
        Self { enforce_checksum }
    }

    pub fn enforce_checksum(&self) -> bool {
        self.enforce_checksum
    }

    pub fn set_enforce_checksum(&mut self, enforce: bool) {
        self.enforce_checksum = enforce;
    }

    /// Tokenize and validate a reply to `pid`
    pub fn parse_reply(
        &self,
        pid: Pid,
        reply: &str,
        capacity: usize,
    ) -> Result<RawFrame, ObdError> {
        let frame = tokenize(reply, capacity)?;
        validate_header(pid, &frame)?;
        if self.enforce_checksum {
            validate_checksum(pid, frame)
        } else {
            Ok(frame)
        }
    }

    /// Send a PID request and return the validated reply
    pub async fn request_parameter<S: ByteStream>(
        &self,
        framer: &mut Framer<S>,
        journal: &Journal,
        pid: Pid,
        capacity: usize,
    ) -> Result<RawFrame, ObdError> {
        let request = pid.request_hex();
        journal.record(&request, LogCategory::Outbound);

        let reply = match framer.send_raw(request.as_bytes()).await {
            Ok(reply) => reply,
            Err(err) => {
                journal.record(&format!("{request}: {err}"), LogCategory::Error);
                return Err(err);
            }
        };
        journal.record(&format!("Raw data: {reply}"), LogCategory::Inbound);

        let result = self.parse_reply(pid, &reply, capacity);
        match &result {
            Ok(frame) => debug!("{} -> {} bytes", pid, frame.len()),
            Err(err) => journal.record(&format!("{request}: {err}"), LogCategory::Error),
        }
        result
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(false)
    }
}
