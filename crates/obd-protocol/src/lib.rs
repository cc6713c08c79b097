//! OBD-II Protocol Implementation
//!
//! This crate talks to ELM327-compatible OBD-II adapters over a serial
//! byte-stream: it frames AT and PID requests, validates replies, decodes
//! parameter values and trouble codes and discovers supported PIDs.

mod adapter;
mod client;
mod codec;
mod config;
mod decoder;
mod dtc;
mod error;
mod logger;
pub mod mock;
mod pid;
mod protocol;
mod retry;
mod scanner;
mod transport;
pub mod units;

pub use adapter::{Adapter, Elm327};
pub use client::ObdClient;
pub use codec::{
    frame_checksum, tokenize, validate_checksum, validate_header, FrameCodec, RawFrame,
    DEFAULT_TOKEN_CAPACITY,
};
pub use self::config::EngineConfig;
pub use decoder::{decode, DecodedValue, PidResponse, ValueKind};
pub use dtc::{
    decode_trouble_codes, decode_trouble_codes_with, format_code, DtcCategory, DtcNotation,
    MilStatus, TroubleCode,
};
pub use error::{ErrorKind, ObdError};
pub use logger::{LogCategory, LogEntry, MemoryLog, ProtocolLog, TracingLog};
pub use pid::{Pid, POSITIVE_RESPONSE_OFFSET};
pub use protocol::ObdProtocol;
pub use retry::RetryPolicy;
pub use scanner::{decode_bitmap, SupportedScan, SupportedSet};
pub use transport::{
    clean_reply, ByteStream, Framer, SerialTransport, COMMAND_TERMINATOR, CONTROL_PREFIX,
    DEFAULT_READ_TIMEOUT_MS, PROMPT,
};
pub use units::to_imperial;

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}
