//! Transport Framer
//!
//! Wraps commands for the adapter, writes them to the byte-stream and reads
//! the reply up to the prompt sentinel.

use crate::error::ObdError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// Prefix for adapter control commands
pub const CONTROL_PREFIX: &str = "AT";

/// Terminates every outbound command
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Prompt byte the adapter sends once a reply is complete
pub const PROMPT: u8 = b'>';

/// Default read timeout
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Byte-stream the framer talks through
///
/// `read_until` returns the bytes received before `sentinel`; the sentinel
/// itself is consumed and not returned.
#[allow(async_fn_in_trait)]
pub trait ByteStream {
    /// Write bytes, returning how many were accepted
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, ObdError>;

    /// Read until `sentinel` is seen or `timeout` elapses
    async fn read_until(&mut self, sentinel: u8, timeout: Duration) -> Result<Vec<u8>, ObdError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Serial port transport for ELM-style adapters
pub struct SerialTransport {
    port: Option<SerialStream>,
    /// Bytes read past the last sentinel
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial device (e.g. "/dev/ttyUSB0" or "COM3")
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening serial port {} at {} baud", device, baud_rate);
        let port = tokio_serial::new(device, baud_rate).open_native_async()?;
        Ok(Self {
            port: Some(port),
            pending: Vec::new(),
        })
    }
}

async fn read_frame(
    port: &mut SerialStream,
    pending: &mut Vec<u8>,
    sentinel: u8,
) -> Result<Vec<u8>, ObdError> {
    let mut chunk = [0u8; 64];
    loop {
        if let Some(pos) = pending.iter().position(|&b| b == sentinel) {
            let mut reply: Vec<u8> = pending.drain(..=pos).collect();
            reply.pop();
            return Ok(reply);
        }
        let n = port.read(&mut chunk).await?;
        if n == 0 {
            return Err(ObdError::Communication("serial port closed".into()));
        }
        pending.extend_from_slice(&chunk[..n]);
    }
}

impl ByteStream for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, ObdError> {
        let port = self.port.as_mut().ok_or(ObdError::NotConnected)?;
        // Anything left over belongs to an earlier, abandoned reply
        self.pending.clear();
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(bytes.len())
    }

    async fn read_until(&mut self, sentinel: u8, timeout: Duration) -> Result<Vec<u8>, ObdError> {
        let port = self.port.as_mut().ok_or(ObdError::NotConnected)?;
        tokio::time::timeout(timeout, read_frame(port, &mut self.pending, sentinel))
            .await
            .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))?
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port closed");
        }
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// Replace control characters with spaces and trim the result
pub fn clean_reply(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if b.is_ascii_control() { ' ' } else { b as char })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Owns the byte-stream while connected and frames every exchange
pub struct Framer<S> {
    stream: Option<S>,
    timeout: Duration,
}

impl<S: ByteStream> Framer<S> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            stream: None,
            timeout,
        }
    }

    pub fn attach(&mut self, stream: S) {
        self.stream = Some(stream);
    }

    /// Release the stream without closing it
    pub fn detach(&mut self) -> Option<S> {
        self.stream.take()
    }

    pub fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_open())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send `AT<text>` and return the cleaned reply
    pub async fn send_control_command(&mut self, text: &str) -> Result<String, ObdError> {
        let command = format!("{CONTROL_PREFIX}{text}");
        self.send_raw(command.as_bytes()).await
    }

    /// Send bytes as one command and return the cleaned reply
    ///
    /// A short or failed write is a communication error and no read is
    /// attempted.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<String, ObdError> {
        let timeout = self.timeout;
        let stream = self
            .stream
            .as_mut()
            .filter(|s| s.is_open())
            .ok_or(ObdError::NotConnected)?;

        let mut command = Vec::with_capacity(bytes.len() + 1);
        command.extend_from_slice(bytes);
        command.push(COMMAND_TERMINATOR);

        debug!("Sending {:?}", String::from_utf8_lossy(bytes));
        let written = stream.write(&command).await?;
        if written != command.len() {
            return Err(ObdError::Communication(format!(
                "short write: {} of {} bytes",
                written,
                command.len()
            )));
        }

        let raw = stream.read_until(PROMPT, timeout).await?;
        let reply = clean_reply(&raw);
        debug!("Received {:?}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStream;

    fn framer(mock: &MockStream) -> Framer<MockStream> {
        let mut framer = Framer::new(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS));
        framer.attach(mock.clone());
        framer
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply(b"\r\rELM327 v1.5\r\r"), "ELM327 v1.5");
        assert_eq!(clean_reply(b"41 0C\r41 0D\n"), "41 0C 41 0D");
        assert_eq!(clean_reply(b"\r\n\t"), "");
    }

    #[tokio::test]
    async fn test_control_command_prefixed_and_terminated() {
        let mock = MockStream::new();
        mock.on("ATI", "ELM327 v1.5");
        let mut framer = framer(&mock);

        let reply = framer.send_control_command("I").await.unwrap();
        assert_eq!(reply, "ELM327 v1.5");
        assert_eq!(mock.written_raw(), vec![b"ATI\r".to_vec()]);
    }

    #[tokio::test]
    async fn test_raw_command_not_prefixed() {
        let mock = MockStream::new();
        mock.on("010C", "41 0C 1A 2B");
        let mut framer = framer(&mock);

        let reply = framer.send_raw(b"010C").await.unwrap();
        assert_eq!(reply, "41 0C 1A 2B");
        assert_eq!(mock.written(), vec!["010C".to_string()]);
    }

    #[tokio::test]
    async fn test_write_failure_skips_read() {
        let mock = MockStream::new();
        mock.on("ATZ", "ELM327 v1.5");
        mock.fail_writes(true);
        let mut framer = framer(&mock);

        let err = framer.send_control_command("Z").await.unwrap_err();
        assert!(matches!(err, ObdError::Communication(_)));
        assert_eq!(mock.reads(), 0);
    }

    #[tokio::test]
    async fn test_short_write_skips_read() {
        let mock = MockStream::new();
        mock.on("ATZ", "ELM327 v1.5");
        mock.short_writes(true);
        let mut framer = framer(&mock);

        let err = framer.send_control_command("Z").await.unwrap_err();
        assert!(matches!(err, ObdError::Communication(msg) if msg.contains("short write")));
        assert_eq!(mock.reads(), 0);
    }

    #[tokio::test]
    async fn test_silence_is_timeout() {
        let mock = MockStream::new();
        let mut framer = framer(&mock);

        let err = framer.send_raw(b"0105").await.unwrap_err();
        assert!(matches!(err, ObdError::Timeout(5000)));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut framer: Framer<MockStream> = Framer::new(Duration::from_millis(100));
        let err = framer.send_raw(b"0105").await.unwrap_err();
        assert!(matches!(err, ObdError::NotConnected));

        let mock = MockStream::new();
        mock.set_open(false);
        framer.attach(mock);
        assert!(!framer.is_open());
        let err = framer.send_raw(b"0105").await.unwrap_err();
        assert!(matches!(err, ObdError::NotConnected));
    }
}
