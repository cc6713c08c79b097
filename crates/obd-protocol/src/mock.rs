//! Scripted byte-stream for tests.
//!
//! Replies are keyed by command text (without the carriage return). A
//! command with no scripted reply stays silent, which the framer sees as a
//! read timeout. Clones share state, so a test can keep a handle after
//! giving the stream to an engine.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::ObdError;
use crate::transport::{ByteStream, COMMAND_TERMINATOR};

#[derive(Debug, Default)]
struct MockState {
    /// One-shot replies, consumed before `persistent`
    queued: HashMap<String, VecDeque<String>>,
    persistent: HashMap<String, String>,
    written: Vec<Vec<u8>>,
    last_command: Option<String>,
    reads: usize,
    fail_writes: bool,
    short_writes: bool,
    open: bool,
}

/// In-memory adapter with scripted replies and write recording
#[derive(Debug, Clone)]
pub struct MockStream {
    state: Arc<Mutex<MockState>>,
}

impl MockStream {
    /// An open stream with nothing scripted
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..MockState::default()
            })),
        }
    }

    /// An open stream that acknowledges the ELM327 setup commands
    pub fn elm327() -> Self {
        let mock = Self::new();
        mock.on("ATSI", "BUS INIT: ...OK");
        mock.on("ATE0", "ATE0 OK");
        mock.on("ATH0", "OK");
        mock.on("ATI", "ELM327 v1.5");
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reply to `command` every time it is sent
    pub fn on(&self, command: &str, reply: &str) {
        self.state()
            .persistent
            .insert(command.to_string(), reply.to_string());
    }

    /// Reply to the next send of `command` only
    pub fn once(&self, command: &str, reply: &str) {
        self.state()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
    }

    /// Stop replying to `command`
    pub fn forget(&self, command: &str) {
        let mut state = self.state();
        state.persistent.remove(command);
        state.queued.remove(command);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Accept one byte less than requested
    pub fn short_writes(&self, short: bool) {
        self.state().short_writes = short;
    }

    pub fn set_open(&self, open: bool) {
        self.state().open = open;
    }

    /// Commands written so far, terminator stripped
    pub fn written(&self) -> Vec<String> {
        self.state()
            .written
            .iter()
            .map(|bytes| {
                let text = String::from_utf8_lossy(bytes);
                text.trim_end_matches(COMMAND_TERMINATOR as char).to_string()
            })
            .collect()
    }

    /// Exact bytes written so far
    pub fn written_raw(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Number of read attempts
    pub fn reads(&self) -> usize {
        self.state().reads
    }
}

impl Default for MockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStream for MockStream {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, ObdError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(ObdError::Communication("mock write failure".into()));
        }
        state.written.push(bytes.to_vec());
        let text = String::from_utf8_lossy(bytes);
        state.last_command = Some(text.trim_end_matches(COMMAND_TERMINATOR as char).to_string());
        if state.short_writes {
            Ok(bytes.len().saturating_sub(1))
        } else {
            Ok(bytes.len())
        }
    }

    async fn read_until(&mut self, _sentinel: u8, timeout: Duration) -> Result<Vec<u8>, ObdError> {
        let mut state = self.state();
        state.reads += 1;
        let command = state.last_command.take().unwrap_or_default();

        let queued = state
            .queued
            .get_mut(&command)
            .and_then(|replies| replies.pop_front());
        let reply = queued.or_else(|| state.persistent.get(&command).cloned());

        match reply {
            // Adapters end each line with CR and a blank line before the prompt
            Some(text) => Ok(format!("{text}\r\r").into_bytes()),
            None => Err(ObdError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn is_open(&self) -> bool {
        self.state().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_once_before_persistent() {
        let mut mock = MockStream::new();
        mock.on("0105", "41 05 5A");
        mock.once("0105", "NO DATA");

        mock.write(b"0105\r").await.unwrap();
        let first = mock.read_until(b'>', Duration::from_millis(10)).await.unwrap();
        assert_eq!(first, b"NO DATA\r\r");

        mock.write(b"0105\r").await.unwrap();
        let second = mock.read_until(b'>', Duration::from_millis(10)).await.unwrap();
        assert_eq!(second, b"41 05 5A\r\r");
        assert_eq!(mock.reads(), 2);
    }

    #[tokio::test]
    async fn test_records_writes_and_close() {
        let mut mock = MockStream::new();
        let handle = mock.clone();
        mock.write(b"ATZ\r").await.unwrap();
        assert_eq!(handle.written(), vec!["ATZ".to_string()]);

        mock.close();
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_forget_silences_command() {
        let mut mock = MockStream::elm327();
        mock.forget("ATI");
        mock.write(b"ATI\r").await.unwrap();
        let err = mock.read_until(b'>', Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, ObdError::Timeout(10)));
    }
}
