//! Adapter capabilities
//!
//! Identification, bus initialisation and protocol negotiation differ per
//! adapter family. The engine holds one [`Adapter`] value and drives it
//! through the framer it owns.

use crate::error::ObdError;
use crate::protocol::ObdProtocol;
use crate::transport::{ByteStream, Framer};
use tracing::{debug, info, warn};

/// Capability interface of an interface adapter
#[allow(async_fn_in_trait)]
pub trait Adapter {
    /// Short adapter family name
    fn name(&self) -> &str;

    /// Setup run once after the stream is attached
    async fn configure<S: ByteStream>(&mut self, _framer: &mut Framer<S>) -> Result<(), ObdError> {
        Ok(())
    }

    /// Ask the adapter to identify itself
    async fn identify<S: ByteStream>(&mut self, framer: &mut Framer<S>) -> Result<String, ObdError>;

    /// Slow (5 baud) bus initialisation
    async fn init_slow<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError>;

    /// Fast bus initialisation
    async fn init_fast<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError>;

    /// Select a bus protocol; `Ok(false)` when the adapter refuses it
    async fn set_protocol<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        protocol: ObdProtocol,
    ) -> Result<bool, ObdError>;

    /// Description of the protocol in use
    async fn get_protocol<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError>;

    /// Forget per-connection state
    fn reset(&mut self) {}
}

fn acknowledged(reply: &str) -> bool {
    // With echo still on the command precedes the OK
    reply.ends_with("OK")
}

/// ELM327 and compatible clones
#[derive(Debug, Default, Clone)]
pub struct Elm327 {
    version: Option<f64>,
}

impl Elm327 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Firmware version parsed from the last identify reply
    pub fn version(&self) -> Option<f64> {
        self.version
    }

    async fn toggle<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        command: &str,
        on: bool,
    ) -> Result<bool, ObdError> {
        let text = format!("{command}{}", u8::from(on));
        let reply = framer.send_control_command(&text).await?;
        let ok = acknowledged(&reply);
        if !ok {
            warn!("AT{} not acknowledged: {:?}", text, reply);
        }
        Ok(ok)
    }

    /// Turn command echo on or off
    pub async fn set_echo<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        on: bool,
    ) -> Result<bool, ObdError> {
        self.toggle(framer, "E", on).await
    }

    /// Show or hide message headers
    pub async fn set_headers<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        on: bool,
    ) -> Result<bool, ObdError> {
        self.toggle(framer, "H", on).await
    }

    /// Switch CAN auto-formatting on or off
    pub async fn set_can_autoformat<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        on: bool,
    ) -> Result<bool, ObdError> {
        self.toggle(framer, "CAF", on).await
    }
}

/// Version number after the last `v`, e.g. `ELM327 v1.5` -> 1.5
fn parse_version(reply: &str) -> Option<f64> {
    let (_, tail) = reply.rsplit_once('v')?;
    let digits: String = tail
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

impl Adapter for Elm327 {
    fn name(&self) -> &str {
        "ELM327"
    }

    async fn configure<S: ByteStream>(&mut self, framer: &mut Framer<S>) -> Result<(), ObdError> {
        self.init_slow(framer).await?;
        self.set_echo(framer, false).await?;
        self.set_headers(framer, false).await?;
        Ok(())
    }

    async fn identify<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError> {
        let reply = framer.send_control_command("I").await?;
        self.version = parse_version(&reply);
        info!("Adapter identifies as {:?} (version {:?})", reply, self.version);
        Ok(reply)
    }

    async fn init_slow<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError> {
        let reply = framer.send_control_command("SI").await?;
        debug!("Slow init: {:?}", reply);
        Ok(reply)
    }

    async fn init_fast<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError> {
        let reply = framer.send_control_command("FI").await?;
        debug!("Fast init: {:?}", reply);
        Ok(reply)
    }

    async fn set_protocol<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
        protocol: ObdProtocol,
    ) -> Result<bool, ObdError> {
        let reply = framer.send_control_command(&protocol.set_command()).await?;
        if !acknowledged(&reply) {
            warn!("Protocol {:?} refused: {:?}", protocol, reply);
            return Ok(false);
        }
        self.init_slow(framer).await?;
        Ok(true)
    }

    async fn get_protocol<S: ByteStream>(
        &mut self,
        framer: &mut Framer<S>,
    ) -> Result<String, ObdError> {
        framer.send_control_command("DP").await
    }

    fn reset(&mut self) {
        self.version = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStream;
    use std::time::Duration;

    fn framer(mock: &MockStream) -> Framer<MockStream> {
        let mut framer = Framer::new(Duration::from_millis(100));
        framer.attach(mock.clone());
        framer
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("ELM327 v1.5"), Some(1.5));
        assert_eq!(parse_version("ELM327 v2.1a"), Some(2.1));
        assert_eq!(parse_version("OBDLink"), None);
    }

    #[tokio::test]
    async fn test_configure_sequence() {
        let mock = MockStream::elm327();
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        elm.configure(&mut framer).await.unwrap();
        assert_eq!(mock.written(), vec!["ATSI", "ATE0", "ATH0"]);
    }

    #[tokio::test]
    async fn test_identify_records_version() {
        let mock = MockStream::elm327();
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        assert_eq!(elm.identify(&mut framer).await.unwrap(), "ELM327 v1.5");
        assert_eq!(elm.version(), Some(1.5));
        elm.reset();
        assert_eq!(elm.version(), None);
    }

    #[tokio::test]
    async fn test_set_protocol_runs_slow_init() {
        let mock = MockStream::elm327();
        mock.on("ATSP 6", "OK");
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        let ok = elm
            .set_protocol(&mut framer, ObdProtocol::Iso15765_4Can11bit500)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(mock.written(), vec!["ATSP 6", "ATSI"]);
    }

    #[tokio::test]
    async fn test_set_protocol_refused() {
        let mock = MockStream::elm327();
        mock.on("ATSP 9", "?");
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        let ok = elm
            .set_protocol(&mut framer, ObdProtocol::Iso15765_4Can29bit250)
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(mock.written(), vec!["ATSP 9"]);
    }

    #[tokio::test]
    async fn test_toggles() {
        let mock = MockStream::new();
        mock.on("ATCAF1", "OK");
        mock.on("ATH1", "?");
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        assert!(elm.set_can_autoformat(&mut framer, true).await.unwrap());
        assert!(!elm.set_headers(&mut framer, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_protocol() {
        let mock = MockStream::new();
        mock.on("ATDP", "AUTO, ISO 15765-4 (CAN 11/500)");
        let mut framer = framer(&mock);
        let mut elm = Elm327::new();

        let text = elm.get_protocol(&mut framer).await.unwrap();
        assert_eq!(text, "AUTO, ISO 15765-4 (CAN 11/500)");
    }
}
