//! OBD-II Client for ELM327 Adapters
//!
//! The client owns the byte-stream, the adapter and all session state.
//! Every operation takes `&mut self`, so at most one request is ever in
//! flight on the channel.

use crate::adapter::{Adapter, Elm327};
use crate::codec::{FrameCodec, RawFrame};
use crate::config::EngineConfig;
use crate::decoder::{decode, PidResponse};
use crate::dtc::{decode_trouble_codes_with, MilStatus, TroubleCode};
use crate::error::ObdError;
use crate::logger::{Journal, LogCategory, ProtocolLog};
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use crate::scanner::{SupportedScan, SupportedSet};
use crate::transport::{ByteStream, Framer, SerialTransport};
use crate::units::to_imperial;
use std::fmt::Display;
use tracing::{debug, info, warn};

/// OBD-II client for communicating with an interface adapter
pub struct ObdClient<S: ByteStream, A: Adapter = Elm327> {
    framer: Framer<S>,
    adapter: A,
    codec: FrameCodec,
    config: EngineConfig,
    journal: Journal,
    /// Protocol last accepted by the adapter
    protocol: ObdProtocol,
    /// Code count from the last MIL status read
    last_dtc_count: Option<u8>,
}

impl ObdClient<SerialTransport, Elm327> {
    /// Open the configured serial device and set up an ELM327 on it
    pub async fn open_serial(config: EngineConfig) -> Result<Self, ObdError> {
        let stream = SerialTransport::open(&config.device, config.baud_rate)?;
        let mut client = Self::new(config, Elm327::new());
        client.connect(stream).await?;
        Ok(client)
    }
}

impl<S: ByteStream, A: Adapter> ObdClient<S, A> {
    /// Create a disconnected client
    pub fn new(config: EngineConfig, adapter: A) -> Self {
        info!("Creating OBD client for {} adapter", adapter.name());
        Self {
            framer: Framer::new(config.read_timeout()),
            adapter,
            codec: FrameCodec::new(config.enforce_checksum),
            config,
            journal: Journal::new(),
            protocol: ObdProtocol::Auto,
            last_dtc_count: None,
        }
    }

    /// Take ownership of `stream` and run the adapter setup
    ///
    /// A failed setup leaves the client disconnected and closes the stream.
    pub async fn connect(&mut self, stream: S) -> Result<(), ObdError> {
        if self.framer.is_open() {
            return Err(ObdError::InvalidRequest("already connected".into()));
        }
        self.framer.attach(stream);

        if let Err(err) = self.adapter.configure(&mut self.framer).await {
            self.journal
                .record(&format!("Adapter setup failed: {err}"), LogCategory::Error);
            self.disconnect();
            return Err(err);
        }
        self.journal.record("Connected", LogCategory::Other);
        Ok(())
    }

    /// Close the stream and forget session state
    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.framer.detach() {
            info!("Disconnecting OBD client");
            stream.close();
            self.adapter.reset();
            self.last_dtc_count = None;
            self.protocol = ObdProtocol::Auto;
            self.journal.record("Disconnected", LogCategory::Other);
        }
    }

    /// Check if client is connected
    pub fn is_connected(&self) -> bool {
        self.framer.is_open()
    }

    /// Attach a log sink; replaces any previous one
    pub fn set_logger(&mut self, logger: Box<dyn ProtocolLog>) {
        self.journal.set_sink(Some(logger));
    }

    pub fn clear_logger(&mut self) {
        self.journal.set_sink(None);
    }

    pub fn set_enforce_checksum(&mut self, enforce: bool) {
        self.codec.set_enforce_checksum(enforce);
        self.config.enforce_checksum = enforce;
    }

    pub fn enforce_checksum(&self) -> bool {
        self.codec.enforce_checksum()
    }

    pub fn set_imperial(&mut self, imperial: bool) {
        self.config.imperial_units = imperial;
    }

    pub fn is_imperial(&self) -> bool {
        self.config.imperial_units
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Code count remembered from the last MIL status read
    pub fn last_dtc_count(&self) -> Option<u8> {
        self.last_dtc_count
    }

    /// Record the outcome of a control exchange and pass it through
    fn note<T: Display>(&self, what: &str, result: Result<T, ObdError>) -> Result<T, ObdError> {
        match &result {
            Ok(reply) => self
                .journal
                .record(&format!("{what}: {reply}"), LogCategory::Inbound),
            Err(err) => self
                .journal
                .record(&format!("{what} failed: {err}"), LogCategory::Error),
        }
        result
    }

    /// Ask the adapter for its identity
    pub async fn identify(&mut self) -> Result<String, ObdError> {
        self.journal
            .record("Asking device for identity", LogCategory::Outbound);
        let result = self.adapter.identify(&mut self.framer).await;
        self.note("Identity", result)
    }

    pub async fn init_slow(&mut self) -> Result<String, ObdError> {
        self.journal
            .record("Asking device for initialisation (slow)", LogCategory::Outbound);
        let result = self.adapter.init_slow(&mut self.framer).await;
        self.note("Slow init", result)
    }

    pub async fn init_fast(&mut self) -> Result<String, ObdError> {
        self.journal
            .record("Asking device for initialisation (fast)", LogCategory::Outbound);
        let result = self.adapter.init_fast(&mut self.framer).await;
        self.note("Fast init", result)
    }

    /// Set the OBD protocol; `Ok(false)` when the adapter refuses it
    pub async fn set_protocol(&mut self, protocol: ObdProtocol) -> Result<bool, ObdError> {
        self.journal.record(
            &format!("Asking to change protocol to {:02X}", protocol.code()),
            LogCategory::Outbound,
        );
        let result = self.adapter.set_protocol(&mut self.framer, protocol).await;
        let accepted = self.note("Protocol change accepted", result)?;
        if accepted {
            self.protocol = protocol;
        }
        Ok(accepted)
    }

    /// Protocol description reported by the adapter
    pub async fn get_protocol(&mut self) -> Result<String, ObdError> {
        self.journal
            .record("Asking device for current protocol", LogCategory::Outbound);
        let result = self.adapter.get_protocol(&mut self.framer).await;
        self.note("Protocol", result)
    }

    /// Get the protocol last selected through [`set_protocol`](Self::set_protocol)
    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    /// Request `pid` and return the validated frame
    ///
    /// At most `capacity` reply tokens are kept.
    pub async fn request_parameter(
        &mut self,
        pid: Pid,
        capacity: usize,
    ) -> Result<RawFrame, ObdError> {
        self.request_frame(pid, capacity).await
    }

    async fn request_frame(&mut self, pid: Pid, capacity: usize) -> Result<RawFrame, ObdError> {
        if !self.is_connected() {
            return Err(ObdError::NotConnected);
        }
        let policy = self.config.retry;
        let mut attempt = 1;
        loop {
            let result = self
                .codec
                .request_parameter(&mut self.framer, &self.journal, pid, capacity)
                .await;
            match result {
                Err(err) if policy.should_retry(attempt, &err) => {
                    let delay = policy.delay(attempt);
                    warn!(
                        "PID {} request failed (attempt {}): {}, retrying in {:?}",
                        pid, attempt, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Query a PID and return the decoded response
    pub async fn read_parameter(&mut self, pid: Pid) -> Result<PidResponse, ObdError> {
        let frame = self.request_frame(pid, self.config.token_capacity).await?;

        let value = match decode(pid, &frame) {
            Ok(value) => value,
            Err(err) => {
                self.journal
                    .record(&format!("{pid}: {err}"), LogCategory::Error);
                return Err(err);
            }
        };
        let imperial = self.config.imperial_units;
        let value = if imperial { to_imperial(pid, value) } else { value };
        let unit = pid.unit(imperial);
        self.journal
            .record(&format!("{}: {} {}", pid.name(), value, unit), LogCategory::Inbound);

        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(PidResponse {
            pid,
            timestamp_ms,
            value,
            unit: unit.to_string(),
            raw_bytes: frame.as_bytes().to_vec(),
        })
    }

    /// Read the MIL state and stored code count
    ///
    /// The count is remembered for [`read_trouble_codes`](Self::read_trouble_codes).
    pub async fn mil_status(&mut self) -> Result<MilStatus, ObdError> {
        self.journal.record("Requesting MIL status", LogCategory::Other);
        let status = self
            .request_frame(Pid::DTC_STATUS, self.config.token_capacity)
            .await
            .and_then(|frame| MilStatus::from_frame(&frame));

        match &status {
            Ok(status) => {
                self.last_dtc_count = Some(status.dtc_count);
                self.journal.record(
                    &format!(
                        "MIL {}, {} stored codes",
                        if status.mil_on { "on" } else { "off" },
                        status.dtc_count
                    ),
                    LogCategory::Inbound,
                );
            }
            Err(err) => {
                self.last_dtc_count = None;
                self.journal
                    .record(&format!("MIL status failed: {err}"), LogCategory::Error);
            }
        }
        status
    }

    /// Read stored trouble codes
    ///
    /// Uses the count from the last [`mil_status`](Self::mil_status). With no
    /// codes reported nothing is sent and the result is empty.
    pub async fn read_trouble_codes(&mut self) -> Result<Vec<TroubleCode>, ObdError> {
        let count = usize::from(self.last_dtc_count.unwrap_or(0));
        if count == 0 {
            self.journal
                .record("No trouble codes have been reported", LogCategory::Other);
            return Ok(Vec::new());
        }

        // One header byte per line of three codes, plus two bytes per code
        let needed = 1 + 2 * count + (count - 1) / 3;
        let capacity = self.config.token_capacity.max(needed);
        let frame = self.request_frame(Pid::READ_DTC, capacity).await?;

        match decode_trouble_codes_with(&frame, count, self.config.dtc_notation) {
            Ok(codes) => {
                let list: Vec<&str> = codes.iter().map(TroubleCode::as_str).collect();
                self.journal
                    .record(&format!("Trouble codes: {}", list.join(" ")), LogCategory::Inbound);
                Ok(codes)
            }
            Err(err) => {
                self.journal
                    .record(&format!("Trouble code decode failed: {err}"), LogCategory::Error);
                Err(err)
            }
        }
    }

    /// Ask the ECU to clear stored codes and switch off the MIL
    pub async fn clear_trouble_codes(&mut self) -> Result<(), ObdError> {
        self.journal
            .record("Requesting clearing of trouble codes", LogCategory::Other);
        self.request_frame(Pid::CLEAR_DTC, self.config.token_capacity)
            .await?;
        self.last_dtc_count = Some(0);
        self.journal
            .record("Trouble codes cleared", LogCategory::Inbound);
        Ok(())
    }

    /// Discover which PIDs of `mode` the vehicle supports
    pub async fn scan_supported(&mut self, mode: u8) -> Result<SupportedSet, ObdError> {
        self.journal.record(
            &format!("Scanning supported PIDs for mode {mode:02X}"),
            LogCategory::Other,
        );
        let mut scan = SupportedScan::new(mode);
        while let Some(pid) = scan.next_request() {
            let frame = self.request_frame(pid, self.config.token_capacity).await?;
            if let Err(err) = scan.accept(&frame) {
                self.journal
                    .record(&format!("{pid}: {err}"), LogCategory::Error);
                return Err(err);
            }
        }
        let supported = scan.finish();
        debug!("Mode {:02X}: {} supported PIDs", mode, supported.len());
        self.journal.record(
            &format!("{} supported PIDs", supported.len()),
            LogCategory::Inbound,
        );
        Ok(supported)
    }
}

impl<S: ByteStream, A: Adapter> Drop for ObdClient<S, A> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedValue;
    use crate::dtc::DtcNotation;
    use crate::logger::MemoryLog;
    use crate::mock::MockStream;
    use crate::retry::RetryPolicy;

    async fn connected(config: EngineConfig) -> (ObdClient<MockStream>, MockStream) {
        let mock = MockStream::elm327();
        let mut client = ObdClient::new(config, Elm327::new());
        client.connect(mock.clone()).await.unwrap();
        (client, mock)
    }

    #[tokio::test]
    async fn test_connect_configures_adapter() {
        let (client, mock) = connected(EngineConfig::default()).await;
        assert!(client.is_connected());
        assert_eq!(mock.written(), vec!["ATSI", "ATE0", "ATH0"]);
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let (mut client, _mock) = connected(EngineConfig::default()).await;
        let err = client.connect(MockStream::elm327()).await.unwrap_err();
        assert!(matches!(err, ObdError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_setup_disconnects() {
        let mock = MockStream::new();
        let mut client: ObdClient<MockStream> =
            ObdClient::new(EngineConfig::default(), Elm327::new());
        let err = client.connect(mock.clone()).await.unwrap_err();
        assert!(matches!(err, ObdError::Timeout(_)));
        assert!(!client.is_connected());
        assert!(!mock.is_open());
    }

    #[tokio::test]
    async fn test_disconnect_and_drop_close_stream() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        client.disconnect();
        assert!(!client.is_connected());
        assert!(!mock.is_open());

        let err = client.read_parameter(Pid::RPM).await.unwrap_err();
        assert!(matches!(err, ObdError::NotConnected));

        let (client, mock) = connected(EngineConfig::default()).await;
        drop(client);
        assert!(!mock.is_open());
    }

    #[tokio::test]
    async fn test_read_rpm() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("010C", "41 0C 1A 2B");

        let response = client.read_parameter(Pid::RPM).await.unwrap();
        assert_eq!(response.pid, Pid::RPM);
        assert_eq!(response.value, DecodedValue::Numeric(1674.75));
        assert_eq!(response.unit, "rpm");
        assert_eq!(response.raw_bytes, vec![0x41, 0x0C, 0x1A, 0x2B]);
    }

    #[tokio::test]
    async fn test_imperial_coolant() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("0105", "41 05 5A");

        let metric = client.read_parameter(Pid::ECT).await.unwrap();
        assert_eq!(metric.value, DecodedValue::Numeric(50.0));
        assert_eq!(metric.unit, "°C");

        client.set_imperial(true);
        let imperial = client.read_parameter(Pid::ECT).await.unwrap();
        assert_eq!(imperial.value, DecodedValue::Numeric(122.0));
        assert_eq!(imperial.unit, "°F");
    }

    #[tokio::test]
    async fn test_header_mismatch_logged() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        let log = MemoryLog::new();
        client.set_logger(Box::new(log.clone()));
        mock.on("010D", "41 0C 1A 2B");

        let err = client.read_parameter(Pid::VSS).await.unwrap_err();
        assert!(matches!(err, ObdError::HeaderMismatch { .. }));
        assert_eq!(log.count(LogCategory::Outbound), 1);
        assert_eq!(log.count(LogCategory::Inbound), 1);
        assert_eq!(log.count(LogCategory::Error), 1);
    }

    #[tokio::test]
    async fn test_checksum_enforcement_toggle() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        // 0x41 + 0x05 + 0x5A = 0xA0
        mock.on("0105", "41 05 5A A0");
        client.set_enforce_checksum(true);
        assert!(client.enforce_checksum());

        let response = client.read_parameter(Pid::ECT).await.unwrap();
        assert_eq!(response.raw_bytes, vec![0x41, 0x05, 0x5A]);

        mock.on("0105", "41 05 5A A1");
        let err = client.read_parameter(Pid::ECT).await.unwrap_err();
        assert!(matches!(err, ObdError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_pid_is_not_zero() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("0120", "41 20 80 00 00 00");
        let err = client.read_parameter(Pid(0x0120)).await.unwrap_err();
        assert!(matches!(err, ObdError::UnsupportedParameter(0x0120)));
    }

    #[tokio::test]
    async fn test_adapter_status_reported() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("010C", "SEARCHING... NO DATA");
        let err = client.read_parameter(Pid::RPM).await.unwrap_err();
        assert!(matches!(err, ObdError::AdapterReported(_)));
        assert_eq!(mock.written().iter().filter(|c| *c == "010C").count(), 1);
    }

    #[tokio::test]
    async fn test_retry_on_communication_error() {
        let config = EngineConfig {
            retry: RetryPolicy::new(3, 1),
            ..Default::default()
        };
        let (mut client, mock) = connected(config).await;
        mock.on("010D", "41 0D 3C");
        mock.once("010D", "NO DATA");

        let response = client.read_parameter(Pid::VSS).await.unwrap();
        assert_eq!(response.value, DecodedValue::Numeric(60.0));
        assert_eq!(mock.written().iter().filter(|c| *c == "010D").count(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_validation_error() {
        let config = EngineConfig {
            retry: RetryPolicy::new(3, 1),
            ..Default::default()
        };
        let (mut client, mock) = connected(config).await;
        mock.on("010D", "41 0C 3C");

        assert!(client.read_parameter(Pid::VSS).await.is_err());
        assert_eq!(mock.written().iter().filter(|c| *c == "010D").count(), 1);
    }

    #[tokio::test]
    async fn test_trouble_code_flow() {
        let (mut client, mock) = connected(EngineConfig::default()).await;

        // No MIL status yet: nothing is requested
        assert!(client.read_trouble_codes().await.unwrap().is_empty());
        assert!(!mock.written().contains(&"03".to_string()));

        mock.on("0101", "41 01 82 07 E5 00");
        let status = client.mil_status().await.unwrap();
        assert!(status.mil_on);
        assert_eq!(client.last_dtc_count(), Some(2));

        mock.on("03", "43 43 45 01 33 00 00");
        let codes = client.read_trouble_codes().await.unwrap();
        let codes: Vec<&str> = codes.iter().map(TroubleCode::as_str).collect();
        assert_eq!(codes, vec!["C0369", "P0151"]);

        mock.on("04", "44");
        client.clear_trouble_codes().await.unwrap();
        assert_eq!(client.last_dtc_count(), Some(0));
    }

    #[tokio::test]
    async fn test_trouble_codes_hex_notation() {
        let config = EngineConfig {
            dtc_notation: DtcNotation::Hex,
            ..Default::default()
        };
        let (mut client, mock) = connected(config).await;
        mock.on("0101", "41 01 81 07 E5 00");
        mock.on("03", "43 43 45 00 00 00 00");
        client.mil_status().await.unwrap();

        let codes = client.read_trouble_codes().await.unwrap();
        assert_eq!(codes[0].as_str(), "C0345");
    }

    #[tokio::test]
    async fn test_clear_rejected() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("04", "7F 04 22");
        let err = client.clear_trouble_codes().await.unwrap_err();
        assert!(matches!(err, ObdError::HeaderMismatch { .. }));
    }

    #[tokio::test]
    async fn test_scan_supported() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("0100", "41 00 BE 1F A8 13");
        mock.on("0120", "41 20 80 00 00 00");

        let set = client.scan_supported(1).await.unwrap();
        assert!(set.contains(&Pid::RPM));
        assert!(set.contains(&Pid::ECT));
        assert!(set.contains(&Pid(0x0120)));
        assert!(!set.contains(&Pid(0x0140)));
        assert!(!mock.written().contains(&"0140".to_string()));
    }

    #[tokio::test]
    async fn test_scan_fails_on_block_error() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("0100", "41 00 BE 1F A8 13");
        mock.on("0120", "NO DATA");
        let err = client.scan_supported(1).await.unwrap_err();
        assert!(matches!(err, ObdError::AdapterReported(_)));
    }

    #[tokio::test]
    async fn test_identify_and_protocol() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        mock.on("ATSP 6", "OK");
        mock.on("ATDP", "ISO 15765-4 (CAN 11/500)");

        assert_eq!(client.identify().await.unwrap(), "ELM327 v1.5");
        assert_eq!(client.adapter().version(), Some(1.5));

        assert!(client
            .set_protocol(ObdProtocol::Iso15765_4Can11bit500)
            .await
            .unwrap());
        assert_eq!(client.protocol(), ObdProtocol::Iso15765_4Can11bit500);
        assert_eq!(client.get_protocol().await.unwrap(), "ISO 15765-4 (CAN 11/500)");
    }

    #[tokio::test]
    async fn test_works_without_logger() {
        let (mut client, mock) = connected(EngineConfig::default()).await;
        let log = MemoryLog::new();
        client.set_logger(Box::new(log.clone()));
        client.clear_logger();
        mock.on("010C", "41 0C 1A 2B");
        client.read_parameter(Pid::RPM).await.unwrap();
        assert!(log.entries().is_empty());
    }
}
