// CCM21-i / CCM15 gateway HTTP client
//
// The gateway exposes a single status endpoint. It answers a JSON array
// with one entry per unit address; occupied addresses carry the 7 status
// bytes as hex, empty ones carry "-".

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::de;
use crate::error::Error;
use crate::local::protocol::{self, STATUS_LEN, UnitStatus};
use crate::transport::TransportConfig;

const STATUS_PATH: &str = "/get_mbdata_all.jsn";
const STATUS_FORM: [(&str, &str); 2] = [("_web_cmd", "get_mbdata_all"), ("_ajax", "1")];

/// One entry of the gateway status array.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEntry {
    #[serde(deserialize_with = "de::u8_from_any")]
    pub addr: u8,
    #[serde(rename = "Data", default)]
    pub data: Option<String>,
}

impl GatewayEntry {
    /// Decode the hex payload into status bytes.
    ///
    /// Returns `None` for empty slots. Malformed payloads are reported as
    /// `Err` with a short reason.
    pub fn status_bytes(&self) -> Result<Option<[u8; STATUS_LEN]>, String> {
        let raw = match self.data.as_deref().map(str::trim) {
            None | Some("" | "-") => return Ok(None),
            Some(raw) => raw,
        };

        let clean: String = raw
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        let bytes = hex::decode(&clean).map_err(|e| format!("invalid hex {raw:?}: {e}"))?;

        bytes
            .get(..STATUS_LEN)
            .and_then(|s| <[u8; STATUS_LEN]>::try_from(s).ok())
            .map(Some)
            .ok_or_else(|| format!("expected {STATUS_LEN} bytes, got {}", bytes.len()))
    }
}

/// HTTP client for one local gateway.
#[derive(Debug, Clone)]
pub struct LocalClient {
    http: reqwest::Client,
    host: String,
    status_url: Url,
}

impl LocalClient {
    /// Create a client for the gateway at `host` (IP, `ip:port` or hostname).
    ///
    /// The transport timeout should be set strictly below the fast poll
    /// interval.
    pub fn new(host: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, host)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, host: &str) -> Result<Self, Error> {
        let host = host.trim().trim_end_matches('/');
        let status_url = Url::parse(&format!("http://{host}"))?.join(STATUS_PATH)?;
        Ok(Self {
            http,
            host: host.to_owned(),
            status_url,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn unreachable(&self, reason: impl Into<String>) -> Error {
        Error::LocalUnreachable {
            host: self.host.clone(),
            reason: reason.into(),
        }
    }

    /// Fetch the raw per-address entries.
    ///
    /// Entries that do not parse (missing or out-of-range `addr`) are
    /// skipped with a warning. Timeouts, refused connections and HTTP
    /// error statuses map to [`Error::LocalUnreachable`].
    pub async fn fetch_entries(&self) -> Result<Vec<GatewayEntry>, Error> {
        debug!("POST {}", self.status_url);

        let resp = self
            .http
            .post(self.status_url.clone())
            .form(&STATUS_FORM)
            .send()
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.unreachable(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("gateway status is not a JSON array: {e}"),
                body: body.clone(),
            })?;

        let entries = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<GatewayEntry>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(host = %self.host, error = %e, "skipping malformed gateway entry");
                    None
                }
            })
            .collect();

        Ok(entries)
    }

    /// Poll the gateway and assemble the binary status frame.
    ///
    /// One record per occupied slot, in gateway order. Entries with bad
    /// hex are skipped with a warning so one faulty unit never hides the
    /// others.
    pub async fn poll_status(&self) -> Result<Bytes, Error> {
        let entries = self.fetch_entries().await?;
        let mut frame = BytesMut::new();

        for entry in &entries {
            match entry.status_bytes() {
                Ok(Some(status)) => protocol::push_record(&mut frame, entry.addr, &status),
                Ok(None) => {}
                Err(reason) => {
                    warn!(host = %self.host, addr = entry.addr, %reason, "skipping unit with bad status data");
                }
            }
        }

        debug!(
            host = %self.host,
            units = frame.len() / protocol::RECORD_LEN,
            "local poll complete"
        );
        Ok(frame.freeze())
    }

    /// Poll and decode in one step.
    pub async fn poll_units(&self) -> Result<BTreeMap<u8, UnitStatus>, Error> {
        let frame = self.poll_status().await?;
        Ok(protocol::decode(&frame)?)
    }
}
