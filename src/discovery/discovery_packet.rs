use serde::{Deserialize, Serialize};

use crate::discovery::discovery_error::DiscoveryError;

pub const DISCOVERY_TYPE: &str = "discovery";
/// Status text announced once by a stopping peer.
pub const OFFLINE_STATUS: &str = "Offline";

/// Presence announcement:
/// `{"type":"discovery","username":..,"status":..,"wsPort":..,"skypeNumber":..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPacket {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "wsPort", default)]
    pub ws_port: u16,
    #[serde(rename = "skypeNumber", default)]
    pub dialable_number: String,
}

impl DiscoveryPacket {
    pub fn new(
        username: impl Into<String>,
        status: impl Into<String>,
        ws_port: u16,
        dialable_number: impl Into<String>,
    ) -> Self {
        Self {
            kind: DISCOVERY_TYPE.to_owned(),
            username: username.into(),
            status: status.into(),
            ws_port,
            dialable_number: dialable_number.into(),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain string/number fields: serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// # Errors
    /// [`DiscoveryError::Malformed`] for non-JSON, a wrong `type`, or an empty
    /// username.
    pub fn parse(bytes: &[u8]) -> Result<Self, DiscoveryError> {
        let packet: Self =
            serde_json::from_slice(bytes).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;
        if packet.kind != DISCOVERY_TYPE {
            return Err(DiscoveryError::Malformed(format!("type {:?}", packet.kind)));
        }
        if packet.username.is_empty() {
            return Err(DiscoveryError::Malformed("empty username".into()));
        }
        Ok(packet)
    }
}
