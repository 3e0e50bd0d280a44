//! Protocol-level constants and metadata types.

use serde::{Deserialize, Serialize};

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Name the provider is registered under (e.g. `torb`).
    pub type_name: String,
    /// Provider release version.
    pub version: String,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

impl From<ProviderMetadata> for crate::generated::GetMetadataResponse {
    fn from(metadata: ProviderMetadata) -> Self {
        let mut data_sources = metadata.data_sources;
        data_sources.sort();
        Self {
            type_name: metadata.type_name,
            version: metadata.version,
            data_sources,
            diagnostics: vec![],
        }
    }
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by the provider.
pub const HANDSHAKE_PREFIX: &str = "TORB_PROVIDER";

/// Format the handshake line announcing the listen address to the host.
pub fn handshake_line(addr: std::net::SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}
