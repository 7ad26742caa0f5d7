//! Control-plane codec (component A, §4.A): encodes and decodes the four
//! management actions as JSON over a UDP datagram, plus the bare `migrate`
//! literal token sent to the container-migration helper.

use std::net::SocketAddr;

use serde_json::Value;

use crate::transport::MigrationProtocol;

/// The literal, non-JSON datagram sent to the container-migration helper.
pub const MIGRATE_TOKEN: &[u8] = b"migrate";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {0} is not allowed for this action")]
    UnexpectedField(&'static str),
    #[error("invalid protocol name: {0:?}")]
    InvalidProtocol(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// A decoded management command (the three JSON actions of §4.A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementCommand {
    OnImminentServerMigration {
        protocol: MigrationProtocol,
        address: Option<SocketAddr>,
    },
    OnNetworkSwitch,
    Shutdown,
}

fn protocol_to_wire(protocol: MigrationProtocol) -> &'static str {
    match protocol {
        MigrationProtocol::Explicit | MigrationProtocol::ProactiveExplicit => "Explicit",
        MigrationProtocol::PoolOfAddresses => "Pool of Addresses",
        MigrationProtocol::Symmetric => "Symmetric",
        MigrationProtocol::SynchronizedSymmetric => "Synchronized Symmetric",
    }
}

fn protocol_from_wire(s: &str) -> Result<MigrationProtocol, CodecError> {
    match s {
        "Explicit" => Ok(MigrationProtocol::Explicit),
        "Pool of Addresses" => Ok(MigrationProtocol::PoolOfAddresses),
        "Symmetric" => Ok(MigrationProtocol::Symmetric),
        "Synchronized Symmetric" => Ok(MigrationProtocol::SynchronizedSymmetric),
        other => Err(CodecError::InvalidProtocol(other.to_string())),
    }
}

impl ManagementCommand {
    /// # Errors
    /// If `protocol == Explicit` without an address, or any other protocol
    /// with an address present.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let value = match self {
            Self::OnImminentServerMigration { protocol, address } => {
                let is_explicit = protocol.is_explicit_family();
                if is_explicit && address.is_none() {
                    return Err(CodecError::MissingField("address"));
                }
                if !is_explicit && address.is_some() {
                    return Err(CodecError::UnexpectedField("address"));
                }
                let mut obj = serde_json::json!({
                    "action": "onImminentServerMigration",
                    "protocol": protocol_to_wire(*protocol),
                });
                if let Some(addr) = address {
                    obj["address"] = Value::String(addr.to_string());
                }
                obj
            }
            Self::OnNetworkSwitch => serde_json::json!({ "action": "onNetworkSwitch" }),
            Self::Shutdown => serde_json::json!({ "action": "shutdown" }),
        };
        Ok(serde_json::to_vec(&value)?)
    }

    /// # Errors
    /// On malformed JSON, an unknown action, a missing `protocol`, or a
    /// missing/forbidden `address` field.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("action"))?;

        match action {
            "onImminentServerMigration" => {
                let protocol_str = value
                    .get("protocol")
                    .and_then(Value::as_str)
                    .ok_or(CodecError::MissingField("protocol"))?;
                let protocol = protocol_from_wire(protocol_str)?;
                let address_value = value.get("address").and_then(Value::as_str);

                let address = match (protocol.is_explicit_family(), address_value) {
                    (true, Some(addr_str)) => Some(
                        addr_str
                            .parse::<SocketAddr>()
                            .map_err(|_| CodecError::InvalidAddress(addr_str.to_string()))?,
                    ),
                    (true, None) => return Err(CodecError::MissingField("address")),
                    (false, None) => None,
                    (false, Some(_)) => return Err(CodecError::UnexpectedField("address")),
                };

                Ok(Self::OnImminentServerMigration { protocol, address })
            }
            "onNetworkSwitch" => Ok(Self::OnNetworkSwitch),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(CodecError::UnknownAction(other.to_string())),
        }
    }
}
