//! Domain types shared by the discovery roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DiscoveryError, Result};

// ----------------------------------------------------------------------------
// Service Identifier
// ----------------------------------------------------------------------------

/// Bluetooth base UUID that 16- and 32-bit short identifiers expand onto
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Token shared by advertiser and scanner to recognize each other.
///
/// Accepts a full UUID or a 16/32-bit short form (`"180D"`, `"0000180D"`),
/// the latter expanded onto the Bluetooth base UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Wrap an already parsed UUID
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Expand a 16-bit assigned number onto the base UUID
    pub const fn from_short(short: u16) -> Self {
        Self::from_short_u32(short as u32)
    }

    const fn from_short_u32(short: u32) -> Self {
        Self(Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96)))
    }

    /// Parse the string form of a service identifier
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let invalid = || DiscoveryError::InvalidServiceId {
            value: value.to_string(),
        };

        let is_hex = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_hexdigit());
        match trimmed.len() {
            4 | 8 if is_hex => u32::from_str_radix(trimmed, 16)
                .map(Self::from_short_u32)
                .map_err(|_| invalid()),
            _ => Uuid::parse_str(trimmed).map(Self).map_err(|_| invalid()),
        }
    }

    /// Underlying 128-bit UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ServiceId {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServiceId {
    type Error = DiscoveryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.to_string()
    }
}

impl From<Uuid> for ServiceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Maximum length of an attribute value, and therefore of an identity
pub const MAX_IDENTITY_LEN: usize = 512;

/// The "who I am" value served by the peripheral role and read by peers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity string
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(DiscoveryError::EmptyIdentity);
        }
        if value.len() > MAX_IDENTITY_LEN {
            return Err(DiscoveryError::IdentityTooLong {
                len: value.len(),
                max: MAX_IDENTITY_LEN,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes as they are published in the characteristic value
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for Identity {
    type Error = DiscoveryError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Peer Handle
// ----------------------------------------------------------------------------

/// Opaque reference to a discovered remote device.
///
/// Assigned by the radio driver; only meaningful between discovery and the
/// matching disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerHandle(String);

impl PeerHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerHandle {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for PeerHandle {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Radio and Lifecycle State
// ----------------------------------------------------------------------------

/// Power state reported by one radio handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioPowerState {
    #[default]
    Unknown,
    PoweredOn,
    Unavailable,
}

impl RadioPowerState {
    pub fn is_powered_on(self) -> bool {
        self == RadioPowerState::PoweredOn
    }
}

impl From<bool> for RadioPowerState {
    fn from(powered: bool) -> Self {
        if powered {
            RadioPowerState::PoweredOn
        } else {
            RadioPowerState::Unavailable
        }
    }
}

/// Process-wide app lifecycle mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleMode {
    #[default]
    Foreground,
    Background,
}

/// Flags set by the explicit start/stop calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableFlags {
    pub advertising: bool,
    pub discovery: bool,
}

/// Lifecycle of a lazily created radio handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RadioHandle {
    /// No handle; events from a previous handle are stale
    #[default]
    Absent,
    /// Creation requested, waiting for the first power-state report
    Initializing,
    /// The handle has reported its power state at least once
    Ready,
}

impl RadioHandle {
    pub fn is_absent(self) -> bool {
        self == RadioHandle::Absent
    }
}

// ----------------------------------------------------------------------------
// Published GATT Layout
// ----------------------------------------------------------------------------

/// Descriptor attached to a published characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDescriptor {
    pub id: ServiceId,
    pub value: Vec<u8>,
}

/// Read-only characteristic published by the peripheral role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub id: ServiceId,
    pub value: Vec<u8>,
    pub readable: bool,
    pub descriptors: Vec<GattDescriptor>,
}

/// Service published by the peripheral role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub id: ServiceId,
    pub primary: bool,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// One primary service exposing the identity through a readable
    /// characteristic and a descriptor, all under the same identifier.
    pub fn identity_service(id: ServiceId, identity: &Identity) -> Self {
        let value = identity.as_bytes().to_vec();
        Self {
            id,
            primary: true,
            characteristics: vec![GattCharacteristic {
                id,
                value: value.clone(),
                readable: true,
                descriptors: vec![GattDescriptor { id, value }],
            }],
        }
    }
}

/// Advertisement payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub service_ids: Vec<ServiceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_id_full_uuid() {
        let id = ServiceId::parse("6E400001-B5A3-F393-E0A9-E50E24DCCA9E").unwrap();
        assert_eq!(id.to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
    }

    #[test]
    fn test_service_id_short_forms() {
        let short = ServiceId::parse("180D").unwrap();
        assert_eq!(short.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(short, ServiceId::from_short(0x180D));

        let long = ServiceId::parse("0000180D").unwrap();
        assert_eq!(long, short);
    }

    #[test]
    fn test_service_id_rejects_garbage() {
        for bad in ["", "xyz", "180", "12345-not-a-uuid", "GGGG"] {
            assert!(
                matches!(
                    ServiceId::parse(bad),
                    Err(DiscoveryError::InvalidServiceId { .. })
                ),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_service_id_serde_as_string() {
        let id = ServiceId::from_short(0xFEAA);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0000feaa-0000-1000-8000-00805f9b34fb\"");
        let back: ServiceId = serde_json::from_str("\"FEAA\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_identity_validation() {
        assert_eq!(Identity::new(""), Err(DiscoveryError::EmptyIdentity));
        assert!(Identity::new("alice").is_ok());

        let long = "a".repeat(MAX_IDENTITY_LEN + 1);
        assert_eq!(
            Identity::new(long),
            Err(DiscoveryError::IdentityTooLong {
                len: MAX_IDENTITY_LEN + 1,
                max: MAX_IDENTITY_LEN
            })
        );
        assert!(Identity::new("a".repeat(MAX_IDENTITY_LEN)).is_ok());
    }

    #[test]
    fn test_identity_service_layout() {
        let id = ServiceId::from_short(0x1234);
        let identity = Identity::new("alice").unwrap();
        let service = GattService::identity_service(id, &identity);

        assert!(service.primary);
        assert_eq!(service.characteristics.len(), 1);
        let characteristic = &service.characteristics[0];
        assert_eq!(characteristic.id, id);
        assert_eq!(characteristic.value, b"alice");
        assert!(characteristic.readable);
        assert_eq!(characteristic.descriptors[0].value, b"alice");
    }

    #[test]
    fn test_power_state_from_bool() {
        assert_eq!(RadioPowerState::from(true), RadioPowerState::PoweredOn);
        assert_eq!(RadioPowerState::from(false), RadioPowerState::Unavailable);
        assert!(!RadioPowerState::default().is_powered_on());
    }
}
