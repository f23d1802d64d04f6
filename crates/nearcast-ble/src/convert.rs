//! Conversions between nearcast identifiers and BLE stack types

use nearcast_core::{PeerHandle, ServiceId};
use uuid::Uuid;

pub fn to_uuid(id: ServiceId) -> Uuid {
    *id.as_uuid()
}

pub fn to_uuids(ids: &[ServiceId]) -> Vec<Uuid> {
    ids.iter().copied().map(to_uuid).collect()
}

/// Identifiers from `found` that are in `wanted`, or all of them when
/// `wanted` is empty
pub fn matching_ids<I>(found: I, wanted: &[ServiceId]) -> Vec<ServiceId>
where
    I: IntoIterator<Item = Uuid>,
{
    found
        .into_iter()
        .map(ServiceId::from_uuid)
        .filter(|id| wanted.is_empty() || wanted.contains(id))
        .collect()
}

/// Whether an advertisement listing `advertised` is one we scan for
pub fn advertises_any(advertised: &[Uuid], wanted: &[ServiceId]) -> bool {
    wanted.is_empty()
        || advertised
            .iter()
            .any(|uuid| wanted.contains(&ServiceId::from_uuid(*uuid)))
}

/// Stable peer handle for a device address
pub fn peer_handle(address: impl std::fmt::Display) -> PeerHandle {
    PeerHandle::new(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_id() -> ServiceId {
        ServiceId::from_short(0xFEED)
    }

    #[test]
    fn test_short_form_expands_to_base_uuid() {
        assert_eq!(
            to_uuid(service_id()).to_string(),
            "0000feed-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_matching_ids_filters_unrelated_services() {
        let battery = Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").unwrap();
        let found = vec![battery, to_uuid(service_id())];

        assert_eq!(matching_ids(found.clone(), &[service_id()]), vec![service_id()]);
        assert_eq!(matching_ids(found, &[]).len(), 2);
    }

    #[test]
    fn test_advertises_any() {
        let advertised = to_uuids(&[service_id()]);
        assert!(advertises_any(&advertised, &[service_id()]));
        assert!(!advertises_any(&[], &[service_id()]));
        assert!(!advertises_any(&advertised, &[ServiceId::from_short(0x180F)]));
    }

    #[test]
    fn test_peer_handle_uses_address_text() {
        assert_eq!(peer_handle("AA:BB:CC:DD:EE:FF").as_str(), "AA:BB:CC:DD:EE:FF");
    }
}
