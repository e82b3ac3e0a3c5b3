use super::messages::{DroneId, PeerEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneRecord {
    pub id: DroneId,
    pub address: String,
    pub port: u16,
    pub registered_at: DateTime<Utc>,
}

impl DroneRecord {
    pub fn new(id: DroneId, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            port,
            registered_at: Utc::now(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn to_peer_entry(&self) -> PeerEntry {
        PeerEntry {
            id: self.id,
            ip: self.address.clone(),
            port: Some(self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    New,
    /// Same id seen again with a different endpoint.
    Updated,
    /// Same id and endpoint; the original record is kept.
    Unchanged,
}

/// Drones known to the controller, keyed by id. The last registration for an
/// id wins.
#[derive(Debug, Clone, Default)]
pub struct DroneRegistry {
    drones: BTreeMap<DroneId, DroneRecord>,
}

impl DroneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: DroneRecord) -> RegistrationOutcome {
        match self.drones.get(&record.id) {
            Some(existing) if existing.address == record.address && existing.port == record.port => {
                RegistrationOutcome::Unchanged
            }
            Some(_) => {
                self.drones.insert(record.id, record);
                RegistrationOutcome::Updated
            }
            None => {
                self.drones.insert(record.id, record);
                RegistrationOutcome::New
            }
        }
    }

    pub fn get(&self, id: DroneId) -> Option<&DroneRecord> {
        self.drones.get(&id)
    }

    /// Records in ascending id order.
    pub fn records(&self) -> Vec<DroneRecord> {
        self.drones.values().cloned().collect()
    }

    pub fn peer_entries(&self) -> Vec<PeerEntry> {
        self.drones.values().map(DroneRecord::to_peer_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    pub fn clear(&mut self) {
        self.drones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_registration_wins() {
        let mut registry = DroneRegistry::new();
        assert_eq!(registry.register(DroneRecord::new(1, "10.0.0.1", 5001)), RegistrationOutcome::New);
        assert_eq!(
            registry.register(DroneRecord::new(1, "10.0.0.1", 5001)),
            RegistrationOutcome::Unchanged
        );
        assert_eq!(
            registry.register(DroneRecord::new(1, "10.0.0.9", 5001)),
            RegistrationOutcome::Updated
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).unwrap().endpoint(), "10.0.0.9:5001");
    }

    #[test]
    fn test_records_sorted_by_id() {
        let mut registry = DroneRegistry::new();
        registry.register(DroneRecord::new(3, "10.0.0.3", 5001));
        registry.register(DroneRecord::new(0, "10.0.0.0", 5001));
        let ids: Vec<DroneId> = registry.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 3]);
    }
}
