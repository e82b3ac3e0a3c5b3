use super::messages::{DroneId, PeerEntry, StatusReport};
use std::collections::BTreeMap;

/// A drone's local view of its peers.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: BTreeMap<DroneId, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PeerEntry>) -> Self {
        let mut table = Self::new();
        table.merge(entries);
        table
    }

    /// Drop every known peer and keep only `entries`.
    pub fn replace_all(&mut self, entries: Vec<PeerEntry>) {
        self.peers.clear();
        self.merge(entries);
    }

    /// Add or overwrite peers by id, keeping the rest.
    pub fn merge(&mut self, entries: Vec<PeerEntry>) {
        for entry in entries {
            self.peers.insert(entry.id, entry);
        }
    }

    pub fn get(&self, id: DroneId) -> Option<&PeerEntry> {
        self.peers.get(&id)
    }

    pub fn entries(&self) -> Vec<PeerEntry> {
        self.peers.values().cloned().collect()
    }

    /// Peers other than `own_id`.
    pub fn others(&self, own_id: DroneId) -> Vec<PeerEntry> {
        self.peers
            .values()
            .filter(|p| p.id != own_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// Latest status per drone; a newer report replaces the older one whole.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    reports: BTreeMap<DroneId, StatusReport>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: StatusReport) {
        self.reports.insert(report.id, report);
    }

    pub fn get(&self, id: DroneId) -> Option<&StatusReport> {
        self.reports.get(&id)
    }

    /// Keyed by the decimal drone id, as sent on the wire.
    pub fn by_wire_key(&self) -> BTreeMap<String, StatusReport> {
        self.reports
            .iter()
            .map(|(id, report)| (id.to_string(), report.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::swarm::GpsFix;

    fn peer(id: DroneId) -> PeerEntry {
        PeerEntry {
            id,
            ip: format!("10.0.0.{}", id),
            port: Some(5001),
        }
    }

    fn status(id: DroneId, heartbeat: f64) -> StatusReport {
        StatusReport {
            id,
            gps: GpsFix { lat: 1.0, lon: 2.0, alt: 0.0 },
            baro: 10.0,
            velocity: [0.0; 3],
            heartbeat,
        }
    }

    #[test]
    fn test_replace_drops_unlisted_peers() {
        let mut table = PeerTable::from_entries(vec![peer(0), peer(1), peer(2)]);
        table.replace_all(vec![peer(4)]);
        assert_eq!(table.entries(), vec![peer(4)]);
    }

    #[test]
    fn test_merge_keeps_existing_and_overwrites_same_id() {
        let mut table = PeerTable::from_entries(vec![peer(0), peer(1)]);
        let mut moved = peer(1);
        moved.ip = "192.168.1.1".to_string();
        table.merge(vec![moved.clone(), peer(2)]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(&moved));
        assert_eq!(table.others(0).len(), 2);
    }

    #[test]
    fn test_status_last_writer_wins() {
        let mut table = StatusTable::new();
        table.update(status(2, 100.0));
        table.update(status(2, 101.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(2).unwrap().heartbeat, 101.0);
        assert!(table.by_wire_key().contains_key("2"));
    }
}
