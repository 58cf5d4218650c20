//! Send-side bookkeeping for packets that have left the backlog but are not
//! yet resolved.
//!
//! # Record lifecycle
//! - Created by [`InFlightTable::send_new`] on the first transmission of a
//!   DATA packet, with `attempts = 1` and `flying = true`.
//! - `flying` drops to `false` when the packet is NACKed or times out; the
//!   record then waits to be retransmitted or abandoned.
//! - Removed exactly once, by an acknowledgement or by abandonment.  Once
//!   removed an id is never re-inserted.
//!
//! The table is a `BTreeMap` so sweeps and retransmission scans walk ids in
//! ascending order.  Callers that remove entries while scanning take a
//! snapshot with [`InFlightTable::ids`] first.

use std::collections::BTreeMap;

use crate::packet::{Packet, PacketId, Tick};
use crate::policy::FeatureVector;

// ---------------------------------------------------------------------------
// InFlightRecord
// ---------------------------------------------------------------------------

/// A DATA packet that has been sent at least once and is not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightRecord {
    /// The most recent transmission.
    pub packet: Packet,
    /// Transmissions so far (1 = first send).
    pub attempts: u32,
    pub first_send_time: Tick,
    pub last_send_time: Tick,
    pub gen_time: Tick,
    /// Sent and outcome not yet known.
    pub flying: bool,
    /// Features shown to the retransmission policy at its latest decision.
    pub decision_state: Option<FeatureVector>,
}

impl InFlightRecord {
    pub fn id(&self) -> PacketId {
        self.packet.id
    }

    /// Ticks since the first transmission.
    pub fn retention(&self, now: Tick) -> Tick {
        now.saturating_sub(self.first_send_time)
    }
}

// ---------------------------------------------------------------------------
// InFlightTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InFlightTable {
    records: BTreeMap<PacketId, InFlightRecord>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first transmission of `packet` and return the copy that
    /// goes on the wire.
    ///
    /// Panics in debug builds if the id is already tracked.
    pub fn send_new(&mut self, mut packet: Packet, now: Tick) -> Packet {
        debug_assert!(
            !self.records.contains_key(&packet.id),
            "id {} is already in flight",
            packet.id
        );
        packet.send_time = now;
        packet.first_send_time = now;
        packet.attempt = 1;
        self.records.insert(
            packet.id,
            InFlightRecord {
                packet: packet.clone(),
                attempts: 1,
                first_send_time: now,
                last_send_time: now,
                gen_time: packet.gen_time,
                flying: true,
                decision_state: None,
            },
        );
        packet
    }

    /// Send `id` again.  Returns `None` if the id is not tracked.
    pub fn retransmit(&mut self, id: PacketId, now: Tick) -> Option<Packet> {
        let record = self.records.get_mut(&id)?;
        record.attempts += 1;
        record.last_send_time = now;
        record.flying = true;
        record.packet.send_time = now;
        record.packet.attempt = record.attempts;
        Some(record.packet.clone())
    }

    /// Mark a flying record as lost.  Returns `true` if its state changed.
    pub fn mark_lost(&mut self, id: PacketId) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.flying => {
                record.flying = false;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: PacketId) -> Option<InFlightRecord> {
        self.records.remove(&id)
    }

    /// Remove every record with id `<= id`, lowest first.
    pub fn remove_through(&mut self, id: PacketId) -> Vec<InFlightRecord> {
        let rest = match id.checked_add(1) {
            Some(next) => self.records.split_off(&next),
            None => BTreeMap::new(),
        };
        let acked = std::mem::replace(&mut self.records, rest);
        acked.into_values().collect()
    }

    pub fn get(&self, id: PacketId) -> Option<&InFlightRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: PacketId) -> Option<&mut InFlightRecord> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: PacketId) -> bool {
        self.records.contains_key(&id)
    }

    /// Snapshot of tracked ids, ascending.
    pub fn ids(&self) -> Vec<PacketId> {
        self.records.keys().copied().collect()
    }

    /// Ids of records waiting for a retransmit-or-abandon decision, ascending.
    pub fn not_flying_ids(&self) -> Vec<PacketId> {
        self.records
            .values()
            .filter(|r| !r.flying)
            .map(InFlightRecord::id)
            .collect()
    }

    pub fn lowest_id(&self) -> Option<PacketId> {
        self.records.keys().next().copied()
    }

    pub fn flying_count(&self) -> usize {
        self.records.values().filter(|r| r.flying).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InFlightRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(ids: &[PacketId]) -> InFlightTable {
        let mut table = InFlightTable::new();
        for &id in ids {
            table.send_new(Packet::data(id, 1, 2, 0), 1);
        }
        table
    }

    #[test]
    fn first_send_stamps_the_packet() {
        let mut table = InFlightTable::new();
        let sent = table.send_new(Packet::data(0, 1, 2, 0), 4);
        assert_eq!((sent.send_time, sent.first_send_time, sent.attempt), (4, 4, 1));
        let rec = table.get(0).unwrap();
        assert!(rec.flying);
        assert_eq!(rec.attempts, 1);
        assert_eq!(rec.gen_time, 0);
    }

    #[test]
    fn retransmit_bumps_attempts_and_keeps_first_send() {
        let mut table = table_with(&[0]);
        assert!(table.mark_lost(0));
        let again = table.retransmit(0, 9).unwrap();
        assert_eq!(again.attempt, 2);
        assert_eq!(again.send_time, 9);
        assert_eq!(again.first_send_time, 1);
        let rec = table.get(0).unwrap();
        assert!(rec.flying);
        assert_eq!(rec.last_send_time, 9);
    }

    #[test]
    fn mark_lost_only_affects_flying_records() {
        let mut table = table_with(&[0]);
        assert!(table.mark_lost(0));
        assert!(!table.mark_lost(0));
        assert!(!table.mark_lost(7));
    }

    #[test]
    fn remove_through_takes_the_prefix() {
        let mut table = table_with(&[0, 1, 2, 3, 4]);
        table.remove(1);
        let acked = table.remove_through(3);
        let ids: Vec<_> = acked.iter().map(InFlightRecord::id).collect();
        assert_eq!(ids, vec![0, 2, 3]);
        assert_eq!(table.ids(), vec![4]);
    }

    #[test]
    fn removed_id_cannot_be_retransmitted() {
        let mut table = table_with(&[0]);
        table.remove(0);
        assert!(table.retransmit(0, 5).is_none());
    }

    #[test]
    fn counts_flying_and_waiting() {
        let mut table = table_with(&[0, 1, 2]);
        table.mark_lost(2);
        table.mark_lost(0);
        assert_eq!(table.flying_count(), 1);
        assert_eq!(table.not_flying_ids(), vec![0, 2]);
    }
}
