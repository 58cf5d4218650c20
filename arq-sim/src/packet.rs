//! Packet records exchanged between simulated hosts.
//!
//! A [`Packet`] is a plain value: there is no wire format, no checksum and no
//! payload.  The simulator only cares about *which* packet moved *when*, so a
//! packet is identified by its sender-assigned sequence number plus the
//! source/destination host ids.
//!
//! Three kinds of packet exist:
//!
//! | Kind   | Produced by          | Meaning                                   |
//! |--------|----------------------|-------------------------------------------|
//! | `Data` | traffic generator    | application data, possibly retransmitted  |
//! | `Ack`  | receiver             | positive acknowledgement of `id`          |
//! | `Nack` | channel              | `id` was lost or rejected by a full queue |
//!
//! A retransmission is a fresh `Packet` that shares `id`, `gen_time` and
//! `first_send_time` with the first transmission but carries a new `send_time` and a
//! higher `attempt`.

/// Per-sender sequence number.  Assigned from 0 by the traffic generator.
pub type PacketId = u64;

/// Simulated host address.
pub type HostId = u32;

/// Simulation time, in ticks.
pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Data,
    Ack,
    Nack,
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            PacketKind::Data => "DATA",
            PacketKind::Ack => "ACK",
            PacketKind::Nack => "NACK",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number.  For a cumulative ACK this is the largest in-order
    /// id the receiver has accepted.
    pub id: PacketId,
    pub source: HostId,
    pub dest: HostId,
    pub kind: PacketKind,
    /// Tick the traffic generator produced the data.
    pub gen_time: Tick,
    /// Tick this transmission attempt left the sender.
    pub send_time: Tick,
    /// Tick of the very first transmission attempt.
    pub first_send_time: Tick,
    /// Transmission attempt number (1 = first send).
    pub attempt: u32,
}

impl Packet {
    /// A freshly generated data packet that has not been sent yet.
    pub fn data(id: PacketId, source: HostId, dest: HostId, gen_time: Tick) -> Self {
        Self {
            id,
            source,
            dest,
            kind: PacketKind::Data,
            gen_time,
            send_time: gen_time,
            first_send_time: gen_time,
            attempt: 0,
        }
    }

    /// Acknowledgement for `self`, travelling back to the sender.
    ///
    /// The timing fields are echoed so the sender can measure delay without
    /// looking anything up.
    pub fn ack(&self, id: PacketId) -> Self {
        Self {
            id,
            source: self.dest,
            dest: self.source,
            kind: PacketKind::Ack,
            ..self.clone()
        }
    }

    /// Negative acknowledgement for `self`: same identity, roles swapped.
    pub fn nack(&self) -> Self {
        Self {
            source: self.dest,
            dest: self.source,
            kind: PacketKind::Nack,
            ..self.clone()
        }
    }

    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}->{} id={} tx@{} gen@{} attempt={}",
            self.kind, self.source, self.dest, self.id, self.send_time, self.gen_time, self.attempt
        )
    }
}
