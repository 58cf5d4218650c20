//! Integration tests for the windowed ARQ sender driven through the public
//! `Connection` API, with a real channel and receiver in the loop where the
//! timing matters.

use arq_sim::channel::Channel;
use arq_sim::config::{AckDiscipline, ChannelConfig, Limit, ProtocolConfig, Window, WindowArqConfig};
use arq_sim::packet::{Packet, PacketId};
use arq_sim::receiver::Receiver;
use arq_sim::Connection;

const CLIENT: u32 = 1;
const SERVER: u32 = 2;

fn window_arq(cwnd: i64, discipline: AckDiscipline, max_attempts: Limit) -> Connection {
    let cfg = ProtocolConfig::WindowArq(WindowArqConfig {
        cwnd: Window::from(cwnd),
        ack_discipline: discipline,
        timeout: Limit::at(30),
        max_attempts,
        max_retention_ticks: Limit::disabled(),
    });
    Connection::new(&cfg, None).expect("valid config")
}

fn data(ids: std::ops::RangeInclusive<PacketId>) -> Vec<Packet> {
    ids.map(|id| Packet::data(id, CLIENT, SERVER, 0)).collect()
}

fn ids(pkts: &[Packet]) -> Vec<PacketId> {
    pkts.iter().map(|p| p.id).collect()
}

fn ack(id: PacketId) -> Packet {
    Packet::data(id, CLIENT, SERVER, 0).ack(id)
}

// ---------------------------------------------------------------------------
// Test 1: selective, cwnd = 2, three packets end to end
// ---------------------------------------------------------------------------

#[test]
fn selective_window_of_two_end_to_end() {
    let mut conn = window_arq(2, AckDiscipline::Selective, Limit::disabled());
    let mut channel = Channel::new(&ChannelConfig {
        throughput: 1,
        capacity: 0,
        drop_probability: 0.0,
        min_delay: 1,
        seed: Some(3),
    })
    .unwrap();
    let mut rx = Receiver::new(SERVER, Some(AckDiscipline::Selective));

    // Tick 0: submission only.
    assert_eq!(conn.submit(data(0..=2)), 3);

    // Tick 1: window-limited first burst.
    let out = conn.tick(&[]);
    assert_eq!(ids(&out), vec![0, 1]);
    assert!(out.iter().all(|p| p.send_time == 1));
    assert!(channel.enqueue(out, 1).is_empty());

    // Tick 2: ACK(0) frees a slot for id 2.
    let arrived = channel.release(2);
    assert_eq!(ids(&arrived), vec![0]);
    let acks = rx.receive(&arrived, 2);
    let out = conn.tick(&acks);
    assert!(!conn.base().inflight().contains(0));
    assert_eq!(ids(&out), vec![2]);
    assert_eq!(out[0].send_time, 2);
    channel.enqueue(out, 2);

    // Ticks 3 and 4: ACK(1), ACK(2).
    for now in 3..=4 {
        let arrived = channel.release(now);
        let acks = rx.receive(&arrived, now);
        assert!(conn.tick(&acks).is_empty());
    }

    assert!(conn.base().inflight().is_empty());
    assert_eq!(conn.stats().delivered, 3);
    assert_eq!(conn.stats().retransmissions, 0);
    assert_eq!(rx.delivered(), 3);
}

// ---------------------------------------------------------------------------
// Test 2: cumulative ACK clears everything at or below its id
// ---------------------------------------------------------------------------

#[test]
fn cumulative_ack_removes_unobserved_lower_ids() {
    let mut conn = window_arq(8, AckDiscipline::Cumulative, Limit::disabled());
    conn.submit(data(0..=5));
    conn.tick(&[]);

    conn.tick(&[ack(3)]);
    assert_eq!(conn.base().inflight().ids(), vec![4, 5]);
    assert_eq!(conn.stats().delivered, 4);

    // A stale cumulative ACK changes nothing.
    conn.tick(&[ack(1)]);
    assert_eq!(conn.base().inflight().ids(), vec![4, 5]);
    assert_eq!(conn.stats().delivered, 4);
}

// ---------------------------------------------------------------------------
// Test 3: abandonment after a single attempt
// ---------------------------------------------------------------------------

#[test]
fn single_attempt_limit_abandons_nacked_packet() {
    let mut conn = window_arq(0, AckDiscipline::Selective, Limit::at(1));
    conn.submit(data(0..=5));
    let first = conn.tick(&[]);
    assert_eq!(first.len(), 6);

    let nack = first[5].nack();
    let out = conn.tick(&[nack]);
    assert!(out.is_empty());
    assert!(!conn.base().inflight().contains(5));
    assert_eq!(conn.stats().abandoned, 1);

    let acks: Vec<_> = (0..5).map(ack).collect();
    conn.tick(&acks);
    // A late ACK for the abandoned id must not count as a delivery.
    conn.tick(&[ack(5)]);
    for _ in 0..100 {
        assert!(conn.tick(&[]).iter().all(|p| p.id != 5));
    }
    assert_eq!(conn.stats().delivered, 5);
    assert!(conn.base().inflight().is_empty());
}

// ---------------------------------------------------------------------------
// Test 4: window bound and single resolution under heavy loss
// ---------------------------------------------------------------------------

#[test]
fn window_bound_and_single_resolution_under_loss() {
    for discipline in [AckDiscipline::Selective, AckDiscipline::Cumulative] {
        let cwnd = 4;
        let mut conn = window_arq(cwnd, discipline, Limit::at(5));
        let mut channel = Channel::new(&ChannelConfig {
            throughput: 2,
            capacity: 6,
            drop_probability: 0.3,
            min_delay: 1,
            seed: Some(11),
        })
        .unwrap();
        let mut rx = Receiver::new(SERVER, Some(discipline));
        conn.submit(data(0..=99));

        let mut nacks = Vec::new();
        for now in 1..=10_000 {
            let arrived = channel.release(now);
            let mut feedback = rx.receive(&arrived, now);
            feedback.append(&mut nacks);

            let out = conn.tick(&feedback);
            let table = conn.base().inflight();
            assert!(table.flying_count() <= cwnd as usize, "{discipline} at {now}");
            for pkt in &out {
                assert!(table.contains(pkt.id), "resolved id {} was sent again", pkt.id);
            }
            let stats = conn.stats();
            assert_eq!(
                stats.delivered + stats.abandoned + table.len() as u64,
                stats.new_sent,
                "{discipline} at {now}"
            );
            nacks = channel.enqueue(out, now);
        }
        assert_eq!(conn.stats().new_sent, 100);
        assert!(conn.base().inflight().is_empty());
    }
}
