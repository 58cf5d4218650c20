//! Channel admission, residency and loss behaviour, plus RTT estimator
//! properties under arbitrary sample sequences.

use arq_sim::channel::Channel;
use arq_sim::config::{ChannelConfig, Limit};
use arq_sim::packet::{Packet, PacketKind};
use arq_sim::rto::{RttEstimator, MAX_RTO};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn channel(throughput: i64, capacity: i64, drop_probability: f64, min_delay: u64) -> Channel {
    Channel::new(&ChannelConfig {
        throughput,
        capacity,
        drop_probability,
        min_delay,
        seed: Some(17),
    })
    .expect("valid channel")
}

fn burst(source: u32, n: u64) -> Vec<Packet> {
    (0..n).map(|id| Packet::data(id, source, 99, 0)).collect()
}

#[test]
fn one_packet_over_capacity_is_nacked() {
    for cap in [1_u64, 4, 25] {
        let mut ch = channel(1, cap as i64, 0.0, 1);
        let nacks = ch.enqueue(burst(1, cap + 1), 1);
        assert_eq!(nacks.len(), 1, "capacity {cap}");
        assert_eq!(nacks[0].id, cap);
        assert_eq!(nacks[0].kind, PacketKind::Nack);
        assert_eq!(nacks[0].dest, 1);
        assert_eq!(ch.len(), cap as usize);
        assert_eq!(ch.stats().overflowed, 1);
    }
}

#[test]
fn zero_capacity_is_unbounded() {
    let mut ch = channel(1, 0, 0.0, 1);
    assert!(ch.enqueue(burst(1, 10_000), 1).is_empty());
    assert_eq!(ch.capacity(), None);
    assert_eq!(ch.len(), 10_000);
}

#[test]
fn release_honours_throughput_and_residency() {
    let mut ch = channel(2, 0, 0.0, 3);
    ch.enqueue(burst(1, 5), 10);

    assert!(ch.release(11).is_empty());
    assert!(ch.release(12).is_empty());
    let first: Vec<_> = ch.release(13).iter().map(|p| p.id).collect();
    assert_eq!(first, vec![0, 1]);
    let second: Vec<_> = ch.release(14).iter().map(|p| p.id).collect();
    assert_eq!(second, vec![2, 3]);
    assert_eq!(ch.release(15).len(), 1);
    assert!(ch.is_empty());
}

#[test]
fn every_drop_is_reported() {
    let mut ch = channel(1, 50, 0.4, 1);
    let mut nacked = 0;
    for now in 1..=200 {
        nacked += ch.enqueue(burst(7, 3), now).len() as u64;
        ch.release(now);
    }
    let stats = ch.stats();
    assert_eq!(nacked, stats.lost + stats.overflowed);
    assert_eq!(stats.enqueued + stats.lost + stats.overflowed, 600);
    assert!(stats.lost > 0);
    assert!(stats.peak_occupancy <= 50);

    let user = ch.profile()[&7];
    assert_eq!(user.queued, ch.len() as u64);
    assert_eq!(user.enqueued, user.dequeued + user.queued);
}

#[test]
fn invalid_channels_are_rejected() {
    assert!(Channel::new(&ChannelConfig { throughput: 0, ..ChannelConfig::default() }).is_err());
    assert!(Channel::new(&ChannelConfig { capacity: -1, ..ChannelConfig::default() }).is_err());
    assert!(
        Channel::new(&ChannelConfig { drop_probability: 1.5, ..ChannelConfig::default() }).is_err()
    );
}

#[test]
fn rtt_variance_stays_non_negative() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..50 {
        let mut est = RttEstimator::new(Limit::at(30));
        for _ in 0..200 {
            let sample = rng.random_range(0.0..500.0);
            est.record_sample(sample);
            assert!(est.rttvar() >= 0.0);
            let rto = est.rto().expect("timeout enabled");
            assert!(rto >= 1.0 && rto <= MAX_RTO);
        }
        assert_eq!(est.samples(), 200);
    }
}
