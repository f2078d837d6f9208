//! On/off UDP source state machine
//!
//! While "on" the source emits fixed-size packets at the configured data
//! rate; on and off period lengths are drawn from the descriptor's
//! distributions. Time already accumulated toward the next packet carries
//! over an off period, so a constant 1s/0s source emits at an exact rate.

use rand::rngs::StdRng;
use rand::Rng;
use std::net::Ipv4Addr;

use crate::mt_interface::{FiveTuple, SimTime, TimeDistribution, TrafficDescriptor, IP_UDP_OVERHEAD_BYTES, UDP_PROTOCOL};

#[derive(Debug)]
pub struct OnOffApplication {
    descriptor: TrafficDescriptor,
    source_address: Ipv4Addr,
    source_port: u16,
    rng: StdRng,
    interval: SimTime,

    running: bool,
    sending: bool,
    /// bumped on every state change; events carrying an older value are stale
    generation: u64,
    phase_started: SimTime,
    carried: SimTime,
    packets_sent: u64,
}

impl OnOffApplication {
    pub fn new(descriptor: TrafficDescriptor, source_address: Ipv4Addr, source_port: u16, rng: StdRng) -> Self {
        let interval = SimTime::transmission(descriptor.packet_size, descriptor.data_rate_bps);
        Self {
            descriptor,
            source_address,
            source_port,
            rng,
            interval,
            running: false,
            sending: false,
            generation: 0,
            phase_started: SimTime::ZERO,
            carried: SimTime::ZERO,
            packets_sent: 0,
        }
    }

    pub fn descriptor(&self) -> &TrafficDescriptor {
        &self.descriptor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.running && generation == self.generation
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Gap between two packets while on
    pub fn interval(&self) -> SimTime {
        self.interval
    }

    pub fn five_tuple(&self) -> FiveTuple {
        FiveTuple {
            protocol: UDP_PROTOCOL,
            source: self.source_address,
            source_port: self.source_port,
            destination: *self.descriptor.destination.ip(),
            destination_port: self.descriptor.destination.port(),
        }
    }

    /// Size of one packet at the IP layer
    pub fn ip_packet_bytes(&self) -> u32 {
        self.descriptor.packet_size + IP_UDP_OVERHEAD_BYTES
    }

    /// Application start; returns the delay until the first on period
    pub fn start(&mut self) -> SimTime {
        self.running = true;
        self.sending = false;
        self.generation += 1;
        self.carried = SimTime::ZERO;
        self.sample(self.descriptor.off_time)
    }

    /// Application stop; pending events become stale
    pub fn stop(&mut self) {
        self.running = false;
        self.sending = false;
        self.generation += 1;
    }

    /// Enter an on period; returns (delay to first packet, on period length)
    pub fn begin_on(&mut self, now: SimTime) -> (SimTime, SimTime) {
        self.sending = true;
        self.phase_started = now;
        let first = self.interval.saturating_sub(self.carried);
        let on = self.sample(self.descriptor.on_time);
        (first, on)
    }

    /// Leave the on period; returns the off period length
    pub fn end_on(&mut self, now: SimTime) -> SimTime {
        self.sending = false;
        self.generation += 1;
        self.carried = (self.carried + (now - self.phase_started)).min(self.interval);
        self.sample(self.descriptor.off_time)
    }

    /// Account for one emitted packet at `now`
    pub fn packet_sent(&mut self, now: SimTime) {
        self.packets_sent += 1;
        self.phase_started = now;
        self.carried = SimTime::ZERO;
    }

    fn sample(&mut self, distribution: TimeDistribution) -> SimTime {
        match distribution {
            TimeDistribution::Constant { seconds } => SimTime::from_secs_f64(seconds),
            TimeDistribution::Exponential { mean } => {
                // inverse transform; 1-u lies in (0, 1]
                let u: f64 = self.rng.gen();
                SimTime::from_secs_f64(-mean * (1.0 - u).ln())
            }
        }
    }
}
