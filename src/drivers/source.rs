use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::drivers::MonitorError;

/// Raw UDP payload as handed over by the ingest worker. Not yet interpreted.
#[derive(Clone, Debug, PartialEq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: Option<SocketAddr>,
}

impl Datagram {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            source: None,
        }
    }
}

/// Header fields common to both wire formats.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PacketMeta {
    pub sequence: u64,
    /// Seconds. Text packets carry milliseconds and are scaled on decode.
    pub timestamp: f64,
}

/// Samples decoded from one datagram. Lives for a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBatch {
    pub slot_index: usize,
    pub channel_count: usize,
    pub values: Vec<f64>, // sample-major: s0c0, s0c1, ..., s1c0, ...
    pub meta: PacketMeta,
}

impl DecodedBatch {
    pub fn sample_count(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.values.len() / self.channel_count
        }
    }

    /// Samples of one channel in arrival order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        let stride = self.channel_count.max(1);
        let start = if channel < self.channel_count {
            channel
        } else {
            self.values.len()
        };
        self.values.iter().skip(start).step_by(stride).copied()
    }
}

/// Something the scheduler can drain datagrams from without blocking.
pub trait DatagramSource {
    /// `Ok(None)` means nothing pending right now; `Err` means the producer is gone.
    fn try_next(&mut self) -> Result<Option<Datagram>, MonitorError>;

    /// Datagrams discarded before they reached the consumer.
    fn dropped(&self) -> u64 {
        0
    }
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<Datagram>,
}

impl ManualSource {
    pub fn new(datagrams: impl IntoIterator<Item = Datagram>) -> Self {
        Self {
            queue: datagrams.into_iter().collect(),
        }
    }

    pub fn push(&mut self, datagram: Datagram) {
        self.queue.push_back(datagram);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl DatagramSource for ManualSource {
    fn try_next(&mut self) -> Result<Option<Datagram>, MonitorError> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_view_walks_sample_major_values() {
        let batch = DecodedBatch {
            slot_index: 0,
            channel_count: 2,
            values: vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0],
            meta: PacketMeta::default(),
        };
        assert_eq!(batch.sample_count(), 3);
        assert_eq!(batch.channel(0).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(batch.channel(1).collect::<Vec<_>>(), vec![10.0, 20.0, 30.0]);
        assert_eq!(batch.channel(2).count(), 0);
    }

    #[test]
    fn manual_source_drains_in_order() {
        let mut source = ManualSource::new(vec![Datagram::new(b"a".to_vec())]);
        source.push(Datagram::new(b"b".to_vec()));
        assert_eq!(source.len(), 2);
        assert_eq!(source.try_next().unwrap().unwrap().payload, b"a");
        assert_eq!(source.try_next().unwrap().unwrap().payload, b"b");
        assert!(source.try_next().unwrap().is_none());
        assert!(source.is_empty());
    }
}
