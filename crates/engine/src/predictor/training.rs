//! Bounded training-sample buffer with batch compaction.

use std::collections::BTreeSet;

/// One labeled observation: feature vector, regression target, and a binary
/// trigger label.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub target: f64,
    pub label: u8,
}

/// Append-only buffer that compacts in batches: once it grows past
/// `capacity`, only the most recent `retain` samples survive. Not a sliding
/// window — between compactions the buffer keeps everything.
pub struct TrainingBuffer {
    samples: Vec<TrainingSample>,
    capacity: usize,
    retain: usize,
    total_recorded: u64,
}

impl TrainingBuffer {
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            samples: Vec::new(),
            capacity,
            retain,
            total_recorded: 0,
        }
    }

    pub fn push(&mut self, sample: TrainingSample) {
        self.samples.push(sample);
        self.total_recorded += 1;
        if self.samples.len() > self.capacity {
            let drop = self.samples.len() - self.retain;
            self.samples.drain(..drop);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples recorded over the buffer's lifetime, including compacted-away
    /// ones. Drives the external retrain cadence.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// Number of distinct trigger labels currently buffered.
    pub fn distinct_labels(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.label)
            .collect::<BTreeSet<u8>>()
            .len()
    }
}
