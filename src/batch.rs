//! Receiver-side batch bookkeeping: DataStart, DataElement*, DataEnd.
//!
//! A batch carries no count. Its size is the number of elements seen
//! between the markers.

use crate::protocol::Frame;
use crate::sample::Sample;
use crate::units::MICROS_TO_S;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BatchError {
    ElementOutsideBatch,
    NestedStart,
    EndWithoutStart,
}

/// What a finished batch looked like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchSummary {
    pub count: u32,
    pub first_us: Option<u32>,
    pub last_us: Option<u32>,
}

impl BatchSummary {
    /// Time between first and last element; the device clock wraps at 2^32 µs.
    pub fn span_us(&self) -> u32 {
        match (self.first_us, self.last_us) {
            (Some(first), Some(last)) => last.wrapping_sub(first),
            _ => 0,
        }
    }

    pub fn span_s(&self) -> f64 {
        self.span_us() as f64 * MICROS_TO_S
    }

    /// Mean sample rate over the batch; `None` when the span is zero.
    pub fn average_hz(&self) -> Option<f64> {
        let span = self.span_s();
        if span > 0.0 {
            Some(self.count as f64 / span)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchTracker {
    open: Option<BatchSummary>,
    completed: u32,
}

impl BatchTracker {
    pub const fn new() -> Self {
        Self {
            open: None,
            completed: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Elements seen so far in the open batch.
    pub fn current_count(&self) -> Option<u32> {
        self.open.map(|b| b.count)
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn start(&mut self) -> Result<(), BatchError> {
        if self.open.is_some() {
            return Err(BatchError::NestedStart);
        }
        self.open = Some(BatchSummary::default());
        Ok(())
    }

    pub fn record(&mut self, sample: &Sample) -> Result<(), BatchError> {
        let batch = self.open.as_mut().ok_or(BatchError::ElementOutsideBatch)?;
        batch.count = batch.count.saturating_add(1);
        batch.first_us.get_or_insert(sample.timestamp_us);
        batch.last_us = Some(sample.timestamp_us);
        Ok(())
    }

    pub fn end(&mut self) -> Result<BatchSummary, BatchError> {
        let summary = self.open.take().ok_or(BatchError::EndWithoutStart)?;
        self.completed = self.completed.saturating_add(1);
        Ok(summary)
    }

    /// Drops a half-received batch, e.g. after an ErrorMarker or a disconnect.
    pub fn abandon(&mut self) -> Option<BatchSummary> {
        self.open.take()
    }

    /// Feeds one decoded frame; returns the summary when a batch closes.
    pub fn observe(&mut self, frame: &Frame) -> Result<Option<BatchSummary>, BatchError> {
        match frame {
            Frame::DataStart => self.start().map(|_| None),
            Frame::DataElement(sample) => self.record(sample).map(|_| None),
            Frame::DataEnd => self.end().map(Some),
            Frame::ErrorMarker => {
                self.abandon();
                Ok(None)
            }
            Frame::Message { .. } | Frame::Schema(_) | Frame::Heartbeat => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(timestamp_us: u32) -> Frame {
        Frame::DataElement(Sample {
            timestamp_us,
            ..Default::default()
        })
    }

    fn run(tracker: &mut BatchTracker, frames: &[Frame]) -> Vec<BatchSummary> {
        frames
            .iter()
            .filter_map(|f| tracker.observe(f).unwrap())
            .collect()
    }

    #[test]
    fn counts_elements_between_markers() {
        let mut t = BatchTracker::new();
        let frames = [
            Frame::DataStart,
            at(1_000),
            Frame::Heartbeat,
            at(2_000),
            at(3_000),
            Frame::DataEnd,
        ];
        let done = run(&mut t, &frames);
        assert_eq!(
            done,
            vec![BatchSummary {
                count: 3,
                first_us: Some(1_000),
                last_us: Some(3_000),
            }]
        );
        assert_eq!(done[0].span_us(), 2_000);
        let hz = done[0].average_hz().unwrap();
        assert!((hz - 1_500.0).abs() < 1e-9);
        assert_eq!(t.completed(), 1);
        assert!(!t.is_open());
    }

    #[test]
    fn empty_batch_is_valid() {
        let mut t = BatchTracker::new();
        let done = run(&mut t, &[Frame::DataStart, Frame::DataEnd]);
        assert_eq!(done, vec![BatchSummary::default()]);
        assert_eq!(done[0].average_hz(), None);
    }

    #[test]
    fn span_survives_clock_wrap() {
        let mut t = BatchTracker::new();
        let done = run(
            &mut t,
            &[Frame::DataStart, at(u32::MAX - 499), at(500), Frame::DataEnd],
        );
        assert_eq!(done[0].span_us(), 1_000);
    }

    #[test]
    fn protocol_violations() {
        let mut t = BatchTracker::new();
        assert_eq!(t.observe(&at(1)), Err(BatchError::ElementOutsideBatch));
        assert_eq!(t.observe(&Frame::DataEnd), Err(BatchError::EndWithoutStart));
        t.observe(&Frame::DataStart).unwrap();
        assert_eq!(t.observe(&Frame::DataStart), Err(BatchError::NestedStart));
        assert_eq!(t.current_count(), Some(0));
    }

    #[test]
    fn error_marker_abandons_the_open_batch() {
        let mut t = BatchTracker::new();
        run(&mut t, &[Frame::DataStart, at(1), at(2)]);
        assert_eq!(t.current_count(), Some(2));
        assert_eq!(t.observe(&Frame::ErrorMarker), Ok(None));
        assert!(!t.is_open());
        assert_eq!(t.completed(), 0);
    }

    #[test]
    fn counters_saturate() {
        let mut t = BatchTracker {
            open: Some(BatchSummary {
                count: u32::MAX,
                ..Default::default()
            }),
            completed: u32::MAX,
        };
        t.observe(&at(7)).unwrap();
        assert_eq!(t.current_count(), Some(u32::MAX));
        let done = t.observe(&Frame::DataEnd).unwrap().unwrap();
        assert_eq!(done.count, u32::MAX);
        assert_eq!(done.first_us, Some(7));
        assert_eq!(t.completed(), u32::MAX);
    }
}
