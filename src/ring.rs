//! Fixed-capacity transfer ring.
//!
//! An arena of N indexed buffer slots with monotonically increasing head and
//! tail counters. A slot's buffer leaves the ring when its transfer is
//! submitted at `head` and returns when the completion is harvested at
//! `tail`, so `head - tail` is exactly the in-flight count and
//! `0 <= head - tail <= capacity` is enforced on every operation rather than
//! left to index arithmetic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("ring overrun: all {0} slots in flight")]
    Overrun(usize),

    #[error("ring underrun: no transfer in flight")]
    Underrun,
}

pub struct XferRing {
    slots: Vec<Option<Vec<u8>>>,
    head: u64,
    tail: u64,
}

impl XferRing {
    /// A ring of `capacity` slots, each holding a `buf_len`-byte buffer.
    pub fn new(capacity: usize, buf_len: usize) -> Self {
        assert!(capacity > 0);
        Self {
            slots: (0..capacity).map(|_| Some(vec![0u8; buf_len])).collect(),
            head: 0,
            tail: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_flight(&self) -> usize {
        debug_assert!(self.head >= self.tail);
        (self.head - self.tail) as usize
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight() == 0
    }

    /// Total transfers submitted through this ring.
    pub fn submitted(&self) -> u64 {
        self.head
    }

    /// Hands out the head slot's buffer for submission.
    pub fn take_for_submit(&mut self) -> Result<Vec<u8>, RingError> {
        if self.is_full() {
            return Err(RingError::Overrun(self.capacity()));
        }
        let idx = (self.head % self.slots.len() as u64) as usize;
        // The slot must hold a buffer: head may only pass a slot the tail
        // already refilled.
        let buf = self.slots[idx].take().ok_or(RingError::Overrun(self.capacity()))?;
        self.head += 1;
        Ok(buf)
    }

    /// Returns a harvested buffer to the tail slot.
    pub fn complete(&mut self, buffer: Vec<u8>) -> Result<(), RingError> {
        if self.is_empty() {
            return Err(RingError::Underrun);
        }
        let idx = (self.tail % self.slots.len() as u64) as usize;
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(buffer);
        self.tail += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_never_exceeds_capacity() {
        let mut ring = XferRing::new(4, 16);
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(ring.take_for_submit().unwrap());
            assert!(ring.in_flight() <= ring.capacity());
        }
        assert!(ring.is_full());
        assert!(matches!(ring.take_for_submit(), Err(RingError::Overrun(4))));
        ring.complete(held.pop().unwrap()).unwrap();
        assert_eq!(ring.in_flight(), 3);
        assert!(ring.take_for_submit().is_ok());
    }

    #[test]
    fn complete_without_submit_is_underrun() {
        let mut ring = XferRing::new(2, 8);
        assert!(matches!(ring.complete(vec![0; 8]), Err(RingError::Underrun)));
    }

    #[test]
    fn wraps_over_many_laps() {
        let mut ring = XferRing::new(3, 4);
        for lap in 0..100u64 {
            let buf = ring.take_for_submit().unwrap();
            ring.complete(buf).unwrap();
            assert_eq!(ring.submitted(), lap + 1);
            assert!(ring.is_empty());
        }
    }
}
