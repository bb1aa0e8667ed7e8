//! FIFO of encoded messages waiting for a writable socket.

use std::collections::VecDeque;

/// Outbound messages in enqueue order.
///
/// Only the connection driver touches the queue.  A message leaves the queue
/// once it has been fully written, so a failed write keeps it for the next
/// socket.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<Vec<u8>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, encoded: Vec<u8>) {
        self.pending.push_back(encoded);
    }

    /// The oldest message not yet written.
    pub fn front(&self) -> Option<&[u8]> {
        self.pending.front().map(Vec::as_slice)
    }

    /// Removes the oldest message after it was written.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = OutboundQueue::new();
        queue.push(b"A,1\n".to_vec());
        queue.push(b"A,2\n".to_vec());

        assert_eq!(queue.pop().as_deref(), Some(&b"A,1\n"[..]));
        assert_eq!(queue.pop().as_deref(), Some(&b"A,2\n"[..]));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_front_does_not_remove() {
        let mut queue = OutboundQueue::new();
        queue.push(b"V,1\n".to_vec());

        assert_eq!(queue.front(), Some(&b"V,1\n"[..]));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut queue = OutboundQueue::new();
        queue.push(b"T,hi\n".to_vec());
        queue.clear();
        assert!(queue.is_empty());
    }
}
