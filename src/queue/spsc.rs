use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded single-producer / single-consumer FIFO.
///
/// The external submitter owns the producer side (`push`); the worker thread
/// owns the consumer side (`pop`). Indices grow monotonically and wrap
/// through a power-of-two slot array, so `tail - head` is always the live
/// count. The producer publishes a slot with a release store on `tail`; the
/// consumer publishes a reclaimed slot with a release store on `head`.
///
/// Calling `push` from more than one thread at a time, or `pop` from more
/// than one thread at a time, is a contract violation.
pub(crate) struct SpscQueue<T> {
    /// Consumer cursor.
    head: CachePadded<AtomicUsize>,
    /// Producer cursor.
    tail: CachePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    capacity: usize,
}

// Safety: slot contents are handed between exactly one producer and one
// consumer through the acquire/release index protocol above.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        let slots = capacity.next_power_of_two();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots: (0..slots)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
            mask: slots - 1,
            capacity,
        }
    }

    /// Producer side. Hands the value back when the queue is full.
    pub(crate) fn push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail.wrapping_sub(self.head.load(Ordering::Acquire)) == self.capacity {
            return Err(value);
        }

        // Safety: the slot at `tail` was reclaimed by the consumer (head has
        // moved past it), and only this producer writes slots.
        unsafe { (*self.slots[tail & self.mask].get()).write(value) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer side.
    pub(crate) fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        // Safety: `head < tail`, so the producer's release store made this
        // slot visible, and only this consumer reads slots.
        let value = unsafe { (*self.slots[head & self.mask].get()).assume_init_read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact from either endpoint's own side; approximate from elsewhere.
    pub(crate) fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::sync::Arc;
    use std::thread;

    assert_impl_all!(SpscQueue<crate::task::Task>: Send, Sync);

    #[test]
    fn test_fifo_order() {
        let queue = SpscQueue::with_capacity(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_full_queue_hands_value_back() {
        let queue = SpscQueue::with_capacity(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(3));
        assert_eq!(queue.len(), queue.capacity());

        assert_eq!(queue.pop(), Some(1));
        queue.push(3).unwrap();
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_drop_drains_remaining_items() {
        let witness = Arc::new(());

        let queue = SpscQueue::with_capacity(4);
        queue.push(Arc::clone(&witness)).unwrap();
        queue.push(Arc::clone(&witness)).unwrap();
        assert_eq!(Arc::strong_count(&witness), 3);

        drop(queue);
        assert_eq!(Arc::strong_count(&witness), 1);
    }

    #[test]
    fn test_producer_consumer_threads() {
        const ITEMS: usize = 100_000;

        let queue = Arc::new(SpscQueue::with_capacity(64));
        let producer_queue = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            for i in 0..ITEMS {
                let mut item = i;
                loop {
                    match producer_queue.push(item) {
                        Ok(()) => break,
                        Err(back) => {
                            item = back;
                            thread::yield_now();
                        }
                    }
                }
            }
        });

        let mut received = Vec::with_capacity(ITEMS);
        while received.len() < ITEMS {
            match queue.pop() {
                Some(item) => received.push(item),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        // FIFO end to end.
        assert!(received.iter().enumerate().all(|(i, &v)| i == v));
    }
}
