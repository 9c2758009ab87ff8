use super::Steal;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{fence, AtomicIsize, Ordering};

/// Bounded work-stealing deque with Chase–Lev semantics.
///
/// The owning worker pushes and pops at the bottom (LIFO); thieves take from
/// the top (FIFO) and synchronise with each other and the owner through a
/// compare-and-swap on `top`. Orderings follow Lê et al., "Correct and
/// Efficient Work-Stealing for Weak Memory Models", restricted to a fixed
/// ring: `push` fails instead of growing when `bottom - top` reaches the
/// capacity.
///
/// `push` and `pop` are owner operations and must only be called from one
/// thread at a time; `steal` and `len` are safe from any thread.
pub(crate) struct StealQueue<T> {
    top: CachePadded<AtomicIsize>,
    bottom: CachePadded<AtomicIsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    capacity: usize,
}

// Safety: every slot handoff is ordered by the release store on `bottom`
// (owner publish) or the CAS on `top` (thief claim); losers of a claim race
// forget their speculative read instead of dropping it.
unsafe impl<T: Send> Send for StealQueue<T> {}
unsafe impl<T: Send> Sync for StealQueue<T> {}

impl<T> StealQueue<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        let slots = capacity.next_power_of_two();

        Self {
            top: CachePadded::new(AtomicIsize::new(0)),
            bottom: CachePadded::new(AtomicIsize::new(0)),
            slots: (0..slots)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
            mask: slots - 1,
            capacity,
        }
    }

    fn slot(&self, index: isize) -> *mut MaybeUninit<T> {
        self.slots[(index as usize) & self.mask].get()
    }

    /// Owner push at the bottom. Hands the value back when the deque is full.
    pub(crate) fn push(&self, value: T) -> Result<(), T> {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Acquire);
        if bottom.wrapping_sub(top) >= self.capacity as isize {
            return Err(value);
        }

        // Safety: `bottom - top < capacity <= slots`, so this slot is not
        // live; only the owner writes slots.
        unsafe { (*self.slot(bottom)).write(value) };
        self.bottom.store(bottom.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Owner pop at the bottom (LIFO).
    pub(crate) fn pop(&self) -> Option<T> {
        let bottom = self.bottom.load(Ordering::Relaxed).wrapping_sub(1);
        self.bottom.store(bottom, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let top = self.top.load(Ordering::Relaxed);

        if top > bottom {
            // Deque was empty; restore bottom.
            self.bottom.store(bottom.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        // Safety: the reservation of `bottom` above keeps thieves at or
        // below `top <= bottom`; the last-element race is resolved by the
        // CAS, with the loser forgetting its copy.
        let value = unsafe { (*self.slot(bottom)).assume_init_read() };
        if top == bottom {
            // Last element: race the thieves for it.
            let won = self
                .top
                .compare_exchange(
                    top,
                    top.wrapping_add(1),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok();
            self.bottom.store(bottom.wrapping_add(1), Ordering::Relaxed);
            if !won {
                mem::forget(value);
                return None;
            }
        }
        Some(value)
    }

    /// Thief take at the top (FIFO). Never blocks; a lost race reports
    /// `Steal::Retry` and an observed-empty deque `Steal::Empty`.
    pub(crate) fn steal(&self) -> Steal<T> {
        let top = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let bottom = self.bottom.load(Ordering::Acquire);
        if top >= bottom {
            return Steal::Empty;
        }

        // Speculative read; ownership is only claimed by the CAS below and
        // the copy is forgotten on loss.
        let value = unsafe { (*self.slot(top)).assume_init_read() };
        if self
            .top
            .compare_exchange(
                top,
                top.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_err()
        {
            mem::forget(value);
            return Steal::Retry;
        }
        Steal::Success(value)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate count; used only for heuristics (steal amounts).
    pub(crate) fn len(&self) -> usize {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Relaxed);
        bottom.wrapping_sub(top).max(0) as usize
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for StealQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_owner_pop_is_lifo() {
        let queue = StealQueue::with_capacity(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in (0..5).rev() {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_thief_steal_is_fifo() {
        let queue = StealQueue::with_capacity(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.steal().success(), Some(i));
        }
        assert!(queue.steal().success().is_none());
    }

    #[test]
    fn test_full_deque_hands_value_back() {
        let queue = StealQueue::with_capacity(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(3));

        assert_eq!(queue.steal().success(), Some(1));
        queue.push(3).unwrap();
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_drop_drains_remaining_items() {
        let witness = Arc::new(());

        let queue = StealQueue::with_capacity(4);
        queue.push(Arc::clone(&witness)).unwrap();
        queue.push(Arc::clone(&witness)).unwrap();
        assert_eq!(Arc::strong_count(&witness), 3);

        drop(queue);
        assert_eq!(Arc::strong_count(&witness), 1);
    }

    #[test]
    fn test_owner_and_thieves_conserve_items() {
        const ITEMS: u64 = 100_000;
        const THIEVES: usize = 3;

        let queue = Arc::new(StealQueue::with_capacity(64));
        let stolen_sum = Arc::new(AtomicUsize::new(0));
        let stolen_count = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let thieves: Vec<_> = (0..THIEVES)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let stolen_sum = Arc::clone(&stolen_sum);
                let stolen_count = Arc::clone(&stolen_count);
                let done = Arc::clone(&done);
                thread::spawn(move || loop {
                    match queue.steal() {
                        Steal::Success(value) => {
                            stolen_sum.fetch_add(value as usize, Ordering::Relaxed);
                            stolen_count.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            if done.load(Ordering::Acquire) {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut popped_sum: u64 = 0;
        let mut popped_count: u64 = 0;
        for value in 1..=ITEMS {
            let mut item = value;
            loop {
                match queue.push(item) {
                    Ok(()) => break,
                    Err(back) => item = back,
                }
                // Full: relieve pressure from the owner side.
                if let Some(popped) = queue.pop() {
                    popped_sum += popped;
                    popped_count += 1;
                }
            }
        }
        while let Some(popped) = queue.pop() {
            popped_sum += popped;
            popped_count += 1;
        }
        done.store(true, Ordering::Release);
        for thief in thieves {
            thief.join().unwrap();
        }

        // Every item went to exactly one endpoint.
        let total_count = popped_count + stolen_count.load(Ordering::Relaxed) as u64;
        let total_sum = popped_sum + stolen_sum.load(Ordering::Relaxed) as u64;
        assert_eq!(total_count, ITEMS);
        assert_eq!(total_sum, ITEMS * (ITEMS + 1) / 2);
    }
}
