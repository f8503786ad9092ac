//! Bounded worker counts on shared objects (harvesters on a tree, builders on
//! a building). A claim is a guard: dropping it gives the slot back, so a task
//! state that is terminated, replaced, or dropped along with a dead owner can
//! never leak a count.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub struct SlotCounter {
    capacity: u32,
    claimed: Rc<Cell<u32>>,
}

impl SlotCounter {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            claimed: Rc::new(Cell::new(0)),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn claimed(&self) -> u32 {
        self.claimed.get()
    }

    pub fn is_full(&self) -> bool {
        self.claimed.get() >= self.capacity
    }

    pub fn try_claim(&self) -> Option<SlotClaim> {
        if self.is_full() {
            return None;
        }
        self.claimed.set(self.claimed.get().saturating_add(1));
        Some(SlotClaim {
            claimed: Rc::clone(&self.claimed),
        })
    }
}

impl fmt::Debug for SlotCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCounter")
            .field("capacity", &self.capacity)
            .field("claimed", &self.claimed.get())
            .finish()
    }
}

#[must_use = "dropping a claim releases the slot immediately"]
pub struct SlotClaim {
    claimed: Rc<Cell<u32>>,
}

impl SlotClaim {
    pub fn release(self) {}
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.claimed.set(self.claimed.get().saturating_sub(1));
    }
}

impl fmt::Debug for SlotClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotClaim")
            .field("claimed", &self.claimed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_bounded_by_capacity() {
        let counter = SlotCounter::new(2);
        let first = counter.try_claim().expect("first");
        let _second = counter.try_claim().expect("second");
        assert!(counter.try_claim().is_none());
        assert_eq!(counter.claimed(), 2);

        first.release();
        assert_eq!(counter.claimed(), 1);
        assert!(!counter.is_full());
    }

    #[test]
    fn dropping_claims_returns_every_slot() {
        let counter = SlotCounter::new(3);
        {
            let _a = counter.try_claim();
            let _b = counter.try_claim();
            assert_eq!(counter.claimed(), 2);
        }
        assert_eq!(counter.claimed(), 0);
    }

    #[test]
    fn clones_share_the_same_count() {
        let counter = SlotCounter::new(1);
        let alias = counter.clone();
        let _claim = alias.try_claim().expect("claim");
        assert!(counter.is_full());
    }
}
