//! Which preference-list entries are in use or dead during a transfer.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Busy,
    Failed,
}

/// Per-host availability, indexed by preference-list position.
#[derive(Debug)]
pub struct Board {
    slots: Mutex<Vec<Slot>>,
}

impl Board {
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![Slot::Free; len]),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Vec<Slot>) -> R) -> R {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut slots)
    }

    pub fn mark_busy(&self, pos: usize) {
        self.with(|s| s[pos] = Slot::Busy);
    }

    pub fn mark_failed(&self, pos: usize) {
        self.with(|s| s[pos] = Slot::Failed);
    }

    pub fn usable(&self) -> usize {
        self.with(|s| s.iter().filter(|&&x| x != Slot::Failed).count())
    }

    #[cfg(test)]
    pub fn is_failed(&self, pos: usize) -> bool {
        self.with(|s| s[pos] == Slot::Failed)
    }

    /// Next free entry after `after` (wrapping), claimed. Failing that, any
    /// live entry after `home`, shared with whoever holds it.
    pub fn claim(&self, after: usize, home: usize) -> Option<usize> {
        self.with(|s| {
            let n = s.len();
            if n == 0 {
                return None;
            }
            if let Some(pos) = (1..=n).map(|k| (after + k) % n).find(|&p| s[p] == Slot::Free) {
                s[pos] = Slot::Busy;
                return Some(pos);
            }
            (1..=n).map(|k| (home + k) % n).find(|&p| s[p] != Slot::Failed)
        })
    }

    /// Marks `pos` dead and claims a replacement.
    pub fn fail_over(&self, pos: usize, home: usize) -> Option<usize> {
        self.mark_failed(pos);
        self.claim(pos, home)
    }
}
