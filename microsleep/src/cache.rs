//! Per-task cache of one-shot timers.
//!
//! Every task that has delayed at least once owns one slot, looked up by its task ID.
//! A slot is only freed by [`TimerCache::release`], which ports trigger when the task terminates.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::{Error, debug, port::TaskId, signal::Signal};

struct Entry<T> {
    task: TaskId,
    timer: T,
    armed: bool,
}

/// A task's cached timer together with the slot holding it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Lease<T> {
    pub(crate) slot: usize,
    pub(crate) timer: T,
}

pub(crate) struct TimerCache<T, const N: usize> {
    entries: Mutex<RefCell<[Option<Entry<T>>; N]>>,
    /// Indexed by slot, outside of the mutex so that a waiting task can poll its own without locking
    signals: [Signal; N],
}

impl<T: Copy, const N: usize> TimerCache<T, N> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new([const { None }; N])),
            signals: [const { Signal::new() }; N],
        }
    }

    /// Returns the timer of `task`, calling `create` if it has none yet.
    ///
    /// A timer created while the last free slot was taken by another task is handed to `discard`.
    pub(crate) fn acquire(
        &self,
        task: TaskId,
        create: impl FnOnce() -> Result<T, Error>,
        discard: impl FnOnce(T),
    ) -> Result<Lease<T>, Error> {
        let cached = critical_section::with(|cs| {
            let entries = self.entries.borrow_ref(cs);
            if let Some(slot) = find(&*entries, task) {
                let Some(ref entry) = entries[slot] else {
                    unreachable!()
                };
                return Ok(Some(Lease {
                    slot,
                    timer: entry.timer,
                }));
            }

            if entries.iter().all(Option::is_some) {
                return Err(Error::ResourceCreationFailed);
            }

            Ok(None)
        })?;

        if let Some(lease) = cached {
            return Ok(lease);
        }

        // The driver may allocate, so this happens outside of the critical section
        let timer = create()?;

        let slot = critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            let slot = entries.iter().position(Option::is_none)?;
            entries[slot] = Some(Entry {
                task,
                timer,
                armed: false,
            });
            self.signals[slot].clear();
            Some(slot)
        });

        let Some(slot) = slot else {
            discard(timer);
            return Err(Error::ResourceCreationFailed);
        };

        debug!("Timer created for task #{} (slot {})", task, slot);

        Ok(Lease { slot, timer })
    }

    /// Frees the slot of `task` and hands back its timer for deletion.
    pub(crate) fn release(&self, task: TaskId) -> Option<T> {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            let slot = find(&*entries, task)?;
            let entry = entries[slot].take()?;
            self.signals[slot].clear();
            Some(entry.timer)
        })
    }

    /// Raises the signal of `task`. Runs in interrupt context.
    ///
    /// Returns `false` if `task` has no cached timer.
    pub(crate) fn notify(&self, task: TaskId) -> bool {
        critical_section::with(|cs| {
            let entries = self.entries.borrow_ref(cs);
            let Some(slot) = find(&*entries, task) else {
                return false;
            };
            self.signals[slot].raise();
            true
        })
    }

    /// Marks the timer in `slot` as armed. A timer can be armed by one delay at a time.
    pub(crate) fn arm(&self, slot: usize) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            let Some(Some(entry)) = entries.get_mut(slot) else {
                return Err(Error::InvalidState);
            };
            if entry.armed {
                return Err(Error::InvalidState);
            }
            entry.armed = true;

            Ok(())
        })
    }

    pub(crate) fn disarm(&self, slot: usize) {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            if let Some(Some(entry)) = entries.get_mut(slot) {
                entry.armed = false;
            }
        });
    }

    pub(crate) fn signal(&self, slot: usize) -> &Signal {
        &self.signals[slot]
    }

    pub(crate) fn len(&self) -> usize {
        critical_section::with(|cs| {
            self.entries
                .borrow_ref(cs)
                .iter()
                .filter(|entry| entry.is_some())
                .count()
        })
    }
}

fn find<T>(entries: &[Option<Entry<T>>], task: TaskId) -> Option<usize> {
    entries
        .iter()
        .position(|entry| matches!(entry, Some(entry) if entry.task == task))
}
