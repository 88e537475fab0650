//! Process-wide barrier over running accept loops.

use parking_lot::{Condvar, Mutex};
use std::sync::OnceLock;

/// Counts the accept loops dispatched in this process and lets a caller
/// block until every one of them has exited.
///
/// The group is a lazily-initialised singleton: each `listen` checks a
/// loop in before its accept thread starts and the thread checks out on
/// exit. Loops registered while a waiter is blocked extend the wait.
pub struct ListenerGroup {
    active: Mutex<usize>,
    all_done: Condvar,
}

impl ListenerGroup {
    fn shared() -> &'static ListenerGroup {
        static GROUP: OnceLock<ListenerGroup> = OnceLock::new();
        GROUP.get_or_init(|| ListenerGroup {
            active: Mutex::new(0),
            all_done: Condvar::new(),
        })
    }

    pub(crate) fn enter() {
        *Self::shared().active.lock() += 1;
    }

    pub(crate) fn leave() {
        let group = Self::shared();
        let mut active = group.active.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            group.all_done.notify_all();
        }
    }

    /// Blocks the calling thread until every registered accept loop has
    /// completed. Intended for a thread outside the worker runtime,
    /// typically `main`.
    pub fn wait_for_listeners() {
        let group = Self::shared();
        let mut active = group.active.lock();
        while *active > 0 {
            group.all_done.wait(&mut active);
        }
    }

    /// Accept loops currently registered.
    pub fn active_listeners() -> usize {
        *Self::shared().active.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn wait_returns_once_loops_leave() {
        ListenerGroup::enter();
        ListenerGroup::enter();

        let waiter = thread::spawn(|| {
            ListenerGroup::wait_for_listeners();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        ListenerGroup::leave();
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        ListenerGroup::leave();
        waiter.join().unwrap();
        assert_eq!(ListenerGroup::active_listeners(), 0);
    }
}
