//! Shared/exclusive locks guarding a tree instance.
//!
//! Three interchangeable strategies sit behind [`RawLock`]:
//!
//! * [`NoLock`], single threaded use, conflicting access panics.
//! * [`SpinLock`], busy-waits on an atomic word, never parks the thread.
//! * [`BlockingLock`], backed by parking_lot's reader-writer lock.
//!
//! Containers acquire them through [`ReadGuard`] and [`WriteGuard`], which
//! release deterministically when dropped.

use parking_lot::lock_api::{RawRwLock as _, RawRwLockRecursive as _};

use std::{
    cell::Cell,
    hint,
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Shared/exclusive locking contract.
///
/// # Safety
///
/// Implementations must guarantee that an exclusive holder never overlaps
/// with any other holder, either by waiting or by panicking. Containers are
/// `Sync` only when their lock is `Sync`, [`NoLock`] is not.
pub unsafe trait RawLock: Default + Send {
    /// Acquire shared access, waiting for any exclusive holder. A thread
    /// already holding shared access must not wait on queued writers.
    fn lock_shared(&self);

    /// Acquire exclusive access, waiting for all other holders.
    fn lock_exclusive(&self);

    /// Release shared access.
    ///
    /// # Safety
    ///
    /// Caller must hold a shared acquisition on this lock.
    unsafe fn unlock_shared(&self);

    /// Release exclusive access.
    ///
    /// # Safety
    ///
    /// Caller must hold the exclusive acquisition on this lock.
    unsafe fn unlock_exclusive(&self);

    /// Convert a held shared acquisition into an exclusive one. Return
    /// true if no other holder could have intervened. On false, other
    /// readers were present and the lock went through a release/acquire
    /// cycle, caller must re-validate whatever it read. There is no
    /// fairness relative to other waiters.
    ///
    /// # Safety
    ///
    /// Caller must hold a shared acquisition on this lock.
    unsafe fn relock(&self) -> bool;
}

/// Lock for instances that are not shared across threads. Tracks
/// borrows the way `RefCell` does, there is no other thread to wait for,
/// so a conflicting acquisition panics. For example, a write while a
/// cursor or [`crate::EntryMut`] is alive.
#[derive(Default)]
pub struct NoLock {
    // number of readers, -1 when held exclusive.
    borrow: Cell<isize>,
}

unsafe impl RawLock for NoLock {
    #[inline]
    fn lock_shared(&self) {
        let n = self.borrow.get();
        if n < 0 {
            panic!("lock_shared(): already held exclusive");
        }
        self.borrow.set(n + 1);
    }

    #[inline]
    fn lock_exclusive(&self) {
        match self.borrow.get() {
            0 => self.borrow.set(-1),
            n if n < 0 => panic!("lock_exclusive(): already held exclusive"),
            n => panic!("lock_exclusive(): held by {} readers", n),
        }
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        let n = self.borrow.get();
        debug_assert!(n > 0, "unlock_shared(): not held {}", n);
        self.borrow.set(n - 1);
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        debug_assert_eq!(self.borrow.get(), -1);
        self.borrow.set(0);
    }

    unsafe fn relock(&self) -> bool {
        match self.borrow.get() {
            1 => {
                self.borrow.set(-1);
                true
            }
            n => panic!("relock(): held by {} readers", n),
        }
    }
}

const WRITER: usize = usize::MAX;

/// Busy-wait lock built on a single atomic word. Holds either the number
/// of readers or the `WRITER` marker.
///
/// Never yields to the scheduler, don't use it where the holder can be
/// preempted for long.
#[derive(Default)]
pub struct SpinLock {
    state: AtomicUsize,
}

unsafe impl RawLock for SpinLock {
    fn lock_shared(&self) {
        loop {
            let n = self.state.load(Ordering::Relaxed);
            if n < WRITER - 1 {
                let (new, ord) = (n + 1, Ordering::Acquire);
                let res = self.state.compare_exchange_weak(n, new, ord, Ordering::Relaxed);
                if res.is_ok() {
                    break;
                }
            }
            hint::spin_loop();
        }
    }

    fn lock_exclusive(&self) {
        while self
            .state
            .compare_exchange_weak(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // wait on a plain load, the cache line stays shared meanwhile.
            while self.state.load(Ordering::Relaxed) != 0 {
                hint::spin_loop();
            }
        }
    }

    unsafe fn unlock_shared(&self) {
        let n = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(n != 0 && n != WRITER, "unlock_shared(): not held {}", n);
    }

    unsafe fn unlock_exclusive(&self) {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), WRITER);
        self.state.store(0, Ordering::Release);
    }

    unsafe fn relock(&self) -> bool {
        let ord = Ordering::Acquire;
        match self.state.compare_exchange(1, WRITER, ord, Ordering::Relaxed) {
            Ok(_) => true,
            Err(_) => {
                // SAFETY: caller holds a shared acquisition.
                unsafe { self.unlock_shared() };
                self.lock_exclusive();
                false
            }
        }
    }
}

/// Blocking lock, parks waiting threads using parking_lot.
pub struct BlockingLock {
    raw: parking_lot::RawRwLock,
}

impl Default for BlockingLock {
    fn default() -> BlockingLock {
        BlockingLock {
            raw: parking_lot::RawRwLock::INIT,
        }
    }
}

unsafe impl RawLock for BlockingLock {
    // recursive, so a reader holding a cursor can read again while a
    // writer is queued.
    #[inline]
    fn lock_shared(&self) {
        self.raw.lock_shared_recursive()
    }

    #[inline]
    fn lock_exclusive(&self) {
        self.raw.lock_exclusive()
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        unsafe { self.raw.unlock_shared() }
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        unsafe { self.raw.unlock_exclusive() }
    }

    unsafe fn relock(&self) -> bool {
        // parking_lot can only upgrade its upgradable mode, a plain
        // shared hold has to go through release/acquire.
        unsafe { self.raw.unlock_shared() };
        self.raw.lock_exclusive();
        false
    }
}

/// Shared acquisition, released on drop.
pub struct ReadGuard<'a, L>
where
    L: RawLock,
{
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L> ReadGuard<'a, L>
where
    L: RawLock,
{
    pub fn new(lock: &'a L) -> ReadGuard<'a, L> {
        lock.lock_shared();
        ReadGuard {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Upgrade to exclusive access, refer to [`RawLock::relock`] for the
    /// meaning of the returned flag.
    pub fn upgrade(self) -> (WriteGuard<'a, L>, bool) {
        let lock = self.lock;
        std::mem::forget(self);
        // SAFETY: the forgotten guard held a shared acquisition.
        let seamless = unsafe { lock.relock() };
        let guard = WriteGuard {
            lock,
            _not_send: PhantomData,
        };
        (guard, seamless)
    }
}

impl<'a, L> Drop for ReadGuard<'a, L>
where
    L: RawLock,
{
    fn drop(&mut self) {
        // SAFETY: constructed only after lock_shared().
        unsafe { self.lock.unlock_shared() }
    }
}

/// Exclusive acquisition, released on drop.
pub struct WriteGuard<'a, L>
where
    L: RawLock,
{
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L> WriteGuard<'a, L>
where
    L: RawLock,
{
    pub fn new(lock: &'a L) -> WriteGuard<'a, L> {
        lock.lock_exclusive();
        WriteGuard {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<'a, L> Drop for WriteGuard<'a, L>
where
    L: RawLock,
{
    fn drop(&mut self) {
        // SAFETY: constructed only after lock_exclusive() or relock().
        unsafe { self.lock.unlock_exclusive() }
    }
}
