/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::errors::LockResult;
use crate::executor::{LockExecutor, LockInstance};
use crate::util::{now_millis, thread_id_to_u64};

/// === LocalLock (expiring reentrant lock) ===
///
/// Reentrant per-key lock with a wall-clock expiry. The same thread may
/// re-acquire it without blocking and must unlock once per acquisition.
/// In fair mode waiters are granted the lock in arrival order.
pub struct LocalLock {
    state: Mutex<LockState>,
    available: Condvar,
    /// Expiry instant, milliseconds since the epoch, [`NEVER_EXPIRE`]
    /// for none.
    expire_at: AtomicI64,
    fair: bool,
}

struct LockState {
    owner: Option<u64>,
    hold_count: u32,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

impl LocalLock {
    pub const NEVER_EXPIRE: i64 = -1;

    fn new(fair: bool, expire: i64) -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                hold_count: 0,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            available: Condvar::new(),
            expire_at: AtomicI64::new(Self::expiry_for(expire)),
            fair,
        }
    }

    fn expiry_for(expire: i64) -> i64 {
        if expire < 0 {
            Self::NEVER_EXPIRE
        } else {
            now_millis() + expire
        }
    }

    pub fn is_expired(&self) -> bool {
        let at = self.expire_at.load(Ordering::Acquire);
        at != Self::NEVER_EXPIRE && now_millis() > at
    }

    /// Push the expiry out again. Applied on every successful acquire,
    /// reentrant ones included.
    pub fn reset_expire(&self, expire: i64) {
        self.expire_at.store(Self::expiry_for(expire), Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread_id_to_u64())
    }

    /// Reentrancy depth of the current owner, 0 when unheld.
    pub fn hold_count(&self) -> u32 {
        self.state.lock().hold_count
    }

    /// Number of threads queued for this lock.
    pub fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Block up to `timeout` for the lock. Reentrant acquisition never
    /// blocks. Returns false when the timeout elapses without a grant.
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread_id_to_u64();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.hold_count += 1;
            return true;
        }
        if state.owner.is_none() && (!self.fair || state.queue.is_empty()) {
            state.owner = Some(me);
            state.hold_count = 1;
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        let deadline = Instant::now() + timeout;
        loop {
            if self.claimable(&state, ticket) {
                Self::remove_ticket(&mut state.queue, ticket);
                state.owner = Some(me);
                state.hold_count = 1;
                return true;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                // the grant may have raced the timeout
                if self.claimable(&state, ticket) {
                    Self::remove_ticket(&mut state.queue, ticket);
                    state.owner = Some(me);
                    state.hold_count = 1;
                    return true;
                }
                Self::remove_ticket(&mut state.queue, ticket);
                // a departing head waiter unblocks the next in line
                self.available.notify_all();
                return false;
            }
        }
    }

    fn claimable(&self, state: &LockState, ticket: u64) -> bool {
        state.owner.is_none() && (!self.fair || state.queue.front() == Some(&ticket))
    }

    fn remove_ticket(queue: &mut VecDeque<u64>, ticket: u64) {
        if let Some(index) = queue.iter().position(|t| *t == ticket) {
            queue.remove(index);
        }
    }

    /// Unlock once. False when the calling thread is not the owner.
    pub fn unlock(&self) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id_to_u64()) {
            return false;
        }
        state.hold_count -= 1;
        if state.hold_count == 0 {
            state.owner = None;
            self.available.notify_all();
        }
        true
    }
}

/// === LocalLockExecutor ===
///
/// In-process lock table. Each key maps to at most one live
/// [`LocalLock`]:
/// - a key with no entry, or whose entry has expired, gets a fresh
///   instance installed; a superseded instance no longer affects anyone
/// - while an entry is unexpired, competing threads contend on that one
///   instance, and a holder re-acquiring extends its expiry
/// - the last release with no queued waiters removes the entry
///
/// A holder that bypasses [`LockExecutor::release_lock`] and unlocks
/// the instance directly would otherwise park an expired entry in the
/// table forever; the background sweeper evicts entries that are
/// expired, waiter-free and no longer referenced outside the table.
pub struct LocalLockExecutor {
    fair: bool,
    locks: Arc<Mutex<HashMap<String, Arc<LocalLock>>>>,
    sweeper: Option<TableSweeper>,
}

impl LocalLockExecutor {
    pub const NAME: &'static str = "local";

    pub fn new(fair: bool) -> Self {
        Self {
            fair,
            locks: Arc::new(Mutex::new(HashMap::new())),
            sweeper: None,
        }
    }

    /// Start the eviction sweeper. Without it, abandoned entries are
    /// reclaimed only when a later acquire supersedes them.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.sweeper = Some(TableSweeper::start(self.locks.clone(), interval));
        }
        self
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn sweep(locks: &Mutex<HashMap<String, Arc<LocalLock>>>) {
        locks.lock().retain(|key, lock| {
            let evictable = lock.is_expired()
                && lock.queue_length() == 0
                && Arc::strong_count(lock) == 1;
            if evictable {
                debug!(key = %key, "evicting abandoned lock entry");
            }
            !evictable
        });
    }
}

impl Default for LocalLockExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LockExecutor for LocalLockExecutor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn acquire(
        &self,
        lock_key: &str,
        _lock_value: &str,
        expire: i64,
        acquire_timeout: i64,
    ) -> LockResult<Option<LockInstance>> {
        // Install-or-reuse must be atomic per key: keep the live entry,
        // replace an expired one with a fresh instance. After
        // replacement the old instance no longer affects other threads.
        let lock = {
            let mut locks = self.locks.lock();
            match locks.get(lock_key) {
                Some(current) if !current.is_expired() => current.clone(),
                _ => {
                    let fresh = Arc::new(LocalLock::new(self.fair, expire));
                    locks.insert(lock_key.to_string(), fresh.clone());
                    fresh
                }
            }
        };
        let timeout = Duration::from_millis(acquire_timeout.max(0) as u64);
        if lock.try_lock_for(timeout) {
            // reentrant or not, a successful acquire refreshes the ttl
            lock.reset_expire(expire);
            return Ok(Some(lock as LockInstance));
        }
        Ok(None)
    }

    fn release_lock(&self, key: &str, _value: &str, instance: &LockInstance) -> bool {
        let Ok(lock) = instance.clone().downcast::<LocalLock>() else {
            return false;
        };
        // released through the raw instance already, or never ours
        if !lock.is_held_by_current_thread() {
            return false;
        }
        // snapshot before unlocking: an expired lock unlocks all the
        // same but its release is reported as failed
        let expired = lock.is_expired();
        {
            let mut locks = self.locks.lock();
            if let Some(current) = locks.get(key) {
                // identity, not key equality: the mapping may already
                // point at a successor instance
                let last_release = Arc::ptr_eq(current, &lock)
                    && lock.hold_count() <= 1
                    && lock.queue_length() == 0;
                if last_release {
                    locks.remove(key);
                }
            }
        }
        lock.unlock();
        !expired
    }
}

/// Background eviction loop over the lock table. Sleeps in short
/// chunks so a stop is honored promptly; joined on drop.
struct TableSweeper {
    should_stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TableSweeper {
    fn start(locks: Arc<Mutex<HashMap<String, Arc<LocalLock>>>>, interval: Duration) -> Self {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = should_stop.clone();
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let mut slept = Duration::from_secs(0);
                while slept < interval && !stop.load(Ordering::SeqCst) {
                    let chunk = (interval - slept).min(Duration::from_millis(100));
                    thread::sleep(chunk);
                    slept += chunk;
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                LocalLockExecutor::sweep(&locks);
            }
        });
        Self {
            should_stop,
            handle: Some(handle),
        }
    }
}

impl Drop for TableSweeper {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const KEY: &str = "key";
    const VALUE: &str = "value";

    fn downcast(instance: &LockInstance) -> Arc<LocalLock> {
        instance.clone().downcast::<LocalLock>().unwrap()
    }

    #[test]
    fn test_acquire_and_release() {
        let executor = LocalLockExecutor::new(true);
        let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        let lock = downcast(&instance);
        assert!(!lock.is_expired());
        assert!(lock.is_locked());
        assert!(lock.is_held_by_current_thread());

        assert!(executor.release_lock(KEY, VALUE, &instance));
        assert!(!lock.is_locked());
        assert!(!lock.is_held_by_current_thread());
        assert_eq!(executor.entry_count(), 0);
    }

    #[test]
    fn test_expired_release_reports_failure() {
        let executor = LocalLockExecutor::new(true);
        let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        let lock = downcast(&instance);
        assert!(!lock.is_expired());

        thread::sleep(Duration::from_millis(500));

        // the mutex still unlocks, but the protection window had lapsed
        assert!(lock.is_expired());
        assert!(lock.is_locked());
        assert!(!executor.release_lock(KEY, VALUE, &instance));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_reentrant_acquire() {
        let executor = LocalLockExecutor::new(true);
        let first = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        let lock1 = downcast(&first);

        // unexpired, so the same instance is handed back without blocking
        let second = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        let lock2 = downcast(&second);
        assert!(Arc::ptr_eq(&lock1, &lock2));
        assert_eq!(lock2.hold_count(), 2);

        // one release per acquisition before the key is free again
        assert!(executor.release_lock(KEY, VALUE, &second));
        assert!(lock2.is_held_by_current_thread());
        assert!(executor.release_lock(KEY, VALUE, &second));
        assert!(!lock2.is_held_by_current_thread());

        // no longer held, further releases are no-ops
        assert!(!executor.release_lock(KEY, VALUE, &first));
    }

    #[test]
    fn test_reacquire_after_expiry_yields_new_lock() {
        let executor = LocalLockExecutor::new(true);
        let first = executor.acquire(KEY, VALUE, 250, 250).unwrap().unwrap();
        let lock1 = downcast(&first);

        thread::sleep(Duration::from_millis(500));
        assert!(lock1.is_expired());

        // expiry superseded the entry, the same thread gets a fresh one
        let second = executor.acquire(KEY, VALUE, 500, 250).unwrap().unwrap();
        let lock2 = downcast(&second);
        assert!(!Arc::ptr_eq(&lock1, &lock2));
        assert!(!lock2.is_expired());

        // the stale instance releases as failed and leaves the
        // successor untouched
        assert!(!executor.release_lock(KEY, VALUE, &first));
        assert!(!lock1.is_held_by_current_thread());
        assert!(lock2.is_held_by_current_thread());

        assert!(executor.release_lock(KEY, VALUE, &second));
        assert!(!lock2.is_held_by_current_thread());
    }

    #[test]
    fn test_contention_one_winner() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let instance = executor
            .acquire(KEY, VALUE, LocalLock::NEVER_EXPIRE, 0)
            .unwrap()
            .unwrap();

        // the second thread times out while the holder keeps the lock
        let loser = {
            let executor = executor.clone();
            thread::spawn(move || executor.acquire(KEY, VALUE, 250, 250).unwrap())
        };
        assert!(loser.join().unwrap().is_none());

        assert!(executor.release_lock(KEY, VALUE, &instance));

        // and succeeds once the holder is gone
        let winner = {
            let executor = executor.clone();
            thread::spawn(move || {
                let instance = executor.acquire(KEY, VALUE, 250, 250).unwrap().unwrap();
                executor.release_lock(KEY, VALUE, &instance)
            })
        };
        assert!(winner.join().unwrap());
    }

    #[test]
    fn test_fresh_key_race_single_winner() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let barrier = Arc::new(std::sync::Barrier::new(4));
        let mut racers = Vec::new();
        for _ in 0..4 {
            let executor = executor.clone();
            let barrier = barrier.clone();
            racers.push(thread::spawn(move || {
                barrier.wait();
                let instance = executor
                    .acquire(KEY, VALUE, LocalLock::NEVER_EXPIRE, 100)
                    .unwrap();
                if let Some(instance) = &instance {
                    // outlive every loser's timeout before releasing
                    thread::sleep(Duration::from_millis(300));
                    assert!(executor.release_lock(KEY, VALUE, instance));
                }
                instance.is_some()
            }));
        }
        let outcomes: Vec<bool> = racers
            .into_iter()
            .map(|racer| racer.join().unwrap())
            .collect();
        assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);
        assert_eq!(executor.entry_count(), 0);
    }

    #[test]
    fn test_supersession_across_threads() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        let lock1 = downcast(&instance);

        thread::sleep(Duration::from_millis(500));

        // the other thread claims a fresh instance over the expired one
        let other = {
            let executor = executor.clone();
            let lock1 = lock1.clone();
            thread::spawn(move || {
                let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
                let lock2 = instance.clone().downcast::<LocalLock>().unwrap();
                assert!(!Arc::ptr_eq(&lock1, &lock2));
                assert!(executor.release_lock(KEY, VALUE, &instance));
            })
        };
        other.join().unwrap();

        // the late original release fails without touching the successor
        assert!(!executor.release_lock(KEY, VALUE, &instance));
        assert!(!lock1.is_held_by_current_thread());
    }

    #[test]
    fn test_entry_persists_while_waiter_queued() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let instance = executor
            .acquire(KEY, VALUE, LocalLock::NEVER_EXPIRE, 0)
            .unwrap()
            .unwrap();
        let lock = downcast(&instance);

        let (queued_tx, queued_rx) = mpsc::channel();
        let waiter = {
            let executor = executor.clone();
            thread::spawn(move || {
                queued_tx.send(()).unwrap();
                let instance = executor.acquire(KEY, VALUE, 250, 2_000).unwrap().unwrap();
                // keep holding so the entry is observably retained
                thread::sleep(Duration::from_millis(100));
                executor.release_lock(KEY, VALUE, &instance)
            })
        };
        queued_rx.recv().unwrap();
        // wait until the waiter is actually parked on the entry
        while lock.queue_length() == 0 {
            thread::sleep(Duration::from_millis(10));
        }

        // release with a queued waiter must leave the mapping in place
        assert!(executor.release_lock(KEY, VALUE, &instance));
        assert_eq!(executor.entry_count(), 1);

        assert!(waiter.join().unwrap());
        assert_eq!(executor.entry_count(), 0);
    }

    #[test]
    fn test_bypassed_release_does_not_corrupt_key() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let stale = {
            let executor = executor.clone();
            thread::spawn(move || {
                let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
                let lock = instance.clone().downcast::<LocalLock>().unwrap();
                // unlock around the table entirely
                assert!(lock.unlock());
                instance
            })
        }
        .join()
        .unwrap();

        // the abandoned instance can no longer be released through the
        // table, and fresh acquisitions on the key are unaffected
        assert!(!executor.release_lock(KEY, VALUE, &stale));
        let fresh = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&downcast(&stale), &downcast(&fresh)));
        assert!(executor.release_lock(KEY, VALUE, &fresh));
    }

    #[test]
    fn test_sweeper_evicts_abandoned_entries() {
        let executor =
            LocalLockExecutor::new(true).with_sweep_interval(Duration::from_millis(100));
        {
            let instance = executor.acquire(KEY, VALUE, 100, 0).unwrap().unwrap();
            downcast(&instance).unlock();
        }
        assert_eq!(executor.entry_count(), 1);

        thread::sleep(Duration::from_millis(600));
        assert_eq!(executor.entry_count(), 0);
    }

    #[test]
    fn test_sweeper_keeps_live_and_referenced_entries() {
        let executor =
            LocalLockExecutor::new(true).with_sweep_interval(Duration::from_millis(100));
        // held and unexpired
        let held = executor.acquire("live", VALUE, 60_000, 0).unwrap().unwrap();
        // expired but still referenced by this handle
        let referenced = executor.acquire("stale", VALUE, 50, 0).unwrap().unwrap();
        downcast(&referenced).unlock();

        thread::sleep(Duration::from_millis(400));
        assert_eq!(executor.entry_count(), 2);

        assert!(executor.release_lock("live", VALUE, &held));
        drop(referenced);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(executor.entry_count(), 0);
    }

    #[test]
    fn test_fair_mode_grants_in_fifo_order() {
        let executor = Arc::new(LocalLockExecutor::new(true));
        let instance = executor
            .acquire(KEY, VALUE, LocalLock::NEVER_EXPIRE, 0)
            .unwrap()
            .unwrap();
        let lock = downcast(&instance);

        let (order_tx, order_rx) = mpsc::channel();
        let mut waiters = Vec::new();
        for index in 0..3 {
            let executor = executor.clone();
            let order_tx = order_tx.clone();
            waiters.push(thread::spawn(move || {
                let instance = executor
                    .acquire(KEY, VALUE, LocalLock::NEVER_EXPIRE, 5_000)
                    .unwrap()
                    .unwrap();
                order_tx.send(index).unwrap();
                executor.release_lock(KEY, VALUE, &instance);
            }));
            // serialize enqueue order
            while lock.queue_length() <= index {
                thread::sleep(Duration::from_millis(10));
            }
        }

        assert!(executor.release_lock(KEY, VALUE, &instance));
        for waiter in waiters {
            waiter.join().unwrap();
        }
        let granted: Vec<usize> = order_rx.try_iter().collect();
        assert_eq!(granted, vec![0, 1, 2]);
    }

    #[test]
    fn test_unfair_mode_reentrant_fast_path() {
        let executor = LocalLockExecutor::new(false);
        let instance = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        // reentrant fast path is independent of fairness
        let again = executor.acquire(KEY, VALUE, 250, 0).unwrap().unwrap();
        assert!(Arc::ptr_eq(&downcast(&instance), &downcast(&again)));
        assert!(executor.release_lock(KEY, VALUE, &again));
        assert!(executor.release_lock(KEY, VALUE, &instance));
    }
}
