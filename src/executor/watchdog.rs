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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Re-extends the lease of one held lock on a fixed cadence until it
/// is stopped, the renewal fails, or the watchdog is dropped.
pub struct RenewalWatchdog {
    should_stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RenewalWatchdog {
    pub fn start<F>(renew_interval: Duration, renew_func: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = should_stop.clone();
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                // chunked sleep so a stop is honored promptly
                let mut slept = Duration::from_secs(0);
                while slept < renew_interval && !stop.load(Ordering::SeqCst) {
                    let chunk = (renew_interval - slept).min(Duration::from_millis(50));
                    thread::sleep(chunk);
                    slept += chunk;
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                // a failed renewal means the lock is gone, stop here
                if !renew_func() {
                    break;
                }
            }
        });
        Self {
            should_stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenewalWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_renews_until_stopped() {
        let renewals = Arc::new(AtomicU32::new(0));
        let counter = renewals.clone();
        let mut watchdog = RenewalWatchdog::start(Duration::from_millis(40), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        thread::sleep(Duration::from_millis(200));
        watchdog.stop();
        let after_stop = renewals.load(Ordering::SeqCst);
        assert!(after_stop >= 2);

        // no further renewals once stopped
        thread::sleep(Duration::from_millis(120));
        assert_eq!(renewals.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_failed_renewal_ends_the_loop() {
        let renewals = Arc::new(AtomicU32::new(0));
        let counter = renewals.clone();
        let _watchdog = RenewalWatchdog::start(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 1
        });
        thread::sleep(Duration::from_millis(250));
        assert_eq!(renewals.load(Ordering::SeqCst), 2);
    }
}
