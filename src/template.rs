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
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::config::LockConfig;
use crate::errors::{LockError, LockResult};
use crate::executor::{LockExecutor, LockInstance};
use crate::util::get_lock_token;

/// A successfully acquired lock. Owned by the caller until released.
#[derive(Clone)]
pub struct LockInfo {
    pub lock_key: String,
    pub lock_value: String,
    pub expire_millis: i64,
    pub acquire_timeout_millis: i64,
    pub acquire_count: u32,
    pub instance: LockInstance,
    pub executor: Arc<dyn LockExecutor>,
}

impl std::fmt::Debug for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockInfo")
            .field("lock_key", &self.lock_key)
            .field("lock_value", &self.lock_value)
            .field("expire_millis", &self.expire_millis)
            .field("acquire_timeout_millis", &self.acquire_timeout_millis)
            .field("acquire_count", &self.acquire_count)
            .finish_non_exhaustive()
    }
}

/// Cooperative cancellation of a pending acquisition. Cancelling
/// aborts the retry loop at its next check and surfaces
/// [`LockError::Interrupted`].
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// === LockTemplate ===
///
/// Turns an executor's single-shot try-acquire into a blocking acquire
/// bounded by an acquire timeout: attempt, sleep the retry interval,
/// attempt again, until a handle is returned or the budget is spent.
pub struct LockTemplate {
    config: LockConfig,
    executors: HashMap<String, Arc<dyn LockExecutor>>,
    primary: Arc<dyn LockExecutor>,
}

impl LockTemplate {
    /// Fails fast on inconsistent configuration, before any lock is
    /// attempted.
    pub fn new(config: LockConfig, executors: Vec<Arc<dyn LockExecutor>>) -> LockResult<Self> {
        if executors.is_empty() {
            return Err(LockError::ConfigError(
                "at least one lock executor is required".to_string(),
            ));
        }
        if config.acquire_timeout_millis < 0 {
            return Err(LockError::ConfigError(
                "acquire timeout must be at least 0".to_string(),
            ));
        }
        if config.expire_millis < -1 {
            return Err(LockError::ConfigError(
                "expire must be at least -1".to_string(),
            ));
        }
        if config.retry_interval_millis < 0 {
            return Err(LockError::ConfigError(
                "retry interval must be at least 0".to_string(),
            ));
        }
        if config.lock_key_prefix.trim().is_empty() {
            return Err(LockError::ConfigError(
                "lock key prefix must not be blank".to_string(),
            ));
        }

        let mut map: HashMap<String, Arc<dyn LockExecutor>> = HashMap::new();
        for executor in &executors {
            map.insert(executor.name().to_string(), executor.clone());
        }
        let primary = match &config.primary_executor {
            Some(name) => map
                .get(name)
                .cloned()
                .ok_or_else(|| LockError::ExecutorNotFound(name.clone()))?,
            None => executors[0].clone(),
        };
        Ok(Self {
            config,
            executors: map,
            primary,
        })
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Resolve an executor by registry name; `None` means the primary.
    pub fn executor(&self, name: Option<&str>) -> LockResult<Arc<dyn LockExecutor>> {
        match name {
            None => Ok(self.primary.clone()),
            Some(name) => self
                .executors
                .get(name)
                .cloned()
                .ok_or_else(|| LockError::ExecutorNotFound(name.to_string())),
        }
    }

    /// Acquire with configured defaults.
    pub fn lock(&self, key: &str) -> LockResult<Option<LockInfo>> {
        self.lock_with(key, 0, -1, None)
    }

    /// Acquire `key` for up to `expire` ms, waiting at most
    /// `acquire_timeout` ms. Negative arguments defer to the
    /// configuration; `expire == -1` on a renewing executor means
    /// "renew until released". Returns `Ok(None)` when the budget is
    /// exhausted.
    pub fn lock_with(
        &self,
        key: &str,
        expire: i64,
        acquire_timeout: i64,
        executor: Option<&str>,
    ) -> LockResult<Option<LockInfo>> {
        self.lock_cancellable(key, expire, acquire_timeout, executor, None)
    }

    pub fn lock_cancellable(
        &self,
        key: &str,
        expire: i64,
        acquire_timeout: i64,
        executor: Option<&str>,
        cancellation: Option<&CancellationToken>,
    ) -> LockResult<Option<LockInfo>> {
        let acquire_timeout = if acquire_timeout < 0 {
            self.config.acquire_timeout_millis
        } else {
            acquire_timeout
        };
        let executor = self.executor(executor)?;
        debug!(executor = executor.name(), key = %key, "acquiring lock");
        let expire = if !executor.renewal() && expire <= 0 {
            self.config.expire_millis
        } else {
            expire
        };

        let mut acquire_count = 0;
        let value = get_lock_token();
        let start = Instant::now();
        loop {
            acquire_count += 1;
            // first success wins, the remaining budget is not consumed
            if let Some(instance) = executor.acquire(key, &value, expire, acquire_timeout)? {
                debug!(key = %key, acquire_count, "lock acquired");
                return Ok(Some(LockInfo {
                    lock_key: key.to_string(),
                    lock_value: value,
                    expire_millis: expire,
                    acquire_timeout_millis: acquire_timeout,
                    acquire_count,
                    instance,
                    executor,
                }));
            }
            self.retry_sleep(cancellation)?;
            if start.elapsed().as_millis() as i64 >= acquire_timeout {
                debug!(key = %key, acquire_count, "lock acquisition timed out");
                return Ok(None);
            }
        }
    }

    /// Interruptible retry delay; cancellation aborts the whole
    /// pending acquisition, not just the current nap.
    fn retry_sleep(&self, cancellation: Option<&CancellationToken>) -> LockResult<()> {
        let interval = Duration::from_millis(self.config.retry_interval_millis.max(0) as u64);
        let deadline = Instant::now() + interval;
        loop {
            if let Some(token) = cancellation {
                if token.is_cancelled() {
                    return Err(LockError::Interrupted);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }

    /// Ownership-checked release of a previously acquired lock. False
    /// is a cleanup anomaly, not a failure of the completing call.
    pub fn release_lock(&self, lock_info: &LockInfo) -> bool {
        let released = lock_info.executor.release_lock(
            &lock_info.lock_key,
            &lock_info.lock_value,
            &lock_info.instance,
        );
        if !released {
            error!(
                key = %lock_info.lock_key,
                value = %lock_info.lock_value,
                "release lock fail"
            );
        }
        released
    }
}
