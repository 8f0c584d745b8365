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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock expiration time, milliseconds
    pub expire_millis: i64,
    /// Acquire timeout, milliseconds
    pub acquire_timeout_millis: i64,
    /// Retry delay between failed acquire attempts, milliseconds
    pub retry_interval_millis: i64,
    /// Prefix prepended to every lock key
    pub lock_key_prefix: String,
    /// Default executor, unset means first registered
    pub primary_executor: Option<String>,
    /// FIFO queuing among waiters of the in-process table
    pub fair: bool,
    /// Treat unresolvable key expressions as their literal text
    pub allow_literal_expressions: bool,
    /// Eviction sweep interval for the in-process table, 0 disables
    pub sweep_interval_millis: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expire_millis: 30_000,
            acquire_timeout_millis: 3_000,
            retry_interval_millis: 100,
            lock_key_prefix: "lock4rs".to_string(),
            primary_executor: None,
            fair: true,
            allow_literal_expressions: true,
            sweep_interval_millis: 30_000,
        }
    }
}

impl LockConfig {
    pub fn with_expire_millis(mut self, expire: i64) -> Self {
        self.expire_millis = expire;
        self
    }

    pub fn with_acquire_timeout_millis(mut self, timeout: i64) -> Self {
        self.acquire_timeout_millis = timeout;
        self
    }

    pub fn with_retry_interval_millis(mut self, interval: i64) -> Self {
        self.retry_interval_millis = interval;
        self
    }

    pub fn with_lock_key_prefix(mut self, prefix: &str) -> Self {
        self.lock_key_prefix = prefix.to_string();
        self
    }

    pub fn with_primary_executor(mut self, name: &str) -> Self {
        self.primary_executor = Some(name.to_string());
        self
    }

    pub fn with_fair(mut self, fair: bool) -> Self {
        self.fair = fair;
        self
    }

    pub fn with_allow_literal_expressions(mut self, allowed: bool) -> Self {
        self.allow_literal_expressions = allowed;
        self
    }

    pub fn with_sweep_interval_millis(mut self, interval: u64) -> Self {
        self.sweep_interval_millis = interval;
        self
    }
}
