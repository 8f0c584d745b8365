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

use std::sync::Arc;

use crate::failure::LockFailureStrategy;

/// One declared lock of a guarded call site. Immutable once registered;
/// negative durations defer to the global configuration.
#[derive(Clone)]
pub struct LockOps {
    /// Key stem, falls back to the call-site identifier when empty
    pub name: String,
    /// Definition keys appended to the stem after evaluation
    pub keys: Vec<String>,
    /// Optional condition expression, lock is skipped unless it holds
    pub condition: Option<String>,
    /// Lock expiration, milliseconds, -1 defers to configuration
    pub expire_millis: i64,
    /// Acquire timeout, milliseconds, -1 defers to configuration
    pub acquire_timeout_millis: i64,
    /// Executor registry name, unset means the primary executor
    pub executor: Option<String>,
    /// Release when the guarded call returns
    pub auto_release: bool,
    /// Acquisition order among sibling locks, ascending
    pub order: i32,
    /// Failure strategy override for this lock only
    pub failure_strategy: Option<Arc<dyn LockFailureStrategy>>,
}

impl Default for LockOps {
    fn default() -> Self {
        Self {
            name: String::new(),
            keys: Vec::new(),
            condition: None,
            expire_millis: -1,
            acquire_timeout_millis: -1,
            executor: None,
            auto_release: true,
            order: i32::MAX,
            failure_strategy: None,
        }
    }
}

impl LockOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.keys.push(key.to_string());
        self
    }

    pub fn with_keys<I: IntoIterator<Item = S>, S: Into<String>>(mut self, keys: I) -> Self {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_expire_millis(mut self, expire: i64) -> Self {
        self.expire_millis = expire;
        self
    }

    pub fn with_acquire_timeout_millis(mut self, timeout: i64) -> Self {
        self.acquire_timeout_millis = timeout;
        self
    }

    pub fn with_executor(mut self, name: &str) -> Self {
        self.executor = Some(name.to_string());
        self
    }

    pub fn with_auto_release(mut self, auto_release: bool) -> Self {
        self.auto_release = auto_release;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_failure_strategy(mut self, strategy: Arc<dyn LockFailureStrategy>) -> Self {
        self.failure_strategy = Some(strategy);
        self
    }
}
