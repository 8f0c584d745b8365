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
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::RedisConnectionManager;
use crate::errors::LockResult;
use crate::executor::{LockExecutor, LockInstance, RenewalWatchdog};
use crate::scripts;

/// === RedisLockExecutor ===
///
/// Token-value lock over a single redis instance: SET NX PX to
/// acquire, compare-and-delete to release. With `expire == -1` a
/// renewal watchdog re-extends the lease at a third of its length
/// until the lock is released.
pub struct RedisLockExecutor {
    connections: Arc<RedisConnectionManager>,
    default_expire_millis: i64,
    watchdogs: Mutex<HashMap<String, RenewalWatchdog>>,
}

impl RedisLockExecutor {
    pub const NAME: &'static str = "redis";

    pub fn new(connections: Arc<RedisConnectionManager>, default_expire_millis: i64) -> Self {
        Self {
            connections,
            default_expire_millis,
            watchdogs: Mutex::new(HashMap::new()),
        }
    }

    fn start_renewal(&self, key: &str, value: &str, lease_millis: i64) {
        let connections = self.connections.clone();
        let key_owned = key.to_string();
        let value_owned = value.to_string();
        let renew_func = move || {
            let mut conn = match connections.get_connection() {
                Ok(conn) => conn,
                Err(_) => return false,
            };
            scripts::RENEW_SCRIPT
                .key(&key_owned)
                .arg(&value_owned)
                .arg(lease_millis)
                .invoke::<i64>(&mut *conn)
                .map(|renewed| renewed == 1)
                .unwrap_or(false)
        };
        let interval = Duration::from_millis((lease_millis / 3).max(1) as u64);
        let watchdog = RenewalWatchdog::start(interval, renew_func);
        if let Some(mut old) = self.watchdogs.lock().insert(key.to_string(), watchdog) {
            old.stop();
        }
    }

    fn stop_renewal(&self, key: &str) {
        if let Some(mut watchdog) = self.watchdogs.lock().remove(key) {
            watchdog.stop();
        }
    }
}

impl LockExecutor for RedisLockExecutor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn renewal(&self) -> bool {
        true
    }

    fn acquire(
        &self,
        lock_key: &str,
        lock_value: &str,
        expire: i64,
        _acquire_timeout: i64,
    ) -> LockResult<Option<LockInstance>> {
        let lease = if expire > 0 {
            expire
        } else {
            self.default_expire_millis
        };
        let mut conn = self.connections.get_connection()?;
        let acquired: i64 = scripts::ACQUIRE_SCRIPT
            .key(lock_key)
            .arg(lock_value)
            .arg(lease)
            .invoke(&mut *conn)?;
        if acquired != 1 {
            return Ok(None);
        }
        debug!(key = %lock_key, lease, "redis lock acquired");
        if expire == -1 {
            self.start_renewal(lock_key, lock_value, lease);
        }
        Ok(Some(Arc::new(lock_value.to_string()) as LockInstance))
    }

    fn release_lock(&self, key: &str, value: &str, _instance: &LockInstance) -> bool {
        self.stop_renewal(key);
        let mut conn = match self.connections.get_connection() {
            Ok(conn) => conn,
            Err(err) => {
                warn!(key = %key, error = %err, "release skipped, no connection");
                return false;
            }
        };
        match scripts::RELEASE_SCRIPT
            .key(key)
            .arg(value)
            .invoke::<i64>(&mut *conn)
        {
            Ok(deleted) => deleted == 1,
            Err(err) => {
                warn!(key = %key, error = %err, "release script failed");
                false
            }
        }
    }
}
