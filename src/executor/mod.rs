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
mod local;
mod redis;
mod watchdog;

pub use self::local::*;
pub use self::redis::*;
pub use self::watchdog::*;

use std::any::Any;
use std::sync::Arc;

use crate::errors::LockResult;

/// Backend-specific handle returned by a successful acquisition and
/// handed back on release. Executors downcast to their own type.
pub type LockInstance = Arc<dyn Any + Send + Sync>;

/// Pluggable lock primitive. One instance serves many keys.
///
/// A release must verify ownership: between a holder's last use and its
/// release the lock may expire and be granted to somebody else, and an
/// unchecked release would then unlock the new holder's lock. Backends
/// verify through the lock value or through handle identity.
pub trait LockExecutor: Send + Sync {
    /// Registry name used by per-operation executor selection.
    fn name(&self) -> &str;

    /// True when the backend re-extends the expiry of a held lock on
    /// its own, in which case `expire == -1` means "renew until
    /// released".
    fn renewal(&self) -> bool {
        false
    }

    /// Single-shot try-acquire. `Ok(None)` means the lock is held by
    /// somebody else; errors are backend faults and are not retried.
    fn acquire(
        &self,
        lock_key: &str,
        lock_value: &str,
        expire: i64,
        acquire_timeout: i64,
    ) -> LockResult<Option<LockInstance>>;

    /// Ownership-checked release. False means the protection window had
    /// already lapsed or the caller never held the lock; never an error.
    fn release_lock(&self, key: &str, value: &str, instance: &LockInstance) -> bool;
}
