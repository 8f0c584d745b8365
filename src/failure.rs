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

use crate::errors::{LockError, LockResult};
use crate::evaluator::LockContext;

/// What the chain does after a failure strategy returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Swallow the failure, the guarded call does not run.
    Suppress,
    /// Run the guarded call without the lock.
    Proceed,
}

/// Invoked when the acquisition protocol exhausts its retry budget.
/// Returning an error aborts the call; returning normally resolves to
/// one of the [`OnFailure`] outcomes.
pub trait LockFailureStrategy: Send + Sync {
    fn on_lock_failure(
        &self,
        key: &str,
        call_site: &str,
        context: &LockContext,
    ) -> LockResult<OnFailure>;
}

/// Default strategy: raise a descriptive retry-later error.
pub struct AbortLockFailureStrategy;

impl LockFailureStrategy for AbortLockFailureStrategy {
    fn on_lock_failure(
        &self,
        key: &str,
        _call_site: &str,
        _context: &LockContext,
    ) -> LockResult<OnFailure> {
        Err(LockError::LockFailure {
            key: key.to_string(),
        })
    }
}

/// Swallow the failure and skip the guarded call.
pub struct SuppressLockFailureStrategy;

impl LockFailureStrategy for SuppressLockFailureStrategy {
    fn on_lock_failure(
        &self,
        _key: &str,
        _call_site: &str,
        _context: &LockContext,
    ) -> LockResult<OnFailure> {
        Ok(OnFailure::Suppress)
    }
}

/// Run the guarded call without the lock. Opt-in, weakens mutual
/// exclusion for the affected call site.
pub struct ProceedLockFailureStrategy;

impl LockFailureStrategy for ProceedLockFailureStrategy {
    fn on_lock_failure(
        &self,
        _key: &str,
        _call_site: &str,
        _context: &LockContext,
    ) -> LockResult<OnFailure> {
        Ok(OnFailure::Proceed)
    }
}
