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

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::errors::LockResult;
use crate::evaluator::{value_to_condition, ExpressionEvaluator, LockContext, TemplateEvaluator};
use crate::failure::{AbortLockFailureStrategy, LockFailureStrategy, OnFailure};
use crate::key::{DefaultKeyBuilder, KeyBuilder};
use crate::ops::LockOps;
use crate::template::{LockInfo, LockTemplate};

/// === LockInterceptor ===
///
/// Guards registered call sites with their declared locks. A site with
/// several locks acquires them in ascending order (declaration order on
/// ties), runs the call, and releases in reverse order; a lock whose
/// condition does not hold is skipped without affecting its siblings;
/// the first lock that cannot be acquired stops the descent, invokes
/// the failure strategy, and already-held locks unwind on the way out.
///
/// Each lock wraps the rest of the descent the way middleware wraps a
/// handler, so release order and unwind-on-panic both fall out of
/// scope nesting.
pub struct LockInterceptor {
    template: Arc<LockTemplate>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    key_builder: Arc<dyn KeyBuilder>,
    failure_strategy: Arc<dyn LockFailureStrategy>,
    call_sites: RwLock<HashMap<String, Arc<Vec<LockOps>>>>,
}

impl LockInterceptor {
    pub fn new(template: Arc<LockTemplate>) -> Self {
        let evaluator: Arc<dyn ExpressionEvaluator> = Arc::new(TemplateEvaluator::new(
            template.config().allow_literal_expressions,
        ));
        let key_builder: Arc<dyn KeyBuilder> =
            Arc::new(DefaultKeyBuilder::new(evaluator.clone()));
        Self {
            template,
            evaluator,
            key_builder,
            failure_strategy: Arc::new(AbortLockFailureStrategy),
            call_sites: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_key_builder(mut self, key_builder: Arc<dyn KeyBuilder>) -> Self {
        self.key_builder = key_builder;
        self
    }

    pub fn with_failure_strategy(mut self, strategy: Arc<dyn LockFailureStrategy>) -> Self {
        self.failure_strategy = strategy;
        self
    }

    /// Register the locks of one call site. Ordering is resolved here,
    /// once; registering the same site again replaces its locks.
    /// Executor references are checked eagerly so a bad registration
    /// fails before any call runs.
    pub fn register(&self, call_site: &str, mut ops: Vec<LockOps>) -> LockResult<()> {
        for op in &ops {
            if let Some(executor) = &op.executor {
                self.template.executor(Some(executor))?;
            }
        }
        // stable sort keeps declaration order among equal orders
        ops.sort_by_key(|op| op.order);
        self.call_sites
            .write()
            .insert(call_site.to_string(), Arc::new(ops));
        Ok(())
    }

    /// Run `call` under the locks registered for `call_site`.
    /// `Ok(None)` means an acquisition failed and its strategy
    /// suppressed the call. Unregistered sites run the call bare.
    pub fn execute<R, F: FnOnce() -> R>(
        &self,
        call_site: &str,
        context: &LockContext,
        call: F,
    ) -> LockResult<Option<R>> {
        let ops = self.call_sites.read().get(call_site).cloned();
        let Some(ops) = ops else {
            return Ok(Some(call()));
        };
        let mut call = Some(call);
        self.invoke_chain(&ops, call_site, context, &mut call)
    }

    fn invoke_chain<R, F: FnOnce() -> R>(
        &self,
        ops: &[LockOps],
        call_site: &str,
        context: &LockContext,
        call: &mut Option<F>,
    ) -> LockResult<Option<R>> {
        let Some((op, rest)) = ops.split_first() else {
            return Ok(call.take().map(|call| call()));
        };

        // a false condition skips this lock only, siblings are
        // evaluated on their own
        if let Some(condition) = &op.condition {
            if !value_to_condition(self.evaluator.evaluate(condition, context)) {
                return self.invoke_chain(rest, call_site, context, call);
            }
        }

        let key = self.resolve_key(op, call_site, context)?;
        let lock_info = self.template.lock_with(
            &key,
            op.expire_millis,
            op.acquire_timeout_millis,
            op.executor.as_deref(),
        )?;
        let Some(lock_info) = lock_info else {
            warn!(key = %key, call_site = %call_site, "lock failure, aborting descent");
            let strategy = op.failure_strategy.as_ref().unwrap_or(&self.failure_strategy);
            return match strategy.on_lock_failure(&key, call_site, context)? {
                OnFailure::Suppress => Ok(None),
                OnFailure::Proceed => self.invoke_chain(rest, call_site, context, call),
            };
        };
        debug!(key = %key, value = %lock_info.lock_value, "lock success");

        // dropped when this frame unwinds, so ancestors release after
        // their descendants, on return and on panic alike
        let _guard = ReleaseGuard {
            template: &self.template,
            lock_info,
            auto_release: op.auto_release,
        };
        self.invoke_chain(rest, call_site, context, call)
    }

    fn resolve_key(&self, op: &LockOps, call_site: &str, context: &LockContext) -> LockResult<String> {
        let stem = if op.name.is_empty() {
            call_site
        } else {
            op.name.as_str()
        };
        let suffix = self.key_builder.build_key(context, &op.keys)?;
        Ok(format!(
            "{}:{}#{}",
            self.template.config().lock_key_prefix,
            stem,
            suffix
        ))
    }
}

struct ReleaseGuard<'a> {
    template: &'a LockTemplate,
    lock_info: LockInfo,
    auto_release: bool,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.auto_release {
            self.template.release_lock(&self.lock_info);
        }
    }
}
