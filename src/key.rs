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

use crate::errors::LockResult;
use crate::evaluator::{value_to_key_fragment, ExpressionEvaluator, LockContext};

/// Builds the variable suffix of a lock key from the per-operation
/// definition keys.
pub trait KeyBuilder: Send + Sync {
    fn build_key(&self, context: &LockContext, definition_keys: &[String]) -> LockResult<String>;
}

/// === DefaultKeyBuilder ===
///
/// Evaluates each definition key and joins the fragments with `.`;
/// blank definitions are skipped, no definitions collapse to the empty
/// suffix.
pub struct DefaultKeyBuilder {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl DefaultKeyBuilder {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl KeyBuilder for DefaultKeyBuilder {
    fn build_key(&self, context: &LockContext, definition_keys: &[String]) -> LockResult<String> {
        let mut fragments = Vec::with_capacity(definition_keys.len());
        for definition in definition_keys {
            if definition.trim().is_empty() {
                continue;
            }
            let value = self.evaluator.evaluate(definition, context)?;
            fragments.push(value_to_key_fragment(&value));
        }
        Ok(fragments.join("."))
    }
}
