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

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::{LockError, LockResult};

/// Named arguments of one guarded invocation, the input of key and
/// condition expressions.
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    args: BTreeMap<String, Value>,
}

impl LockContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }
}

/// Expression evaluation seam. Implementations resolve an expression
/// against the invocation context; the bundled evaluator understands
/// `#arg` references with dotted field paths plus plain literals.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &LockContext) -> LockResult<Value>;
}

/// === TemplateEvaluator ===
pub struct TemplateEvaluator {
    allow_literals: bool,
}

impl TemplateEvaluator {
    pub fn new(allow_literals: bool) -> Self {
        Self { allow_literals }
    }

    fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(root, |value, field| value.get(field))
    }
}

impl ExpressionEvaluator for TemplateEvaluator {
    fn evaluate(&self, expression: &str, context: &LockContext) -> LockResult<Value> {
        if let Some(reference) = expression.strip_prefix('#') {
            let (name, path) = match reference.split_once('.') {
                Some((name, path)) => (name, Some(path)),
                None => (reference, None),
            };
            let root = context.arg(name).ok_or_else(|| {
                LockError::EvaluationError(format!("unknown argument: #{name}"))
            })?;
            return match path {
                None => Ok(root.clone()),
                Some(path) => Self::resolve_path(root, path).cloned().ok_or_else(|| {
                    LockError::EvaluationError(format!("no such field: #{reference}"))
                }),
            };
        }
        if self.allow_literals {
            return Ok(Value::String(expression.to_string()));
        }
        Err(LockError::EvaluationError(format!(
            "not an executable expression: {expression}"
        )))
    }
}

/// Renders an evaluated value as a key fragment.
pub fn value_to_key_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A condition holds only for boolean true; non-boolean and erroring
/// results mean "not satisfied".
pub fn value_to_condition(value: LockResult<Value>) -> bool {
    match value {
        Ok(Value::Bool(b)) => b,
        Ok(Value::String(s)) => s == "true",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> LockContext {
        LockContext::new()
            .with_arg("id", 42)
            .with_arg("user", json!({"name": "alice", "address": {"city": "ap"}}))
            .with_arg("vip", true)
    }

    #[test]
    fn test_argument_reference() {
        let evaluator = TemplateEvaluator::new(true);
        let value = evaluator.evaluate("#id", &context()).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_dotted_path() {
        let evaluator = TemplateEvaluator::new(true);
        let value = evaluator.evaluate("#user.name", &context()).unwrap();
        assert_eq!(value, json!("alice"));
        let value = evaluator.evaluate("#user.address.city", &context()).unwrap();
        assert_eq!(value, json!("ap"));
    }

    #[test]
    fn test_missing_argument_errors() {
        let evaluator = TemplateEvaluator::new(true);
        assert!(evaluator.evaluate("#missing", &context()).is_err());
        assert!(evaluator.evaluate("#user.missing", &context()).is_err());
    }

    #[test]
    fn test_literal_fallback() {
        let evaluator = TemplateEvaluator::new(true);
        let value = evaluator.evaluate("static-key", &context()).unwrap();
        assert_eq!(value, json!("static-key"));

        let strict = TemplateEvaluator::new(false);
        assert!(strict.evaluate("static-key", &context()).is_err());
    }

    #[test]
    fn test_condition_coercion() {
        let evaluator = TemplateEvaluator::new(true);
        assert!(value_to_condition(evaluator.evaluate("#vip", &context())));
        assert!(value_to_condition(evaluator.evaluate("true", &context())));
        assert!(!value_to_condition(evaluator.evaluate("#id", &context())));
        assert!(!value_to_condition(evaluator.evaluate("#missing", &context())));
        assert!(!value_to_condition(evaluator.evaluate("whatever", &context())));
    }

    #[test]
    fn test_key_fragment_rendering() {
        assert_eq!(value_to_key_fragment(&json!("a")), "a");
        assert_eq!(value_to_key_fragment(&json!(42)), "42");
        assert_eq!(value_to_key_fragment(&json!(null)), "null");
    }
}
