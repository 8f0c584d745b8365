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

use redis::RedisError;
use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Lock acquisition was cancelled while waiting")]
    Interrupted,

    #[error("Failed to acquire lock, please retry it, key: {key}")]
    LockFailure { key: String },

    #[error("No lock executor registered under name: {0}")]
    ExecutorNotFound(String),

    #[error("Expression evaluation error: {0}")]
    EvaluationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<r2d2::Error> for LockError {
    fn from(err: r2d2::Error) -> Self {
        LockError::PoolError(err.to_string())
    }
}
