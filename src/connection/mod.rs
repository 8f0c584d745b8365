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

use redis::Client;

use crate::errors::LockResult;

pub type RedisConnection = r2d2::PooledConnection<Client>;

/// Blocking connection pool for the redis executor.
pub struct RedisConnectionManager {
    pool: r2d2::Pool<Client>,
}

impl RedisConnectionManager {
    pub fn new(url: &str, pool_size: u32) -> LockResult<Self> {
        let client = Client::open(url)?;
        let pool = r2d2::Pool::builder().max_size(pool_size).build(client)?;
        Ok(Self { pool })
    }

    pub fn get_connection(&self) -> LockResult<RedisConnection> {
        Ok(self.pool.get()?)
    }
}
