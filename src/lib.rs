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

mod config;
mod connection;
mod errors;
mod evaluator;
mod executor;
mod failure;
mod interceptor;
mod key;
mod ops;
mod scripts;
mod template;
mod util;

pub use config::*;
pub use connection::*;
pub use errors::*;
pub use evaluator::*;
pub use executor::*;
pub use failure::*;
pub use interceptor::*;
pub use key::*;
pub use ops::*;
pub use scripts::*;
pub use template::*;
pub use util::*;
