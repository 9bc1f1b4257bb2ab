// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod browser_pool;
pub mod capture_session;
pub mod chromium_engine;
#[cfg(test)]
pub(crate) mod fakes;
pub mod http_fetcher;
pub mod stabilizer;
pub mod traits;
