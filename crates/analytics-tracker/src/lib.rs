// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod http_utils;
pub mod ingest;
pub mod key_namer;
pub mod shutdown;
pub mod telemetry;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;
