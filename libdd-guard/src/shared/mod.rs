// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration and constants shared by the backends and the fatal path.

pub(crate) mod configuration;
pub(crate) mod constants;
#[cfg(unix)]
pub(crate) mod sig_info;
