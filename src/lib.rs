// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download metrics for tracked PyPI packages, derived from a download
//! warehouse and rendered as trend and comparison charts.

pub mod aggregate;
pub mod bigquery;
pub mod cache;
pub mod charts;
pub mod commands;
pub mod config;
pub mod db;
pub mod derive;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod pypistats;
pub mod query;
pub mod session;
pub mod shape;
pub mod warehouse;
