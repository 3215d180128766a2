// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download metrics for tracked PyPI packages.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pypi_download_metrics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    pypi_download_metrics::dispatch::dispatch().await
}
