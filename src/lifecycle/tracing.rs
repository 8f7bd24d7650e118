//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the subscriber the `stackup` binary logs through.
//!
//! ## Configuration
//!
//! - **Structured logging** with the `tracing` crate; every service task runs
//!   inside a `service` span, so its lines carry the service name
//! - **Configurable log levels** via `RUST_LOG` (default `info`)
//! - **Compact format** without module paths (`with_target(false)`)
//! - **stderr output**, so the report on stdout stays machine-readable
//!
//! ## Usage Examples
//!
//! ```bash
//! # Transitions, launches, readiness and provisioning (default)
//! stackup run
//!
//! # Every probe attempt and provisioning check
//! RUST_LOG=debug stackup run
//!
//! # Only the prober
//! RUST_LOG=stackup::probe=debug stackup run
//! ```
//!
//! ## Trace Example
//!
//! ```text
//! INFO Bringing up stack stack=lakehouse services=9 layers=5
//! INFO service: Transition service="postgres" from=pending to=starting
//! INFO service:start: Launched reference=docker compose up -d postgres service="postgres"
//! INFO service: Healthy service="postgres" attempt=3 elapsed=4.01s
//! INFO service:provision: Applied action=metastore-db kind=schema resource=metastore
//! WARN service: Blocked dependency=metastore state=failed service="spark"
//! INFO Run finished outcome=partial failure
//! ```

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
