//! Shared fixtures for the `perfbisect` integration tests: graph and
//! option builders, in-memory fakes for every backend, and log capture.

pub mod builders;
pub mod fakes;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Route engine logs into the test harness's captured output.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. `RUST_LOG` selects what is captured (default `info`), e.g.
/// `RUST_LOG=perfbisect::bisect=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Another harness may already own the global subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}
