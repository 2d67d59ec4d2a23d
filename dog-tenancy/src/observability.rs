//! Log output for binaries and tests embedding the gate.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Security events are logged on the `dog_tenancy::security` target, so
/// `RUST_LOG=dog_tenancy::security=warn` isolates them. Returns `false` if
/// a subscriber was already installed.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
