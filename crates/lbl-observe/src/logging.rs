use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `LBL_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract for lbl binaries:
/// - Structured run events use `target: "lbl_proof"` and an `event` field.
/// - Include `bucket` and `key` on any object-store event.
/// - Include `file_name` on per-image upload events.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("LBL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
