//! Logging setup
//!
//! The scheduler and the periodic thread always emit `tracing` events
//! (`info!` on lifecycle changes, `debug!`/`trace!` per task, `error!` for
//! panicked workers). With the `logging` feature these helpers install a
//! `tracing-subscriber` formatter; without it they do nothing.
//!
//! 워커 스레드 이름(`tsdb-scheduler-N`)이 로그에 포함됩니다.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` if set, `info` otherwise.
pub fn init() {
    init_with_level("info")
}

/// `RUST_LOG` if set, `level` otherwise.
///
/// # Example
/// ```rust
/// tsdb_common::logging::init_with_level("debug");
/// ```
pub fn init_with_level(level: &str) {
    install(level, false);
}

/// Trace-level output for this crate, captured by the test harness.
///
/// Safe to call from every test: only the first call installs a subscriber.
pub fn init_test() {
    install("tsdb_common=trace", true);
}

#[cfg(feature = "logging")]
fn install(default_filter: &str, test_writer: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);
    // 이미 설치된 subscriber가 있으면 무시
    let _ = if test_writer {
        builder.with_test_writer().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(not(feature = "logging"))]
fn install(_default_filter: &str, _test_writer: bool) {}
