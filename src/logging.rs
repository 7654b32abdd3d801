//! Logging utilities for the lumo runtime.
//!
//! Provides lightweight structured logging for the memory core: allocation
//! events, collection phases and protocol violations. Uses `tracing` for
//! structured logging with minimal overhead.

use once_cell::sync::OnceCell;

// Re-export tracing macros for use throughout the runtime
pub use tracing::{debug, error, info, trace, warn, Level};

/// Keeps the non-blocking file writer alive for the process lifetime.
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Initialize runtime logging with sensible defaults
///
/// This should be called early in the runtime initialization process.
/// Behavior is driven by environment variables:
/// - `LUMO_LOG_LEVEL`: trace, debug, info, warn, error
/// - `LUMO_LOG_FILE`: path of a log file (console output otherwise)
/// - `LUMO_LOG_JSON`: emit JSON instead of the compact human format
pub fn init_runtime_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match std::env::var("LUMO_LOG_LEVEL") {
        Ok(level) => EnvFilter::new(format!("lumo_runtime={}", level.to_lowercase())),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            #[cfg(debug_assertions)]
            {
                EnvFilter::new("lumo_runtime=debug")
            }
            #[cfg(not(debug_assertions))]
            {
                EnvFilter::new("lumo_runtime=info")
            }
        }),
    };

    let json = std::env::var("LUMO_LOG_JSON").is_ok();

    if let Ok(path) = std::env::var("LUMO_LOG_FILE") {
        let path = std::path::PathBuf::from(path);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file = path.file_name().unwrap_or_else(|| "lumo_runtime.log".as_ref());
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
        FILE_GUARD.set(guard).ok();

        let builder = fmt().with_env_filter(filter).with_writer(writer).with_ansi(false);
        if json {
            builder.json().try_init().ok();
        } else {
            builder.compact().try_init().ok();
        }
        return;
    }

    let builder = fmt().with_env_filter(filter);
    if json {
        builder.json().try_init().ok();
    } else {
        builder.compact().try_init().ok(); // Ignore error if already initialized
    }
}

/// Log an allocation event
#[inline]
pub fn log_allocation(size: usize, block: usize, blocks: usize) {
    trace!(
        target: "heap",
        size,
        block,
        blocks,
        "allocated run"
    );
}

/// Log a free event
#[inline]
pub fn log_free(block: usize, bytes: usize) {
    trace!(
        target: "heap",
        block,
        bytes,
        "freed run"
    );
}

/// Log a GC cycle start
#[inline]
pub fn log_gc_start() {
    debug!(target: "gc", "starting garbage collection cycle");
}

/// Log a GC mark phase
#[inline]
pub fn log_gc_mark(objects_marked: usize) {
    debug!(
        target: "gc",
        objects_marked,
        "mark phase complete"
    );
}

/// Log a GC sweep phase
#[inline]
pub fn log_gc_sweep(objects_swept: usize, bytes_reclaimed: usize) {
    debug!(
        target: "gc",
        objects_swept,
        bytes_reclaimed,
        "sweep phase complete"
    );
}

/// Log a GC cycle completion
#[inline]
pub fn log_gc_complete(duration_us: u64, bytes_reclaimed: usize, live_objects: usize) {
    info!(
        target: "gc",
        duration_us,
        bytes_reclaimed,
        live_objects,
        "garbage collection complete"
    );
}

/// Log a caller protocol violation (a bug in the calling layer, not here)
#[inline]
pub fn log_protocol_violation(subsystem: &str, detail: &str) {
    error!(
        target: "protocol",
        subsystem,
        detail,
        "protocol violation"
    );
}

/// Log runtime initialization
#[inline]
pub fn log_runtime_init() {
    info!(target: "runtime", "lumo runtime initialized");
}

/// Log runtime shutdown
#[inline]
pub fn log_runtime_shutdown() {
    info!(target: "runtime", "lumo runtime shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_helpers_do_not_panic() {
        log_allocation(48, 3, 2);
        log_free(3, 64);
        log_gc_start();
        log_gc_mark(7);
        log_gc_sweep(2, 128);
        log_gc_complete(1000, 128, 5);
        log_protocol_violation("heap", "free of non-head block");
        log_runtime_init();
        log_runtime_shutdown();
    }

    #[test]
    fn init_idempotent() {
        init_runtime_logging();
        init_runtime_logging(); // Should not panic
    }
}
