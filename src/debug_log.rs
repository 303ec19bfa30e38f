//! Debug logging infrastructure for terrain investigation
//!
//! Routes `tracing` events to `debug_terrain.log` in the working directory.
//! The log file is recreated on each `init_debug_log()` call.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Mutex, Once};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEBUG_LOG_PATH: &str = "debug_terrain.log";

lazy_static::lazy_static! {
    static ref DEBUG_LOG: Mutex<Option<File>> = Mutex::new(None);
}

static SUBSCRIBER: Once = Once::new();

/// Writer handed to the fmt layer. Writes go to whichever file is current,
/// or nowhere before the first `init_debug_log()`.
struct DebugLogWriter;

impl Write for DebugLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match DEBUG_LOG.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match DEBUG_LOG.lock() {
            Ok(mut guard) => guard.as_mut().map_or(Ok(()), |file| file.flush()),
            Err(_) => Ok(()),
        }
    }
}

/// Initialize the debug log file (overwrites any existing log) and install
/// the global subscriber the first time around.
///
/// Filtering follows `RUST_LOG`, defaulting to debug output for this crate.
pub fn init_debug_log() {
    if let Ok(mut guard) = DEBUG_LOG.lock() {
        *guard = File::create(DEBUG_LOG_PATH).ok();
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "=== RACING TERRAIN DEBUG LOG ===");
            let _ = writeln!(file, "Timestamp: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }

    SUBSCRIBER.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,racing_terrain=debug"));
        // Another subscriber may already own the global slot (tests, host app).
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(|| DebugLogWriter)
                    .with_target(true)
                    .with_ansi(false),
            )
            .try_init();
    });
}

/// Statistics about normals in a mesh
#[derive(Debug)]
pub struct NormalStats {
    pub min_len: f32,
    pub max_len: f32,
    pub degenerate_count: usize,
}

/// Compute statistics about normal vectors
/// A normal is considered degenerate if its length is not close to 1.0
pub fn compute_normal_stats<'a>(normals: impl IntoIterator<Item = &'a [f32; 3]>) -> NormalStats {
    let mut min_len = f32::MAX;
    let mut max_len = f32::MIN;
    let mut degenerate_count = 0;
    let mut seen = 0usize;

    for n in normals {
        seen += 1;
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        min_len = min_len.min(len);
        max_len = max_len.max(len);

        // Consider degenerate if outside [0.99, 1.01] or NaN
        if !(0.99..=1.01).contains(&len) {
            degenerate_count += 1;
        }
    }

    if seen == 0 {
        min_len = 0.0;
        max_len = 0.0;
    }

    NormalStats {
        min_len,
        max_len,
        degenerate_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_stats() {
        let normals = [[0.0, 0.0, 1.0], [0.6, 0.0, 0.8], [0.0, 0.0, 0.0], [f32::NAN, 0.0, 1.0]];
        let stats = compute_normal_stats(&normals);
        assert_eq!(stats.degenerate_count, 2);
        assert!((stats.max_len - 1.0).abs() < 1e-6);
        assert_eq!(stats.min_len, 0.0);
    }

    #[test]
    fn test_normal_stats_empty() {
        let stats = compute_normal_stats(&[]);
        assert_eq!(stats.degenerate_count, 0);
        assert_eq!(stats.min_len, 0.0);
        assert_eq!(stats.max_len, 0.0);
    }
}
