//! Constants for the download module (timeouts, integrity thresholds, naming).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default deadline for one whole fetch attempt (20 seconds, sized for slow hosts).
pub const ATTEMPT_TIMEOUT_SECS: u64 = 20;

/// Smallest download accepted as real content (1 KiB).
///
/// Hosting services sometimes answer 200 with a short HTML error page.
pub const DEFAULT_MIN_SIZE_BYTES: u64 = 1024;

/// Decompressed bytes read from a gzip payload to prove it decodes.
pub const GZIP_PROBE_BYTES: usize = 100;

/// Suffix appended to a destination name to form its temp artifact name.
pub const TEMP_SUFFIX: &str = ".part";

/// Buffer size for streaming writes and digest reads (64 KiB).
pub const IO_CHUNK_BYTES: usize = 64 * 1024;
