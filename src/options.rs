//! Server tuning knobs and their defaults.

use std::time::Duration;

/// Configuration applied to a server at `listen` time.
///
/// Defaults are conservative and match common front-end expectations:
/// connections that go quiet are evicted after one minute, and the
/// listening socket carries a backlog of 100.
///
/// # Examples
///
/// ```no_run
/// use wharf::ServerOptions;
/// use std::time::Duration;
///
/// let options = ServerOptions {
///     idle_timeout: Duration::from_secs(10),
///     workers: 4,
///     ..ServerOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Worker threads driving connection handlers (default: the number of
    /// hardware threads).
    pub workers: usize,

    /// Eviction deadline measured from the last byte read on a connection
    /// (default: 60 s).
    pub idle_timeout: Duration,

    /// Listen backlog handed to the kernel (default: 100).
    pub backlog: i32,

    /// Size of the per-connection socket read buffer (default: 8 KiB).
    pub read_buffer_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            idle_timeout: Duration::from_secs(60),
            backlog: 100,
            read_buffer_size: 8 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.idle_timeout, Duration::from_secs(60));
        assert_eq!(options.backlog, 100);
        assert_eq!(options.read_buffer_size, 8 * 1024);
        assert!(options.workers >= 1);
    }

    #[test]
    fn partial_override() {
        let options = ServerOptions {
            workers: 2,
            ..ServerOptions::default()
        };
        assert_eq!(options.workers, 2);
        assert_eq!(options.backlog, 100);
    }
}
