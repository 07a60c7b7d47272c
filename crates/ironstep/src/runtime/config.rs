//! Runtime configuration.

use std::time::Duration;

/// Configuration for the workflow runtime.
///
/// Controls worker concurrency, queue behavior and shutdown.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ironstep::runtime::RuntimeConfig;
///
/// let config = RuntimeConfig {
///     worker_count: 8,
///     dequeue_timeout: Duration::from_millis(50),
///     unload_on_suspend: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of workers executing instances.
    ///
    /// Suspended instances do not occupy a worker, so this bounds the number
    /// of actions running at the same time. Default: 4.
    pub worker_count: usize,

    /// How long a worker blocks on the dispatch queue before checking for
    /// shutdown again.
    ///
    /// Default: 100ms.
    pub dequeue_timeout: Duration,

    /// Maximum number of queued work items.
    ///
    /// `None` leaves the queue unbounded. With a bound, producers wait for
    /// room. Default: `None`.
    pub queue_capacity: Option<usize>,

    /// Maximum time to wait for in-flight actions during shutdown.
    ///
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,

    /// Drop the live state of an instance once it suspends and its state
    /// has been saved.
    ///
    /// The instance is reloaded from persistence when it resumes. Default:
    /// `false`.
    pub unload_on_suspend: bool,

    /// Identifier used in logs.
    ///
    /// If `None`, a UUID is generated when the runtime is built.
    pub worker_id: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            dequeue_timeout: Duration::from_millis(100),
            queue_capacity: None,
            shutdown_timeout: Duration::from_secs(30),
            unload_on_suspend: false,
            worker_id: None,
        }
    }
}
