/// Resilience patterns for the Plaza client
///
/// This library provides the small set of timing primitives the client relies on:
/// - **Reconnect**: Fixed-delay reconnect schedule for long-lived broker connections
/// - **Debounce**: Coalesces bursts of calls so only the latest one runs
/// - **Timeout**: Enforces time limits on external calls
///
/// # Example: Debounced search
///
/// ```rust,no_run
/// use resilience::Debouncer;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let debouncer = Debouncer::new(Duration::from_millis(300));
///
///     let result = debouncer.call(|| async {
///         // Your search request here
///         vec!["ada", "alan"]
///     }).await;
///
///     // `None` when a newer call superseded this one
///     println!("{:?}", result);
/// }
/// ```

pub mod debounce;
pub mod reconnect;
pub mod timeout;

// Re-export main types for convenience
pub use debounce::Debouncer;
pub use reconnect::ReconnectPolicy;
pub use timeout::{with_timeout_result, TimeoutConfig, TimeoutError};
