//! # Ticket Stock Runtime
//!
//! Execution helpers shared by the ticket-stock service.
//!
//! ## Core Components
//!
//! - **Scatter-gather**: [`scatter::try_join_all`] and [`scatter::try_join2`] run
//!   independent fallible queries concurrently, keep their order, and abort the
//!   remaining ones on the first failure
//! - **Metrics**: metric names, descriptions and small recorder helpers built on
//!   the `metrics` facade
//!
//! ## Example
//!
//! ```rust
//! use ticket_stock_runtime::scatter::try_join2;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (total, page) = try_join2(
//!     async { Ok::<_, String>(42_i64) },
//!     async { Ok(vec!["first event"]) },
//! )
//! .await
//! .map_err(|e| e.to_string())
//! .unwrap_or_default();
//! assert_eq!(total, 42);
//! assert_eq!(page, vec!["first event"]);
//! # }
//! ```

#![forbid(unsafe_code)]

/// Metric names and recorders
pub mod metrics;

/// Concurrent join of independent fallible tasks
pub mod scatter;

pub use scatter::{ScatterError, Task, try_join_all, try_join2};
