//! Metric names and recorders for the acquisition, intake and catalog paths.
//!
//! Only the `metrics` facade is used here. Installing a recorder (Prometheus or
//! otherwise) is left to the embedding process; without one every call is a no-op.
//!
//! # Example
//!
//! ```rust
//! use ticket_stock_runtime::metrics::{AcquisitionMetrics, describe_metrics};
//!
//! describe_metrics();
//! AcquisitionMetrics::record_committed(2);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Acquisitions committed.
pub const ACQUISITIONS_COMMITTED: &str = "ticket_stock_acquisitions_committed_total";
/// Acquisitions rolled back or rejected, labelled by `reason`.
pub const ACQUISITIONS_FAILED: &str = "ticket_stock_acquisitions_failed_total";
/// Acquired tickets recorded.
pub const TICKETS_ACQUIRED: &str = "ticket_stock_tickets_acquired_total";
/// Acquired tickets whose publication failed after commit.
pub const TICKETS_UNPUBLISHED: &str = "ticket_stock_tickets_unpublished_total";
/// Wall time of one acquisition.
pub const ACQUISITION_DURATION: &str = "ticket_stock_acquisition_duration_seconds";
/// Inbound messages settled, labelled by `disposition`.
pub const INTAKE_MESSAGES: &str = "ticket_stock_intake_messages_total";
/// Catalog reads that failed, labelled by `query`.
pub const CATALOG_READ_ERRORS: &str = "ticket_stock_catalog_read_errors_total";

/// Register descriptions for every metric this workspace emits.
pub fn describe_metrics() {
    describe_counter!(ACQUISITIONS_COMMITTED, "Total number of committed acquisitions");
    describe_counter!(
        ACQUISITIONS_FAILED,
        "Total number of acquisitions that were rolled back or rejected"
    );
    describe_counter!(TICKETS_ACQUIRED, "Total number of acquired tickets recorded");
    describe_counter!(
        TICKETS_UNPUBLISHED,
        "Total number of committed tickets that could not be published"
    );
    describe_histogram!(ACQUISITION_DURATION, "Time taken by one acquisition");
    describe_counter!(INTAKE_MESSAGES, "Total number of order-paid messages settled");
    describe_counter!(CATALOG_READ_ERRORS, "Total number of failed catalog reads");
}

/// Acquisition use case recorder.
pub struct AcquisitionMetrics;

impl AcquisitionMetrics {
    /// Record a committed acquisition that produced `tickets` tickets.
    pub fn record_committed(tickets: usize) {
        counter!(ACQUISITIONS_COMMITTED).increment(1);
        counter!(TICKETS_ACQUIRED).increment(tickets as u64);
    }

    /// Record a failed acquisition.
    pub fn record_failure(reason: &'static str) {
        counter!(ACQUISITIONS_FAILED, "reason" => reason).increment(1);
    }

    /// Record tickets that stayed unpublished.
    pub fn record_unpublished(count: usize) {
        counter!(TICKETS_UNPUBLISHED).increment(count as u64);
    }

    /// Record the duration of one acquisition.
    pub fn record_duration(duration: Duration) {
        histogram!(ACQUISITION_DURATION).record(duration.as_secs_f64());
    }
}

/// Event intake recorder.
pub struct IntakeMetrics;

impl IntakeMetrics {
    /// Record a settled message.
    pub fn record_settled(disposition: &'static str) {
        counter!(INTAKE_MESSAGES, "disposition" => disposition).increment(1);
    }
}

/// Catalog read recorder.
pub struct CatalogMetrics;

impl CatalogMetrics {
    /// Record a failed read.
    pub fn record_error(query: &'static str) {
        counter!(CATALOG_READ_ERRORS, "query" => query).increment(1);
    }
}
