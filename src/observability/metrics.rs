//! Metrics collection.
//!
//! # Responsibilities
//! - Define the endpoint metrics
//! - Record through the `metrics` facade; the embedding process decides
//!   whether and where to export them
//!
//! # Metrics
//! - `thrift_connections_accepted_total` (counter): accepted raw-socket connections, by carrier
//! - `thrift_active_connections` (gauge): live raw-socket connections
//! - `thrift_messages_processed_total` (counter): dispatched messages, by protocol
//! - `thrift_protocol_errors_total` (counter): connections or requests dropped on decode errors
//! - `thrift_certificates_issued_total` (counter): ephemeral bundles issued
//!
//! # Design Decisions
//! - Low-overhead metric updates (no-ops until a recorder is installed)
//! - Labels limited to low-cardinality selectors

use crate::protocol::ProtocolKind;

pub fn record_connection_accepted(carrier: &'static str) {
    metrics::counter!("thrift_connections_accepted_total", "carrier" => carrier).increment(1);
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("thrift_active_connections").set(count as f64);
}

pub fn record_message_processed(protocol: ProtocolKind) {
    metrics::counter!("thrift_messages_processed_total", "protocol" => protocol.as_str())
        .increment(1);
}

pub fn record_protocol_error(protocol: ProtocolKind) {
    metrics::counter!("thrift_protocol_errors_total", "protocol" => protocol.as_str())
        .increment(1);
}

pub fn record_certificate_issued() {
    metrics::counter!("thrift_certificates_issued_total").increment(1);
}
