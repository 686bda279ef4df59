//! Human-readable route text for replies.
use super::PathRecord;

/// Shown until a path has been decoded.
pub const UNKNOWN_PATH: &str = "(? hops, ?)";
/// Packet was heard without any relay.
pub const DIRECT_PATH: &str = "(0 hops, direct)";

/// Render a decoded path, e.g. `(3 hops nach Meisterschwanden, a1:02:ff)`.
///
/// Partial records list only the node ids that were present.
pub fn format_path(record: Option<&PathRecord>, destination_label: &str) -> String {
    let Some(record) = record else {
        return UNKNOWN_PATH.to_string();
    };
    if record.is_direct() {
        return DIRECT_PATH.to_string();
    }
    let nodes = record
        .nodes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":");
    format!(
        "({} hops nach {}, {})",
        record.hop_count, destination_label, nodes
    )
}
