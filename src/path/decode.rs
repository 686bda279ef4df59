//! Total decoder for the RX log path header.
use super::{PathRecord, RawPayload, PAYLOAD_FIELD};
use serde_json::Value;

/// Header bytes before the node list: packet header + hop count.
const HEADER_LEN: usize = 2;
const HEADER_HEX_LEN: usize = HEADER_LEN * 2;

/// Decode the relay path from an untrusted payload.
///
/// Returns `None` for absent, too short (< 2 bytes) or malformed input. A packet that
/// announces more hops than it carries yields a record with the nodes that were present.
/// Bytes after the declared path are ignored.
pub fn decode(raw: &RawPayload) -> Option<PathRecord> {
    match raw {
        RawPayload::Absent => None,
        RawPayload::Bytes(bytes) => decode_bytes(bytes),
        RawPayload::Hex(text) => decode_hex(text),
        RawPayload::Record(value) => decode_field(value.get(PAYLOAD_FIELD)?),
    }
}

fn decode_field(value: &Value) -> Option<PathRecord> {
    match value {
        Value::String(text) => decode_hex(text),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()?;
            decode_bytes(&bytes)
        }
        _ => None,
    }
}

fn decode_bytes(bytes: &[u8]) -> Option<PathRecord> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let hop_count = bytes[1];
    let end = bytes.len().min(HEADER_LEN + usize::from(hop_count));
    Some(PathRecord {
        hop_count,
        nodes: bytes[HEADER_LEN..end].to_vec(),
    })
}

fn decode_hex(text: &str) -> Option<PathRecord> {
    // Work on raw bytes so slicing can never land inside a multi-byte char;
    // hex::decode rejects anything that is not an ASCII hex digit.
    let digits = text.trim().as_bytes();
    if digits.len() < HEADER_HEX_LEN {
        return None;
    }
    // Byte 0 is never used, but it is still required to be hex: a packet whose
    // header is not hex is not trusted for its hop count either.
    let header = hex::decode(&digits[..HEADER_HEX_LEN]).ok()?;
    let hop_count = header[1];

    let wanted = HEADER_HEX_LEN + usize::from(hop_count) * 2;
    let available = digits.len().min(wanted) - HEADER_HEX_LEN;
    // a dangling nibble is not a node
    let end = HEADER_HEX_LEN + available - available % 2;
    let nodes = hex::decode(&digits[HEADER_HEX_LEN..end]).ok()?;

    Some(PathRecord { hop_count, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hex(s: &str) -> Option<PathRecord> {
        decode(&RawPayload::from(s))
    }

    #[test]
    fn full_path_is_extracted_in_order() {
        let rec = hex("1503a102ff").expect("decodes");
        assert_eq!(rec.hop_count, 3);
        assert_eq!(rec.nodes, vec![0xa1, 0x02, 0xff]);
        assert!(!rec.is_partial());
    }

    #[test]
    fn bytes_beyond_declared_length_are_ignored() {
        let rec = hex("00023f01ff").expect("decodes");
        assert_eq!(rec.hop_count, 2);
        assert_eq!(rec.nodes, vec![0x3f, 0x01]);
    }

    #[test]
    fn trailing_garbage_after_path_is_not_validated() {
        let rec = hex("0001aazz!!").expect("decodes");
        assert_eq!(rec.nodes, vec![0xaa]);
    }

    #[test]
    fn truncated_path_keeps_declared_hop_count() {
        let rec = hex("0005aabb").expect("decodes");
        assert_eq!(rec.hop_count, 5);
        assert_eq!(rec.nodes, vec![0xaa, 0xbb]);
        assert!(rec.is_partial());
    }

    #[test]
    fn dangling_nibble_is_dropped() {
        let rec = hex("0003aab").expect("decodes");
        assert_eq!(rec.hop_count, 3);
        assert_eq!(rec.nodes, vec![0xaa]);
    }

    #[test]
    fn header_only_is_direct() {
        let rec = hex("1100").expect("decodes");
        assert!(rec.is_direct());
        assert!(rec.nodes.is_empty());
    }

    #[test]
    fn case_and_whitespace_are_normalised() {
        let rec = hex("  00 02A1FF\n".replace(' ', "").as_str()).expect("decodes");
        assert_eq!(rec.nodes, vec![0xa1, 0xff]);
        let rec = hex("\t0001AB  ").expect("decodes");
        assert_eq!(rec.nodes, vec![0xab]);
    }

    #[test]
    fn short_or_absent_input_is_empty() {
        assert_eq!(hex(""), None);
        assert_eq!(hex("0"), None);
        assert_eq!(hex("001"), None);
        assert_eq!(hex("   "), None);
        assert_eq!(decode(&RawPayload::Absent), None);
        assert_eq!(decode(&RawPayload::Bytes(vec![0x00])), None);
        assert_eq!(decode(&RawPayload::from(None::<String>)), None);
    }

    #[test]
    fn malformed_hex_is_empty() {
        assert_eq!(hex("00zz"), None);
        assert_eq!(hex("zz02aabb"), None);
        assert_eq!(hex("0002aaxx"), None);
        assert_eq!(hex("+f02aabb"), None);
        // multi-byte chars must not cause a slicing panic
        assert_eq!(hex("0ü02aabb"), None);
        assert_eq!(hex("00020üaa"), None);
    }

    #[test]
    fn raw_bytes_decode_like_their_hex_form() {
        let bytes = vec![0x00, 0x02, 0x3f, 0x01, 0xff];
        assert_eq!(decode(&RawPayload::from(bytes.clone())), hex(&hex::encode(&bytes)));

        let rec = decode(&RawPayload::Bytes(vec![0x00, 0x04, 0x10])).expect("decodes");
        assert_eq!(rec.hop_count, 4);
        assert_eq!(rec.nodes, vec![0x10]);
    }

    #[test]
    fn record_container_uses_payload_field() {
        let rec = decode(&RawPayload::from(json!({
            "snr": 7.25,
            "rssi": -92,
            "payload": "0002a102"
        })))
        .expect("decodes");
        assert_eq!(rec.nodes, vec![0xa1, 0x02]);

        let rec = decode(&RawPayload::from(json!({ "payload": [0, 1, 200] }))).expect("decodes");
        assert_eq!(rec.nodes, vec![200]);
    }

    #[test]
    fn record_without_usable_payload_is_empty() {
        assert_eq!(decode(&RawPayload::from(json!({}))), None);
        assert_eq!(decode(&RawPayload::from(json!({ "payload": null }))), None);
        assert_eq!(decode(&RawPayload::from(json!({ "payload": 12 }))), None);
        assert_eq!(decode(&RawPayload::from(json!({ "payload": [0, 300] }))), None);
        assert_eq!(decode(&RawPayload::from(json!("0002a102"))), None);
        assert_eq!(decode(&RawPayload::from(serde_json::Value::Null)), None);
    }

    #[test]
    fn every_declared_length_within_input_is_exact() {
        for h in 0u8..=40 {
            let mut s = format!("00{:02x}", h);
            for i in 0..h {
                s.push_str(&format!("{:02x}", i.wrapping_mul(7)));
            }
            s.push_str("eeee");
            let rec = hex(&s).expect("decodes");
            assert_eq!(rec.hop_count, h);
            assert_eq!(rec.nodes.len(), usize::from(h));
            for (i, n) in rec.nodes.iter().enumerate() {
                assert_eq!(*n, (i as u8).wrapping_mul(7));
            }
        }
    }

    #[test]
    fn max_hop_count_never_reads_out_of_range() {
        let rec = hex("00ff0102").expect("decodes");
        assert_eq!(rec.hop_count, 255);
        assert_eq!(rec.nodes, vec![0x01, 0x02]);
    }
}
