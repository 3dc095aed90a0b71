use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Serialize signed request fields exactly as the iOS client does: keys in
/// ascending lexicographic order, no insignificant whitespace, and forward
/// slashes escaped as `\/` (Swift's `JSONEncoder` default). Any deviation
/// here makes every assertion signature fail, so this is a dedicated
/// routine rather than a generic JSON writer.
pub fn canonicalize(fields: &BTreeMap<String, String>) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_into(&mut out, key);
        out.push(':');
        escape_into(&mut out, value);
    }
    out.push('}');
    out
}

/// SHA-256 of the canonical JSON encoding of `fields`.
pub fn client_data_hash(fields: &BTreeMap<String, String>) -> [u8; 32] {
    Sha256::digest(canonicalize(fields).as_bytes()).into()
}

fn escape_into(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
