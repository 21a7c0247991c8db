//! Canonical content hashing for audit records.
//!
//! Hashes are SHA-256 digests rendered as `0x` followed by 64 lowercase hex
//! characters.
//!
//! The audit service hashes leaves from the JSON produced by Go's
//! `encoding/json`, so the encoder here reproduces its bytes:
//! - object keys written in byte order, nested objects included
//! - `<`, `>`, `&`, U+2028 and U+2029 written as `\u` escapes
//! - numbers printed as Go prints a `float64` (`1.0` becomes `1`, large
//!   magnitudes use `e+NN`)

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};

/// Raw SHA-256 digest.
pub type Digest = [u8; 32];

/// Compute the content hash of a record.
///
/// The record's top-level keys are sorted before encoding. Normalization is
/// shallow: nested values are left to the encoder, which orders their keys
/// the way Go's encoder does.
pub fn compute_content_hash(record: &Map<String, Value>) -> String {
    encode_hash(&sha256(&canonical_json(record)))
}

/// Canonical JSON bytes of a record.
pub fn canonical_json(record: &Map<String, Value>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, GoJsonFormatter);
    sorted(record)
        .serialize(&mut ser)
        .expect("serializing a JSON value into memory cannot fail");
    out
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// Render a digest as `0x` + lowercase hex.
pub fn encode_hash(digest: &Digest) -> String {
    format!("0x{}", hex::encode(digest))
}

/// Parse a hash string, with or without the `0x` prefix.
///
/// Returns `None` unless the remainder is exactly 64 hex characters.
pub fn decode_hash(hash: &str) -> Option<Digest> {
    let hex_part = hash.strip_prefix("0x").unwrap_or(hash);
    let mut digest = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut digest).ok()?;
    Some(digest)
}

fn sorted(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), canonical(v)))
        .collect()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sorted(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Compact formatter matching Go's `json.Marshal` output.
struct GoJsonFormatter;

impl Formatter for GoJsonFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    // Go decodes every JSON number into a float64 before re-encoding it.
    fn write_i64<W>(&mut self, writer: &mut W, value: i64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value as f64).as_bytes())
    }

    fn write_u64<W>(&mut self, writer: &mut W, value: u64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value as f64).as_bytes())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value).as_bytes())
    }
}

/// Shortest round-trip digits, fixed notation for magnitudes in
/// `[1e-6, 1e21)` and zero, exponent notation otherwise. Positive exponents
/// carry a `+`; no exponent is zero-padded.
fn format_float(value: f64) -> String {
    let abs = value.abs();
    if abs == 0.0 || (1e-6..1e21).contains(&abs) {
        return format!("{value}");
    }

    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => formatted,
    }
}
