//! Sync payload wire format.
//!
//! A payload is a flat JSON object serialized compactly in insertion order,
//! with non-ASCII characters escaped.  The bytes are zlib-compressed (header
//! and Adler-32 trailer included), zero-padded up to a minimum size, and
//! encoded as URL-safe base64 without `=` padding.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Read, Write};

use crate::errors::*;
use crate::sync_config::CompressionSpec;

pub type SyncPayload = Map<String, Value>;

/// Escapes every non-ASCII character as `\uXXXX` (UTF-16 code units), and
/// otherwise writes JSON exactly like serde_json's compact formatter.
struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (index, character) in fragment.char_indices() {
            if character.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in character.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + character.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

pub fn to_compact_json(payload: &SyncPayload) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, AsciiFormatter);
    payload
        .serialize(&mut serializer)
        .chain_err(|| "Failed to serialize sync payload")?;
    Ok(bytes)
}

/// Encodes with maximum compression, padding short output to `min_size`.
pub fn encode_payload(payload: &SyncPayload, min_size: usize) -> Result<String> {
    encode_payload_with(payload, &CompressionSpec::padded_to(min_size))
}

pub fn encode_payload_with(payload: &SyncPayload, compression: &CompressionSpec) -> Result<String> {
    let json = to_compact_json(payload)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(compression.level));
    encoder
        .write_all(&json)
        .chain_err(|| "Failed to compress sync payload")?;
    let mut compressed = encoder
        .finish()
        .chain_err(|| "Failed to compress sync payload")?;
    if compression.pad_if_smaller && compressed.len() < compression.min_size {
        compressed.resize(compression.min_size, 0);
    }
    Ok(URL_SAFE_NO_PAD.encode(&compressed))
}

pub fn decode_payload(encoded: &str) -> Result<SyncPayload> {
    let raw = decode_base64(encoded)?;
    let mut decoder = ZlibDecoder::new(raw.as_slice());
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|err| Error::from(ErrorKind::PayloadInflate(err.to_string())))?;
    // Only zero padding may follow the stream.  The stream itself can end in
    // a zero byte, so the padding is checked rather than stripped up front.
    let trailing = decoder.into_inner();
    ensure!(
        trailing.iter().all(|&byte| byte == 0),
        ErrorKind::PayloadTrailingData
    );
    let text = String::from_utf8(json).map_err(|_| Error::from(ErrorKind::PayloadUtf8))?;
    serde_json::from_str::<SyncPayload>(&text)
        .map_err(|err| ErrorKind::PayloadParse(err.to_string()).into())
}

/// Accepts URL-safe or standard alphabets, with or without `=` padding.
fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let mut standard: String = encoded
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|character| match character {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    STANDARD
        .decode(standard.as_bytes())
        .map_err(|err| ErrorKind::PayloadBase64(err.to_string()).into())
}
