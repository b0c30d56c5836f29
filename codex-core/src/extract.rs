//! Locating an embedded Codex payload inside image bytes.
//!
//! Two carriers are recognized:
//!
//! - PNG text chunks (`tEXt`, `zTXt`, `iTXt`). A chunk holds `key NUL value`
//!   pairs; several fields may share one chunk. The `XML:com.adobe.xmp`
//!   keyword carries a whole XMP packet.
//! - XMP packets anywhere in the file (JPEG APP1, WebP `XMP ` chunk, ...),
//!   with `CodexPayload`, `Soulmark` and `GoldenCodexHash` as attributes or
//!   element text. In a JPEG, XMP too large for one APP1 segment continues
//!   in ExtendedXMP segments, which are reassembled before parsing.
//!
//! Field names are matched on their local part, so `gc:Soulmark` and
//! `XMP-gc:Soulmark` are the same field. The first occurrence of each field
//! wins.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{CodexError, Result};

pub const PAYLOAD_KEY: &str = "CodexPayload";
pub const SOULMARK_KEY: &str = "Soulmark";
pub const CODEX_HASH_KEY: &str = "GoldenCodexHash";

const XMP_KEYWORD: &str = "XML:com.adobe.xmp";
const XMP_OPEN: &[u8] = b"<x:xmpmeta";
const XMP_CLOSE: &[u8] = b"</x:xmpmeta>";

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const XMP_STANDARD_NS: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENSION_NS: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
const HAS_EXTENDED_XMP: &[u8] = b"HasExtendedXMP";
/// GUID (32 hex chars), full length and offset, both big-endian `u32`.
const EXTENSION_HEADER_LEN: usize = 32 + 4 + 4;

/// Fields recovered from an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedMetadata {
    /// GCUIS transport string.
    pub payload: String,
    pub soulmark: Option<String>,
    /// Legacy name for the same digest.
    pub codex_hash: Option<String>,
}

impl EmbeddedMetadata {
    /// A bare transport string with no accompanying digest.
    pub fn from_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            soulmark: None,
            codex_hash: None,
        }
    }

    /// The digest to verify against: `Soulmark`, else `GoldenCodexHash`.
    pub fn expected_fingerprint(&self) -> Option<&str> {
        self.soulmark.as_deref().or(self.codex_hash.as_deref())
    }
}

/// Search `bytes` for an embedded payload.
///
/// Returns `None` when no `CodexPayload` field is present. Digests found
/// without a payload are discarded.
#[instrument(level = "debug", skip_all, fields(len = bytes.len()))]
pub fn find_embedded(bytes: &[u8]) -> Option<EmbeddedMetadata> {
    let mut fields = Fields::default();

    // A JPEG with XMP segments is read segment-wise only. A raw scan would
    // splice APP1 headers into ExtendedXMP text.
    let mut segmented = false;
    if bytes.starts_with(&PNG_SIGNATURE) {
        scan_png(bytes, &mut fields);
    } else if bytes.starts_with(&JPEG_SOI) {
        segmented = scan_jpeg(bytes, &mut fields);
    }
    if !segmented && !fields.is_complete() {
        scan_xmp_packets(bytes, &mut fields);
    }

    let found = fields.into_embedded();
    debug!(found = found.is_some(), "Embedded payload search finished");
    found
}

/// Like [`find_embedded`], failing with [`CodexError::NoEmbeddedPayload`].
pub fn extract_embedded(bytes: &[u8]) -> Result<EmbeddedMetadata> {
    find_embedded(bytes).ok_or(CodexError::NoEmbeddedPayload)
}

#[derive(Debug, Default)]
struct Fields {
    payload: Option<String>,
    soulmark: Option<String>,
    codex_hash: Option<String>,
}

impl Fields {
    fn offer(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() || value == "-" {
            return;
        }
        let slot = match local_key(key) {
            PAYLOAD_KEY => &mut self.payload,
            SOULMARK_KEY => &mut self.soulmark,
            CODEX_HASH_KEY => &mut self.codex_hash,
            _ => return,
        };
        if slot.is_none() {
            debug!(key, len = value.len(), "Found embedded field");
            *slot = Some(value.to_string());
        }
    }

    /// Key-value pairs laid out as `k NUL v NUL k NUL v ...`.
    fn offer_pairs<'a>(&mut self, mut tokens: impl Iterator<Item = &'a str>) {
        while let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
            self.offer(key, value);
        }
    }

    fn is_complete(&self) -> bool {
        self.payload.is_some() && self.soulmark.is_some() && self.codex_hash.is_some()
    }

    fn into_embedded(self) -> Option<EmbeddedMetadata> {
        Some(EmbeddedMetadata {
            payload: self.payload?,
            soulmark: self.soulmark,
            codex_hash: self.codex_hash,
        })
    }
}

fn local_key(key: &str) -> &str {
    key.trim().rsplit(':').next().unwrap_or(key)
}

// ─── PNG ─────────────────────────────────────────────────────────────────────

fn scan_png(bytes: &[u8], fields: &mut Fields) {
    let mut offset = PNG_SIGNATURE.len();

    while offset + 8 <= bytes.len() {
        let length = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        let kind = &bytes[offset + 4..offset + 8];
        let data_start = offset + 8;
        let Some(data_end) = data_start.checked_add(length).filter(|end| *end <= bytes.len())
        else {
            debug!(offset, length, "Truncated PNG chunk, stopping scan");
            return;
        };
        let data = &bytes[data_start..data_end];

        match kind {
            b"tEXt" => read_text_chunk(data, fields),
            b"zTXt" => read_ztxt_chunk(data, fields),
            b"iTXt" => read_itxt_chunk(data, fields),
            b"IEND" => return,
            _ => {}
        }

        // data + CRC
        offset = data_end + 4;
    }
}

fn read_text_chunk(data: &[u8], fields: &mut Fields) {
    let text = String::from_utf8_lossy(data);
    fields.offer_pairs(text.split('\0'));
}

fn read_ztxt_chunk(data: &[u8], fields: &mut Fields) {
    let Some((keyword, rest)) = split_nul(data) else {
        return;
    };
    // compression method byte, then zlib stream
    let Some(compressed) = rest.get(1..) else {
        return;
    };
    let Some(text) = inflate(compressed) else {
        return;
    };
    let keyword = String::from_utf8_lossy(keyword);
    fields.offer_pairs(std::iter::once(keyword.as_ref()).chain(text.split('\0')));
}

fn read_itxt_chunk(data: &[u8], fields: &mut Fields) {
    let Some((keyword, rest)) = split_nul(data) else {
        return;
    };
    let [compressed, _method, rest @ ..] = rest else {
        return;
    };
    let Some((_language, rest)) = split_nul(rest) else {
        return;
    };
    let Some((_translated, text)) = split_nul(rest) else {
        return;
    };

    let text = if *compressed == 1 {
        match inflate(text) {
            Some(text) => text,
            None => return,
        }
    } else {
        String::from_utf8_lossy(text).into_owned()
    };

    let keyword = String::from_utf8_lossy(keyword);
    if keyword == XMP_KEYWORD {
        scan_xmp_packets(text.as_bytes(), fields);
    } else {
        fields.offer_pairs(std::iter::once(keyword.as_ref()).chain(text.split('\0')));
    }
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == 0)?;
    Some((&data[..pos], &data[pos + 1..]))
}

fn inflate(data: &[u8]) -> Option<String> {
    let mut text = String::new();
    match ZlibDecoder::new(data).read_to_string(&mut text) {
        Ok(_) => Some(text),
        Err(e) => {
            debug!(error = %e, "Skipping undecodable compressed text chunk");
            None
        }
    }
}

// ─── JPEG ────────────────────────────────────────────────────────────────────

/// One ExtendedXMP piece: offset into the full packet, and its bytes.
type ExtensionPart<'a> = (u32, &'a [u8]);

#[derive(Debug, Default)]
struct ExtendedXmp<'a> {
    full_length: u32,
    parts: Vec<ExtensionPart<'a>>,
}

impl ExtendedXmp<'_> {
    /// Concatenate the parts in offset order if they tile the whole packet.
    fn assemble(mut self) -> Option<Vec<u8>> {
        self.parts.sort_by_key(|(offset, _)| *offset);
        let mut packet = Vec::new();
        for (offset, data) in self.parts {
            if offset as usize != packet.len() {
                return None;
            }
            packet.extend_from_slice(data);
        }
        (packet.len() == self.full_length as usize).then_some(packet)
    }
}

/// Walk the APP1 segments of a JPEG. Returns whether any XMP segment was seen.
fn scan_jpeg(bytes: &[u8], fields: &mut Fields) -> bool {
    let mut standard = Vec::new();
    let mut extended: BTreeMap<&[u8], ExtendedXmp<'_>> = BTreeMap::new();
    let mut offset = JPEG_SOI.len();

    while offset + 4 <= bytes.len() {
        if bytes[offset] != 0xFF {
            debug!(offset, "Lost JPEG marker sync, stopping scan");
            break;
        }
        let marker = bytes[offset + 1];
        match marker {
            // fill byte
            0xFF => {
                offset += 1;
                continue;
            }
            // standalone markers
            0x01 | 0xD0..=0xD7 => {
                offset += 2;
                continue;
            }
            // start of scan or end of image: no metadata follows
            0xDA | 0xD9 => break,
            _ => {}
        }

        let length = usize::from(u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]));
        let Some(end) = (offset + 2)
            .checked_add(length)
            .filter(|end| length >= 2 && *end <= bytes.len())
        else {
            debug!(offset, length, "Truncated JPEG segment, stopping scan");
            break;
        };
        let data = &bytes[offset + 4..end];

        if marker == 0xE1 {
            if let Some(packet) = data.strip_prefix(XMP_STANDARD_NS) {
                standard.push(packet);
            } else if let Some(rest) = data.strip_prefix(XMP_EXTENSION_NS) {
                if rest.len() >= EXTENSION_HEADER_LEN {
                    let (guid, rest) = rest.split_at(32);
                    let full_length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
                    let part_offset = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
                    let entry = extended.entry(guid).or_default();
                    entry.full_length = full_length;
                    entry.parts.push((part_offset, &rest[8..]));
                }
            }
        }
        offset = end;
    }

    let seen = !standard.is_empty() || !extended.is_empty();
    debug!(
        standard = standard.len(),
        extended = extended.len(),
        "JPEG XMP segments collected"
    );

    // The main packet names the extension that belongs to it; others are stale.
    let referenced: Option<Vec<u8>> = standard.iter().find_map(|p| extended_guid(p));
    for packet in &standard {
        read_xmp(packet, fields);
    }
    for (guid, ext) in extended {
        if referenced.as_deref().is_some_and(|r| r != guid) {
            debug!(guid = %String::from_utf8_lossy(guid), "Ignoring unreferenced ExtendedXMP");
            continue;
        }
        match ext.assemble() {
            Some(packet) => read_xmp(&packet, fields),
            None => debug!(guid = %String::from_utf8_lossy(guid), "Incomplete ExtendedXMP"),
        }
    }
    seen
}

/// Value of `xmpNote:HasExtendedXMP`, as attribute or element text.
fn extended_guid(packet: &[u8]) -> Option<Vec<u8>> {
    let start = find(packet, HAS_EXTENDED_XMP)? + HAS_EXTENDED_XMP.len();
    let rest = &packet[start..];
    let value_start = rest.iter().position(|b| b.is_ascii_hexdigit())?;
    let value = rest.get(value_start..value_start + 32)?;
    value
        .iter()
        .all(u8::is_ascii_hexdigit)
        .then(|| value.to_vec())
}

// ─── XMP ─────────────────────────────────────────────────────────────────────

fn scan_xmp_packets(bytes: &[u8], fields: &mut Fields) {
    let mut rest = bytes;
    while let Some(start) = find(rest, XMP_OPEN) {
        let packet = &rest[start..];
        let end = find(packet, XMP_CLOSE).map_or(packet.len(), |pos| pos + XMP_CLOSE.len());
        read_xmp(&packet[..end], fields);
        if fields.is_complete() {
            return;
        }
        rest = &packet[end..];
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Collect fields from one XMP packet. Parse errors end the packet but keep
/// whatever was read before them.
fn read_xmp(xml: &[u8], fields: &mut Fields) {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    // Field whose element is open, with its nesting depth.
    let mut open: Option<(String, usize)> = None;
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                offer_attributes(e, fields);
                if open.is_none() {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if is_field(&name) {
                        open = Some((name, depth));
                    }
                }
            }
            Ok(Event::Empty(ref e)) => offer_attributes(e, fields),
            Ok(Event::Text(ref t)) => {
                if let Some((name, _)) = &open {
                    match t.unescape() {
                        Ok(text) => fields.offer(name, &text),
                        Err(e) => debug!(error = %e, "Skipping unescapable XMP text"),
                    }
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some((name, _)) = &open {
                    fields.offer(name, &String::from_utf8_lossy(t));
                }
            }
            Ok(Event::End(_)) => {
                if matches!(open, Some((_, d)) if d == depth) {
                    open = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, "Malformed XMP packet, keeping partial fields");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
}

fn offer_attributes(element: &BytesStart<'_>, fields: &mut Fields) {
    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if !is_field(&key) {
            continue;
        }
        if let Ok(value) = attr.unescape_value() {
            fields.offer(&key, &value);
        }
    }
}

fn is_field(name: &str) -> bool {
    matches!(name, PAYLOAD_KEY | SOULMARK_KEY | CODEX_HASH_KEY)
}
