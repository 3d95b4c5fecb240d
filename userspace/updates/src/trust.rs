// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update trust anchors (update certificate, vendor/class GUIDs)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 6 unit tests

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::manifest;

pub const GUID_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("invalid {field}: {reason}")]
    InvalidId { field: &'static str, reason: String },
}

/// Read access to the anchors the engine verifies manifests against.
pub trait TrustAnchorProvider {
    /// Copies as much of the DER certificate as fits into `out`.
    fn update_certificate(&self, out: &mut [u8]) -> usize;

    fn vendor_id(&self) -> [u8; GUID_SIZE];

    fn class_id(&self) -> [u8; GUID_SIZE];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchors {
    certificate: Vec<u8>,
    vendor_id: [u8; GUID_SIZE],
    class_id: [u8; GUID_SIZE],
}

impl TrustAnchors {
    /// `certificate` must be a single DER SEQUENCE.
    pub fn new(
        certificate: Vec<u8>,
        vendor_id: [u8; GUID_SIZE],
        class_id: [u8; GUID_SIZE],
    ) -> Result<Self, TrustError> {
        match manifest::outer_record_len(&certificate) {
            Some(len) if len == certificate.len() => {}
            _ => {
                return Err(TrustError::InvalidCertificate(format!(
                    "{} bytes are not one DER sequence",
                    certificate.len()
                )))
            }
        }
        Ok(Self { certificate, vendor_id, class_id })
    }

    /// Builds anchors from a PEM or DER certificate and hex GUIDs.
    pub fn from_encoded(
        certificate: &[u8],
        vendor_id: &str,
        class_id: &str,
    ) -> Result<Self, TrustError> {
        let der = match core::str::from_utf8(certificate) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => pem_to_der(text)?,
            _ => certificate.to_vec(),
        };
        Self::new(der, parse_guid("vendor_id", vendor_id)?, parse_guid("class_id", class_id)?)
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate
    }
}

impl TrustAnchorProvider for TrustAnchors {
    fn update_certificate(&self, out: &mut [u8]) -> usize {
        let len = out.len().min(self.certificate.len());
        out[..len].copy_from_slice(&self.certificate[..len]);
        len
    }

    fn vendor_id(&self) -> [u8; GUID_SIZE] {
        self.vendor_id
    }

    fn class_id(&self) -> [u8; GUID_SIZE] {
        self.class_id
    }
}

/// Decodes the base64 body of a PEM document; `-----` lines are skipped.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>, TrustError> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('-'))
        .flat_map(|line| line.chars().filter(|ch| !ch.is_ascii_whitespace()))
        .collect();
    if body.is_empty() {
        return Err(TrustError::InvalidCertificate("empty PEM body".into()));
    }
    BASE64
        .decode(body.as_bytes())
        .map_err(|err| TrustError::InvalidCertificate(format!("invalid PEM base64: {err}")))
}

/// Parses a 16-byte GUID written as hex; whitespace, `-` and `:` are ignored.
pub fn parse_guid(field: &'static str, input: &str) -> Result<[u8; GUID_SIZE], TrustError> {
    let filtered: String = input
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace() && *ch != '-' && *ch != ':')
        .collect();
    let bytes = hex::decode(&filtered)
        .map_err(|err| TrustError::InvalidId { field, reason: format!("{err}") })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| TrustError::InvalidId {
        field,
        reason: format!("expected {GUID_SIZE} bytes, got {len}"),
    })
}
