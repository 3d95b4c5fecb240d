// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update package assembly and inspection (`[DER manifest][image]`)
//! OWNERS: @tools-team
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 6 integration tests (tests/pack.rs)

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Conventional suffix of images built for streaming updates.
pub const UPDATE_IMAGE_SUFFIX: &str = "_update.bin";

/// Default package extension.
pub const PACKAGE_EXTENSION: &str = "pkg";

#[derive(Debug, Error)]
pub enum PackError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} already exists (use --force-overwrite)")]
    OutputExists(PathBuf),
    #[error("manifest does not start with a DER sequence")]
    ManifestFraming,
    #[error("manifest declares {declared} bytes but the file holds {actual}")]
    ManifestLength { declared: usize, actual: usize },
    #[error("package is shorter than its declared {declared} byte manifest")]
    Truncated { declared: usize },
}

/// Layout of an assembled package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub manifest_len: usize,
    pub image_len: usize,
    pub image_sha256: [u8; 32],
}

impl PackageInfo {
    pub fn image_sha256_hex(&self) -> String {
        hex::encode(self.image_sha256)
    }
}

/// `<image-stem>.pkg` next to the image.
pub fn default_output(image: &Path) -> PathBuf {
    image.with_extension(PACKAGE_EXTENSION)
}

pub fn has_update_suffix(image: &Path) -> bool {
    image
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(UPDATE_IMAGE_SUFFIX))
}

/// Concatenates manifest and image into `output`.
pub fn pack(
    manifest_path: &Path,
    image_path: &Path,
    output: &Path,
    force_overwrite: bool,
) -> Result<PackageInfo, PackError> {
    if output.exists() && !force_overwrite {
        return Err(PackError::OutputExists(output.to_path_buf()));
    }
    if !has_update_suffix(image_path) {
        warn!(
            "{} does not end in {UPDATE_IMAGE_SUFFIX}; is it an update image?",
            image_path.display()
        );
    }

    let manifest = read(manifest_path)?;
    let declared = updates::outer_record_len(&manifest).ok_or(PackError::ManifestFraming)?;
    if declared != manifest.len() {
        return Err(PackError::ManifestLength { declared, actual: manifest.len() });
    }
    let image = read(image_path)?;

    let mut package = Vec::with_capacity(manifest.len() + image.len());
    package.extend_from_slice(&manifest);
    package.extend_from_slice(&image);
    fs::write(output, &package)
        .map_err(|source| PackError::Write { path: output.to_path_buf(), source })?;

    let info = inspect(&package)?;
    info!(
        "wrote {} ({} byte manifest + {} byte image)",
        output.display(),
        info.manifest_len,
        info.image_len
    );
    Ok(info)
}

/// Splits a package at its manifest boundary.
pub fn inspect(package: &[u8]) -> Result<PackageInfo, PackError> {
    let declared = updates::outer_record_len(package).ok_or(PackError::ManifestFraming)?;
    if declared > package.len() {
        return Err(PackError::Truncated { declared });
    }
    let image = &package[declared..];
    Ok(PackageInfo {
        manifest_len: declared,
        image_len: image.len(),
        image_sha256: Sha256::digest(image).into(),
    })
}

pub fn inspect_file(path: &Path) -> Result<PackageInfo, PackError> {
    inspect(&read(path)?)
}

fn read(path: &Path) -> Result<Vec<u8>, PackError> {
    fs::read(path).map_err(|source| PackError::Read { path: path.to_path_buf(), source })
}
