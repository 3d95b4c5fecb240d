// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: TOML configuration for the update stack (flash, candidate slot, stream, trust)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 6 unit tests
//!
//! Every table is optional; missing keys take the MX25R6435F defaults.
//!
//! ```toml
//! [flash]
//! size = 0x800000
//! fast_read = true
//! poll_limit = 1000000
//!
//! [candidate]
//! start = 0x400000
//! size = 0x400000
//! ready_header = true
//! component = "MAIN"
//!
//! [stream]
//! max_manifest_size = 65536
//!
//! [trust]
//! update_cert = "certs/update.pem"
//! vendor_id = "fa6b4a53-d5ad-5fdf-be9d-e663e4d41ffe"
//! class_id = "3fb841b6-5a79-bf68-a4d5-e2d35d8436ba"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use storage_nor_flash::{FlashGeometry, NorError, NorFlash, QspiBus, ReadMode};
use thiserror::Error;

use crate::candidate::{CandidateError, CandidateLayout, CandidateRegion, ComponentName};
use crate::context::FirmwareUpdate;
use crate::engine::UpdateEngine;
use crate::session::DEFAULT_MAX_MANIFEST_SIZE;
use crate::trust::{TrustAnchors, TrustError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse update config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid update config: {0}")]
    Invalid(String),
    #[error("flash: {0}")]
    Flash(#[from] NorError),
    #[error("candidate: {0}")]
    Candidate(#[from] CandidateError),
    #[error("trust anchors: {0}")]
    Trust(#[from] TrustError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    pub flash: FlashConfig,
    pub candidate: CandidateConfig,
    pub stream: StreamConfig,
    pub trust: Option<TrustConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    pub size: u32,
    pub write_page: u32,
    pub erase_page: u32,
    pub fast_read: bool,
    /// `None` polls until the chip reports ready.
    pub poll_limit: Option<u32>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        let geometry = FlashGeometry::MX25R6435F;
        Self {
            size: geometry.size,
            write_page: geometry.write_page,
            erase_page: geometry.erase_page,
            fast_read: false,
            poll_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CandidateConfig {
    pub start: u32,
    pub size: u32,
    pub ready_header: bool,
    pub component: String,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        let half = FlashGeometry::MX25R6435F.size / 2;
        Self { start: half, size: half, ready_header: true, component: "MAIN".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub max_manifest_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// PEM or DER file; relative paths resolve against the config file.
    pub update_cert: PathBuf,
    pub vendor_id: String,
    pub class_id: String,
}

impl UpdateConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let geometry = self.geometry();
        geometry.validate()?;
        if self.flash.poll_limit == Some(0) {
            return Err(ConfigError::Invalid("flash.poll_limit must be non-zero".into()));
        }
        let region = self.candidate_region();
        let end = region.start.checked_add(region.size);
        if region.start % geometry.erase_page != 0
            || region.size % geometry.erase_page != 0
            || region.size <= self.candidate_layout().image_offset()
            || end.map_or(true, |end| end > geometry.size)
        {
            return Err(CandidateError::Region { start: region.start, size: region.size }.into());
        }
        self.component()?;
        if self.stream.max_manifest_size < crate::manifest::HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "stream.max_manifest_size must be at least {}",
                crate::manifest::HEADER_SIZE
            )));
        }
        Ok(())
    }

    pub fn geometry(&self) -> FlashGeometry {
        FlashGeometry {
            size: self.flash.size,
            write_page: self.flash.write_page,
            erase_page: self.flash.erase_page,
        }
    }

    pub fn read_mode(&self) -> ReadMode {
        if self.flash.fast_read {
            ReadMode::Fast
        } else {
            ReadMode::Normal
        }
    }

    pub fn candidate_region(&self) -> CandidateRegion {
        CandidateRegion { start: self.candidate.start, size: self.candidate.size }
    }

    pub fn candidate_layout(&self) -> CandidateLayout {
        CandidateLayout { ready_header: self.candidate.ready_header }
    }

    pub fn component(&self) -> Result<ComponentName, ConfigError> {
        Ok(ComponentName::new(&self.candidate.component)?)
    }

    /// Builds the flash driver described by `[flash]` over `bus`.
    pub fn open_flash<B: QspiBus>(&self, bus: B) -> Result<NorFlash<B>, ConfigError> {
        let flash = NorFlash::new(bus, self.geometry())?
            .with_read_mode(self.read_mode())
            .with_poll_limit(self.flash.poll_limit);
        Ok(flash)
    }

    /// Builds the producer context for `engine` with the `[stream]` limits.
    pub fn firmware_update<E: UpdateEngine>(&self, engine: E) -> FirmwareUpdate<E> {
        FirmwareUpdate::new(engine).with_manifest_limit(self.stream.max_manifest_size)
    }

    /// Loads `[trust]`, resolving the certificate path against `base_dir`.
    pub fn load_trust_anchors(&self, base_dir: &Path) -> Result<Option<TrustAnchors>, ConfigError> {
        let Some(trust) = &self.trust else {
            return Ok(None);
        };
        let path = base_dir.join(&trust.update_cert);
        let certificate =
            fs::read(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let anchors = TrustAnchors::from_encoded(&certificate, &trust.vendor_id, &trust.class_id)?;
        Ok(Some(anchors))
    }
}
