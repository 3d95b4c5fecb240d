// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Host fixtures for update integration tests (engines, packages, simulated flash)
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Stable
//! TEST_COVERAGE: fixtures only; tests live in tests/
//!
//! PUBLIC API:
//!   - FlashEngine: DER-manifest engine storing the image in a candidate slot on SimulatedNor
//!   - ScriptedEngine: engine whose every decision is set by the test
//!   - build_manifest / build_package: package builders

use der::asn1::OctetStringRef;
use der::{Decode, Encode, Header, Reader, SliceReader, Tag};
use sha2::{Digest, Sha256};
use storage_nor_flash::sim::SimulatedNor;
use storage_nor_flash::{FlashGeometry, NorFlash};
use updates::{
    Callback, CandidateLayout, CandidateRegion, CandidateWriter, ComponentName, ImageHeader,
    ImageSink, ManifestValidator, StatusCode, UpdateHooks, VendorStatus,
};

pub const GEOMETRY: FlashGeometry =
    FlashGeometry { size: 0x2_0000, write_page: 0x100, erase_page: 0x1000 };
pub const REGION: CandidateRegion = CandidateRegion { start: 0x1_0000, size: 0x1_0000 };
pub const LAYOUT: CandidateLayout = CandidateLayout { ready_header: true };

/// What a manifest promises about the image that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestInfo {
    pub digest: [u8; 32],
    pub size: u32,
    pub version: u32,
}

/// `SEQUENCE { OCTET STRING digest, INTEGER size, INTEGER version }`
pub fn build_manifest(info: &ManifestInfo) -> Vec<u8> {
    let mut body = Vec::new();
    OctetStringRef::new(&info.digest).unwrap().encode_to_vec(&mut body).unwrap();
    info.size.encode_to_vec(&mut body).unwrap();
    info.version.encode_to_vec(&mut body).unwrap();
    let mut manifest = Vec::new();
    Header::new(Tag::Sequence, body.len()).unwrap().encode_to_vec(&mut manifest).unwrap();
    manifest.extend_from_slice(&body);
    manifest
}

pub fn parse_manifest(manifest: &[u8]) -> der::Result<ManifestInfo> {
    let mut reader = SliceReader::new(manifest)?;
    let info = reader.sequence(|seq| {
        let digest_ref = OctetStringRef::decode(seq)?;
        let size = u32::decode(seq)?;
        let version = u32::decode(seq)?;
        let mut digest = [0u8; 32];
        if digest_ref.as_bytes().len() != digest.len() {
            return Err(Tag::OctetString.length_error());
        }
        digest.copy_from_slice(digest_ref.as_bytes());
        Ok(ManifestInfo { digest, size, version })
    })?;
    reader.finish(info)
}

/// Manifest for `image` followed by the image itself.
pub fn build_package(image: &[u8], version: u32) -> Vec<u8> {
    let info = ManifestInfo {
        digest: Sha256::digest(image).into(),
        size: image.len() as u32,
        version,
    };
    let mut package = build_manifest(&info);
    package.extend_from_slice(image);
    package
}

pub fn test_image(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingDownloadGrant,
    Downloading,
    AwaitingInstallGrant,
}

/// Engine backed by a candidate slot on a simulated NOR part.
pub struct FlashEngine {
    pub writer: CandidateWriter<NorFlash<SimulatedNor>>,
    pub state: EngineState,
    pub manifest: Option<ManifestInfo>,
    pub grant_download: bool,
    pub grant_install: bool,
    /// Deferred callbacks chained between image ready and the install request.
    pub finalize_steps: u32,
    pub finalize_calls: u32,
    pub staged: Option<ImageHeader>,
    pub installed: Option<ImageHeader>,
    pub aborts: u32,
}

impl FlashEngine {
    pub fn new() -> Self {
        Self::with_nor(SimulatedNor::new(GEOMETRY))
    }

    pub fn with_nor(nor: SimulatedNor) -> Self {
        let flash = NorFlash::new(nor, GEOMETRY).unwrap().with_poll_limit(Some(64));
        Self {
            writer: CandidateWriter::new(flash, REGION, LAYOUT).unwrap(),
            state: EngineState::Idle,
            manifest: None,
            grant_download: true,
            grant_install: true,
            finalize_steps: 2,
            finalize_calls: 0,
            staged: None,
            installed: None,
            aborts: 0,
        }
    }

    pub fn nor(&self) -> &SimulatedNor {
        self.writer.storage().bus()
    }

    pub fn nor_mut(&mut self) -> &mut SimulatedNor {
        self.writer.storage_mut().bus_mut()
    }

    fn finalize(&mut self, hooks: &mut UpdateHooks<Self>) {
        let Some(info) = self.manifest else {
            hooks.report(VendorStatus::InternalError);
            return;
        };
        let header = match self.writer.finish(u64::from(info.version), ComponentName::MAIN) {
            Ok(header) => header,
            Err(err) => {
                hooks.report(err);
                return;
            }
        };
        if header.digest != info.digest {
            hooks.report(VendorStatus::ManifestPayloadCorrupted);
            return;
        }
        self.staged = Some(header);
        self.state = EngineState::AwaitingInstallGrant;
        hooks.request_install_authorization().unwrap();
    }
}

impl Default for FlashEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn finalize_step(remaining: u32) -> Callback<FlashEngine> {
    Box::new(move |engine: &mut FlashEngine, hooks: &mut UpdateHooks<FlashEngine>| {
        engine.finalize_calls += 1;
        if remaining > 1 {
            hooks.defer(finalize_step(remaining - 1)).unwrap();
        } else {
            engine.finalize(hooks);
        }
    })
}

impl ManifestValidator for FlashEngine {
    fn on_manifest(&mut self, manifest: &[u8], hooks: &mut UpdateHooks<Self>) {
        let info = match parse_manifest(manifest) {
            Ok(info) => info,
            Err(_) => {
                hooks.report(VendorStatus::ManifestMalformed);
                return;
            }
        };
        if let Err(err) = self.writer.begin(u64::from(info.size)) {
            hooks.report(err);
            return;
        }
        self.manifest = Some(info);
        self.state = EngineState::AwaitingDownloadGrant;
        hooks.request_install_authorization().unwrap();
    }

    fn is_update_active(&self) -> bool {
        self.state != EngineState::Idle
    }

    fn authorize_install(&mut self, hooks: &mut UpdateHooks<Self>) {
        match self.state {
            EngineState::AwaitingDownloadGrant if self.grant_download => {
                self.state = EngineState::Downloading;
            }
            EngineState::AwaitingDownloadGrant => {
                hooks.report(VendorStatus::DownloadAuthNotGranted);
                self.state = EngineState::Idle;
            }
            EngineState::AwaitingInstallGrant if self.grant_install => {
                self.installed = self.staged;
            }
            EngineState::AwaitingInstallGrant => {
                hooks.report(VendorStatus::InstallAuthNotGranted);
            }
            _ => hooks.report(VendorStatus::InternalError),
        }
    }
}

impl ImageSink for FlashEngine {
    fn write_fragment(
        &mut self,
        offset: u64,
        data: &[u8],
        _hooks: &mut UpdateHooks<Self>,
    ) -> Result<(), StatusCode> {
        if self.state != EngineState::Downloading {
            return Err(VendorStatus::InternalError.into());
        }
        self.writer.write_fragment(offset, data).map_err(StatusCode::from)
    }

    fn on_image_ready(&mut self, hooks: &mut UpdateHooks<Self>) -> Result<(), StatusCode> {
        let expected = self.manifest.map(|info| u64::from(info.size)).unwrap_or_default();
        if self.writer.received() != expected {
            return Err(VendorStatus::DownloadFragmentFailed.into());
        }
        if self.finalize_steps == 0 {
            self.finalize(hooks);
        } else {
            hooks.defer(finalize_step(self.finalize_steps)).unwrap();
        }
        Ok(())
    }

    fn abort(&mut self) {
        if let Err(err) = self.writer.discard() {
            log::warn!("test engine: discard failed: {err}");
        }
        self.state = EngineState::Idle;
        self.manifest = None;
        self.aborts += 1;
    }
}

/// Engine whose behaviour is fully set by the test.
pub struct ScriptedEngine {
    pub accept_manifest: bool,
    pub request_download: bool,
    pub grant_download: bool,
    /// Callbacks scheduled by `on_image_ready`; the last one requests install.
    pub ready_callbacks: u32,
    pub request_install: bool,
    pub fragment_error: Option<StatusCode>,
    pub ready_error: Option<StatusCode>,
    pub active: bool,
    pub manifests: Vec<Vec<u8>>,
    pub fragments: Vec<(u64, usize)>,
    pub image: Vec<u8>,
    pub authorizations: u32,
    pub callbacks_run: u32,
    pub aborts: u32,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            accept_manifest: true,
            request_download: true,
            grant_download: true,
            ready_callbacks: 1,
            request_install: true,
            fragment_error: None,
            ready_error: None,
            active: false,
            manifests: Vec::new(),
            fragments: Vec::new(),
            image: Vec::new(),
            authorizations: 0,
            callbacks_run: 0,
            aborts: 0,
        }
    }
}

fn scripted_step(remaining: u32) -> Callback<ScriptedEngine> {
    Box::new(move |engine: &mut ScriptedEngine, hooks: &mut UpdateHooks<ScriptedEngine>| {
        engine.callbacks_run += 1;
        if remaining > 1 {
            hooks.defer(scripted_step(remaining - 1)).unwrap();
        } else if engine.request_install {
            hooks.request_install_authorization().unwrap();
        }
    })
}

impl ManifestValidator for ScriptedEngine {
    fn on_manifest(&mut self, manifest: &[u8], hooks: &mut UpdateHooks<Self>) {
        self.manifests.push(manifest.to_vec());
        if !self.accept_manifest {
            return;
        }
        self.active = true;
        if self.request_download {
            hooks.request_install_authorization().unwrap();
        }
    }

    fn is_update_active(&self) -> bool {
        self.active
    }

    fn authorize_install(&mut self, _hooks: &mut UpdateHooks<Self>) {
        self.authorizations += 1;
        if self.authorizations == 1 && !self.grant_download {
            self.active = false;
        }
    }
}

impl ImageSink for ScriptedEngine {
    fn write_fragment(
        &mut self,
        offset: u64,
        data: &[u8],
        _hooks: &mut UpdateHooks<Self>,
    ) -> Result<(), StatusCode> {
        if let Some(code) = self.fragment_error {
            return Err(code);
        }
        self.fragments.push((offset, data.len()));
        self.image.extend_from_slice(data);
        Ok(())
    }

    fn on_image_ready(&mut self, hooks: &mut UpdateHooks<Self>) -> Result<(), StatusCode> {
        if let Some(code) = self.ready_error {
            return Err(code);
        }
        if self.ready_callbacks > 0 {
            hooks.defer(scripted_step(self.ready_callbacks)).unwrap();
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.active = false;
        self.aborts += 1;
    }
}
