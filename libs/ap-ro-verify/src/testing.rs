//! Test platform and AP image construction shared by the unit tests.
use std::sync::OnceLock;

use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest as _, Sha256, Sha512};

use crate::api::*;
use crate::error::FlashError;
use crate::formats::fmap::{FMAP_AREA_SIZE, FMAP_HEADER_SIZE, FMAP_NAMELEN, FMAP_SIGNATURE};
use crate::formats::gvd::{GvdHeader, GSC_VD_MAGIC, GVD_HEADER_SIZE, GVD_ROOT_KEY_HEADER_OFFSET, GVD_SIG_HEADER_OFFSET};
use crate::formats::vb2::*;
use crate::hal::*;

pub(crate) static ROOT_VBPUBK: &[u8] = include_bytes!("../devkeys/root_key.vbpubk");
pub(crate) static PLATFORM_VBPUBK: &[u8] = include_bytes!("../devkeys/platform_key.vbpubk");

pub(crate) struct DevKeys {
    pub root: RsaPrivateKey,
    pub platform: RsaPrivateKey,
}

pub(crate) fn dev_keys() -> &'static DevKeys {
    static KEYS: OnceLock<DevKeys> = OnceLock::new();
    KEYS.get_or_init(|| DevKeys {
        root: RsaPrivateKey::from_pkcs8_pem(include_str!("../devkeys/root_key.pem")).unwrap(),
        platform: RsaPrivateKey::from_pkcs8_pem(include_str!("../devkeys/platform_key.pem")).unwrap(),
    })
}

pub(crate) fn sign(key: &RsaPrivateKey, parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &hasher.finalize()).unwrap()
}

/// header | data key body | signature | hash
pub(crate) fn build_keyblock(signer: &RsaPrivateKey, data_key_body: &[u8]) -> Vec<u8> {
    let signed_len = KEYBLOCK_HEADER_SIZE + data_key_body.len();
    let mut hdr = Vb2KeyblockHeader {
        magic: KEYBLOCK_MAGIC,
        header_version_major: KEYBLOCK_MAJOR_VERSION,
        header_version_minor: KEYBLOCK_MINOR_VERSION,
        keyblock_size: (signed_len + RSA4096_SIG_SIZE + 64) as u32,
        ..Default::default()
    };
    hdr.keyblock_signature = Vb2Signature {
        sig_offset: (signed_len - 24) as u32,
        sig_size: RSA4096_SIG_SIZE as u32,
        data_size: signed_len as u32,
        ..Default::default()
    };
    hdr.keyblock_hash = Vb2Signature {
        sig_offset: (signed_len + RSA4096_SIG_SIZE - 48) as u32,
        sig_size: 64,
        data_size: signed_len as u32,
        ..Default::default()
    };
    hdr.data_key = Vb2PackedKey {
        key_offset: (KEYBLOCK_HEADER_SIZE - 80) as u32,
        key_size: data_key_body.len() as u32,
        algorithm: VB2_ALG_RSA4096_SHA256,
        key_version: 1,
        ..Default::default()
    };
    let mut raw = bytemuck::bytes_of(&hdr).to_vec();
    raw.extend_from_slice(data_key_body);
    let signature = sign(signer, &[raw.as_slice()]);
    let hash = Sha512::digest(&raw);
    raw.extend_from_slice(&signature);
    raw.extend_from_slice(&hash);
    raw
}

/// The platform key signed by the root key. Signing is deterministic, so the
/// block is built once per test binary.
pub(crate) fn platform_keyblock() -> &'static [u8] {
    static KEYBLOCK: OnceLock<Vec<u8>> = OnceLock::new();
    KEYBLOCK.get_or_init(|| build_keyblock(&dev_keys().root, &PLATFORM_VBPUBK[32..]))
}

pub(crate) fn fmap_header_bytes(base: u64, size: u32, nareas: u16) -> [u8; FMAP_HEADER_SIZE] {
    let mut raw = [0u8; FMAP_HEADER_SIZE];
    raw[0..8].copy_from_slice(&FMAP_SIGNATURE);
    raw[8] = 1;
    raw[9] = 1;
    raw[10..18].copy_from_slice(&base.to_le_bytes());
    raw[18..22].copy_from_slice(&size.to_le_bytes());
    raw[22..26].copy_from_slice(b"FMAP");
    raw[54..56].copy_from_slice(&nareas.to_le_bytes());
    raw
}

pub(crate) fn fmap_area_bytes(name: &[u8], offset: u32, size: u32) -> [u8; FMAP_AREA_SIZE] {
    assert!(name.len() < FMAP_NAMELEN);
    let mut raw = [0u8; FMAP_AREA_SIZE];
    raw[0..4].copy_from_slice(&offset.to_le_bytes());
    raw[4..8].copy_from_slice(&size.to_le_bytes());
    raw[8..8 + name.len()].copy_from_slice(name);
    raw
}

pub(crate) const IMAGE_SIZE: usize = 0x4_0000;
pub(crate) const FMAP_OFFSET: u32 = 0x1_0000;
pub(crate) const GVD_OFFSET: u32 = 0x2_0000;
pub(crate) const BOARD_ID: u32 = 0x5a5a_4352;

/// Describes an AP image carrying a signed GVD.
#[derive(Clone)]
pub(crate) struct GvdImage {
    pub fmap_offset: u32,
    pub gvd_offset: u32,
    /// What the GVD claims as its FMAP location.
    pub fmap_location: u32,
    pub rollback: u16,
    pub board_id: u32,
    pub ranges: Vec<RoRange>,
}

impl Default for GvdImage {
    fn default() -> Self {
        GvdImage {
            fmap_offset: FMAP_OFFSET,
            gvd_offset: GVD_OFFSET,
            fmap_location: FMAP_OFFSET,
            rollback: 1,
            board_id: BOARD_ID,
            ranges: vec![RoRange::new(0, 0x8000), RoRange::new(FMAP_OFFSET, 0x1000)],
        }
    }
}

pub(crate) fn filler(len: usize) -> Vec<u8> { (0..len).map(|i| (i.wrapping_mul(7) ^ (i >> 9)) as u8).collect() }

impl GvdImage {
    /// The image built from `GvdImage::default()`.
    pub fn default_image() -> Vec<u8> {
        static IMAGE: OnceLock<Vec<u8>> = OnceLock::new();
        IMAGE.get_or_init(|| GvdImage::default().build()).clone()
    }

    pub fn build(&self) -> Vec<u8> {
        let keys = dev_keys();
        let mut flash = filler(IMAGE_SIZE);

        let fmap = self.fmap_offset as usize;
        flash[fmap..fmap + FMAP_HEADER_SIZE].copy_from_slice(&fmap_header_bytes(0, IMAGE_SIZE as u32, 2));
        let areas = fmap + FMAP_HEADER_SIZE;
        flash[areas..areas + FMAP_AREA_SIZE].copy_from_slice(&fmap_area_bytes(b"RO_SECTION", 0, 0x1_0000));
        flash[areas + FMAP_AREA_SIZE..areas + 2 * FMAP_AREA_SIZE]
            .copy_from_slice(&fmap_area_bytes(b"RO_GSCVD", self.gvd_offset, 0x4000));

        let mut hasher = Sha256::new();
        for r in &self.ranges {
            hasher.update(&flash[r.offset as usize..(r.offset + r.size) as usize]);
        }
        let ranges_digest = hasher.finalize();

        let ranges_len = RO_RANGE_SIZE * self.ranges.len();
        let signed_len = GVD_HEADER_SIZE + ranges_len;
        let root_body = &ROOT_VBPUBK[32..];
        let mut hdr: GvdHeader = bytemuck::Zeroable::zeroed();
        hdr.magic = GSC_VD_MAGIC;
        hdr.size = (signed_len + RSA4096_SIG_SIZE + root_body.len()) as u16;
        hdr.rollback_counter = self.rollback;
        hdr.board_id = self.board_id;
        hdr.fmap_location = self.fmap_location;
        hdr.hash_alg = 2;
        hdr.sig_header = Vb2Signature {
            sig_offset: signed_len as u32 - GVD_SIG_HEADER_OFFSET,
            sig_size: RSA4096_SIG_SIZE as u32,
            data_size: signed_len as u32,
            ..Default::default()
        };
        hdr.root_key_header = Vb2PackedKey {
            key_offset: (signed_len + RSA4096_SIG_SIZE) as u32 - GVD_ROOT_KEY_HEADER_OFFSET,
            key_size: root_body.len() as u32,
            algorithm: VB2_ALG_RSA4096_SHA256,
            key_version: 1,
            ..Default::default()
        };
        hdr.ranges_digest[..32].copy_from_slice(&ranges_digest);
        hdr.range_count = self.ranges.len() as u32;

        let mut blob = bytemuck::bytes_of(&hdr).to_vec();
        blob.extend_from_slice(bytemuck::cast_slice(&self.ranges));
        let signature = sign(&keys.platform, &[blob.as_slice()]);
        blob.extend_from_slice(&signature);
        blob.extend_from_slice(root_body);
        blob.extend_from_slice(platform_keyblock());

        let gvd = self.gvd_offset as usize;
        flash[gvd..gvd + blob.len()].copy_from_slice(&blob);
        flash
    }

    /// Offset of the key block in the built image.
    pub fn keyblock_offset(&self) -> u32 {
        self.gvd_offset
            + (GVD_HEADER_SIZE + RO_RANGE_SIZE * self.ranges.len() + RSA4096_SIG_SIZE + RSA4096_KEY_SIZE) as u32
    }
}

/// In-memory stand-in for every collaborator.
pub(crate) struct MockPlatform {
    pub ap: Vec<u8>,
    pub ap_reads: Vec<(u32, usize)>,
    pub fail_ap_reads: bool,
    pub record: Vec<u8>,
    pub window: Option<usize>,
    pub fail_record_write: bool,
    pub fail_record_erase: bool,
    pub aprv: u32,
    pub fail_aprv_write: bool,
    pub board_id_type: u32,
    pub blocked: bool,
    pub events: Vec<ApRoEvent>,
    pub reset_asserted: bool,
    pub sleep_inhibited: bool,
    pub ccd_allows: bool,
}

impl MockPlatform {
    pub fn new(ap: Vec<u8>) -> Self {
        MockPlatform {
            ap,
            ap_reads: Vec::new(),
            fail_ap_reads: false,
            record: vec![0xff; RECORD_SPACE_SIZE],
            window: None,
            fail_record_write: false,
            fail_record_erase: false,
            aprv: 0xffff_ffff,
            fail_aprv_write: false,
            board_id_type: BOARD_ID,
            blocked: false,
            events: Vec::new(),
            reset_asserted: false,
            sleep_inhibited: false,
            ccd_allows: true,
        }
    }

    /// A blank board as it leaves the factory line.
    pub fn blank(ap: Vec<u8>) -> Self { MockPlatform { board_id_type: BOARD_ID_TYPE_BLANK, ..Self::new(ap) } }

    /// True if any AP read since the last `clear_reads` touched `[start, end)`.
    pub fn read_touched(&self, start: u32, end: u32) -> bool {
        self.ap_reads.iter().any(|&(offset, len)| offset < end && offset + len as u32 > start)
    }

    pub fn clear_reads(&mut self) { self.ap_reads.clear(); }
}

impl ApFlash for MockPlatform {
    fn ap_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if self.fail_ap_reads {
            return Err(FlashError::ReadFailed);
        }
        if buf.len() > MAX_SUPPORTED_RANGE_SIZE as usize {
            return Err(FlashError::OutOfRange);
        }
        self.ap_reads.push((offset, buf.len()));
        for (i, b) in buf.iter_mut().enumerate() {
            // unpopulated flash reads as erased
            *b = self.ap.get(offset as usize + i).copied().unwrap_or(0xff);
        }
        Ok(())
    }
}

impl RecordFlash for MockPlatform {
    fn record_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        let src = self.record.get(offset..offset + buf.len()).ok_or(FlashError::OutOfRange)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn open_window(&mut self, len: usize) { self.window = Some(len); }

    fn close_window(&mut self) { self.window = None; }

    fn record_erase(&mut self) -> Result<(), FlashError> {
        if self.window.is_none() {
            return Err(FlashError::WindowClosed);
        }
        if self.fail_record_erase {
            return Err(FlashError::EraseFailed);
        }
        self.record.iter_mut().for_each(|b| *b = 0xff);
        Ok(())
    }

    fn record_write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError> {
        match self.window {
            Some(len) if offset + data.len() <= len => {}
            _ => return Err(FlashError::WindowClosed),
        }
        if self.fail_record_write {
            return Err(FlashError::WriteFailed);
        }
        // programming can only clear bits
        for (dst, src) in self.record[offset..offset + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        Ok(())
    }

    fn aprv_read(&mut self) -> Result<u32, FlashError> { Ok(self.aprv) }

    fn aprv_write(&mut self, value: u32) -> Result<(), FlashError> {
        if self.fail_aprv_write {
            return Err(FlashError::WriteFailed);
        }
        self.aprv &= value;
        Ok(())
    }
}

impl BoardIdentity for MockPlatform {
    fn board_id_type(&mut self) -> Result<u32, FlashError> { Ok(self.board_id_type) }

    fn ap_ro_blocked(&mut self) -> bool { self.blocked }
}

impl EventLog for MockPlatform {
    fn add_event(&mut self, event: ApRoEvent) { self.events.push(event); }
}

impl ResetLine for MockPlatform {
    fn assert_reset(&mut self) { self.reset_asserted = true; }

    fn deassert_reset(&mut self) { self.reset_asserted = false; }

    fn inhibit_sleep(&mut self, inhibit: bool) { self.sleep_inhibited = inhibit; }
}

impl CcdPolicy for MockPlatform {
    fn ap_ro_check_allowed(&mut self) -> bool { self.ccd_allows }
}
