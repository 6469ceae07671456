use crate::api::Digest;

/// SHA-256 of the body of the packed root key the GVD chain must lead back
/// to. This is the development key checked in under `devkeys/`; production
/// images substitute the hash of the signing service's root key.
pub const ROOT_KEY_HASH: Digest = [
    0xb4, 0x3d, 0x64, 0x43, 0xa1, 0x8d, 0x92, 0xb1, 0x62, 0xc3, 0x64, 0x6d, 0x52, 0x3d, 0x90, 0x9a, 0x0e, 0x15,
    0x42, 0xc7, 0x96, 0x0d, 0xe1, 0xdc, 0xbc, 0xae, 0x82, 0xda, 0x9b, 0xb4, 0x5c, 0x85,
];

/// Build-time parameters of the verifier. Nothing here is ever read from AP
/// flash.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub root_key_hash: Digest,
}

impl Default for VerifierConfig {
    fn default() -> Self { VerifierConfig { root_key_hash: ROOT_KEY_HASH } }
}

impl VerifierConfig {
    pub fn with_root_key_hash(root_key_hash: Digest) -> Self { VerifierConfig { root_key_hash } }

    /// Development images allow the record to be erased from the console and
    /// reseeded after the board ID is written.
    pub const fn dev_build() -> bool { cfg!(feature = "dev") }
}
