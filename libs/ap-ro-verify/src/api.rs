use bytemuck::{Pod, Zeroable};

pub const SHA256_DIGEST_SIZE: usize = 32;
pub type Digest = [u8; SHA256_DIGEST_SIZE];

/// FMAP headers are only looked for at multiples of this offset.
pub const LOWEST_FMAP_ALIGNMENT: u32 = 4096;
pub const MAX_SUPPORTED_FLASH_SIZE: u32 = 32 * 1024 * 1024;
/// Largest range that can be hashed, also the largest single AP flash read.
pub const MAX_SUPPORTED_RANGE_SIZE: u32 = 4 * 1024 * 1024;
pub const APRO_MAX_NUM_RANGES: usize = 32;
/// GVD blobs with a rollback counter below this value are never accepted.
pub const LOWEST_ACCEPTABLE_ROLLBACK: u32 = 1;
/// Range hashing reads AP flash in pieces of this size.
pub const FLASH_READ_CHUNK: usize = 4096;
/// Size of the controller flash page holding the check record.
pub const RECORD_SPACE_SIZE: usize = 2048;
/// Interval at which a latched failure re-asserts the AP reset.
pub const RESET_HOLD_PERIOD_MS: usize = 100;

/// A span of AP flash included in a digest. Stored little-endian, both on the
/// AP and in the controller's record page.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RoRange {
    pub offset: u32,
    pub size: u32,
}
pub const RO_RANGE_SIZE: usize = core::mem::size_of::<RoRange>();

impl RoRange {
    pub const fn new(offset: u32, size: u32) -> Self { RoRange { offset, size } }

    /// Exclusive end of the range, `None` if it wraps the address space.
    pub fn end(&self) -> Option<u32> { self.offset.checked_add(self.size) }

    /// True if the range is small enough to hash and lies within the largest
    /// supported flash part.
    pub fn is_supported(&self) -> bool {
        self.size <= MAX_SUPPORTED_RANGE_SIZE
            && self.end().map(|end| end <= MAX_SUPPORTED_FLASH_SIZE).unwrap_or(false)
    }
}

/// Outcome of a single verification scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Failed,
    /// The scheme is not provisioned on this unit; not a failure.
    NotFound,
}

/// Latched result of the last verification run, reported to the host as a
/// single byte.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum ApRoStatus {
    NotRun = 0,
    PassUnverifiedGbb = 1,
    Fail = 2,
    UnsupportedUnknown = 3,
    UnsupportedNotTriggered = 4,
    UnsupportedTriggered = 5,
    Pass = 6,
    InProgress = 7,
}

/// Error codes returned in the response byte of the seed and hash commands.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum Arcve {
    Ok = 0,
    TooShort = 1,
    BadPayloadSize = 2,
    BadOffset = 3,
    BadRangeSize = 4,
    AlreadyProgrammed = 5,
    FlashWriteFailed = 6,
    BidProgrammed = 7,
    FlashEraseFailed = 8,
    TooManyRanges = 9,
    NotProgrammed = 10,
    FlashReadFailed = 11,
    BoardIdBlocked = 12,
}

/// Audit log payloads.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum ApRoEvent {
    RefreshPressed = 0,
    CheckFailed = 1,
    CheckSucceeded = 2,
    CheckTriggered = 3,
    CheckUnsupported = 4,
    SpaceNotProgrammed = 5,
    SpaceInvalid = 6,
}

/// Return code of a vendor command.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum VendorRc {
    Success = 0,
    BogusArgs = 1,
    ReadFlashFail = 2,
    WriteFlashFail = 3,
    InternalError = 6,
    NotAllowed = 7,
}

/// Result byte of a verification run, as seen by whoever triggered it.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum CheckOutcome {
    Success = 0,
    /// Verification is not configured on this unit, boot may proceed.
    Unimplemented = 2,
    /// Verification failed, the AP is held in reset.
    Crc = 9,
}
