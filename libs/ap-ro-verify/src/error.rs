use core::fmt;

/// Failures reported by the flash collaborators, both the AP flash transport
/// and the controller's own flash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlashError {
    ReadFailed,
    WriteFailed,
    EraseFailed,
    /// The request falls outside of what the device supports.
    OutOfRange,
    /// A write or erase was attempted without an open write window.
    WindowClosed,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            FlashError::ReadFailed => f.write_str("flash read failed"),
            FlashError::WriteFailed => f.write_str("flash write failed"),
            FlashError::EraseFailed => f.write_str("flash erase failed"),
            FlashError::OutOfRange => f.write_str("flash access out of range"),
            FlashError::WindowClosed => f.write_str("flash write window is closed"),
        }
    }
}

/// Rejections from the binary format decoders.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatError {
    ShortBuffer,
    BadMagic,
    BadVersion,
    /// A declared size disagrees with the sizes of the parts it covers.
    SizeMismatch,
    TooManyRanges(u32),
    /// A sub-structure does not lie within its container.
    ElementDoesNotFit,
    UnsupportedAlgorithm(u32),
    KeySizeMismatch,
    BadKeyArraySize(u32),
    BadKey,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            FormatError::ShortBuffer => f.write_str("structure truncated"),
            FormatError::BadMagic => f.write_str("bad magic"),
            FormatError::BadVersion => f.write_str("unsupported version"),
            FormatError::SizeMismatch => f.write_str("inconsistent size"),
            FormatError::TooManyRanges(n) => write!(f, "too many ranges ({})", n),
            FormatError::ElementDoesNotFit => f.write_str("element does not fit its container"),
            FormatError::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm {}", alg),
            FormatError::KeySizeMismatch => f.write_str("key size mismatch"),
            FormatError::BadKeyArraySize(n) => write!(f, "key array size mismatch {}", n),
            FormatError::BadKey => f.write_str("malformed public key"),
        }
    }
}

/// Reasons a GVD trust chain is rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChainError {
    Flash(FlashError),
    Format(FormatError),
    /// `fmap_location` in the blob does not name the FMAP it was found through.
    LocationMismatch { fmap: u32, claimed: u32 },
    BoardIdMismatch { fused: u32, claimed: u32 },
    RootKeyHashMismatch,
    KeyblockSignature,
    GvdSignature,
    RangesDigest,
    Rollback(u32),
    CacheMismatch,
    /// The controller's own flash could not be updated.
    Storage(FlashError),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ChainError::Flash(e) => write!(f, "AP flash: {}", e),
            ChainError::Format(e) => write!(f, "malformed: {}", e),
            ChainError::LocationMismatch { fmap, claimed } => {
                write!(f, "GVD claims FMAP at {:x}, found through {:x}", claimed, fmap)
            }
            ChainError::BoardIdMismatch { fused, claimed } => {
                write!(f, "board ID mismatch {:08x} != {:08x}", fused, claimed)
            }
            ChainError::RootKeyHashMismatch => f.write_str("root key digest mismatch"),
            ChainError::KeyblockSignature => f.write_str("keyblock signature invalid"),
            ChainError::GvdSignature => f.write_str("GVD signature invalid"),
            ChainError::RangesDigest => f.write_str("ranges digest mismatch"),
            ChainError::Rollback(r) => write!(f, "rejecting GVD rollback {}", r),
            ChainError::CacheMismatch => f.write_str("GVD hash mismatch"),
            ChainError::Storage(e) => write!(f, "record storage: {}", e),
        }
    }
}

impl From<FlashError> for ChainError {
    fn from(e: FlashError) -> Self { ChainError::Flash(e) }
}

impl From<FormatError> for ChainError {
    fn from(e: FormatError) -> Self { ChainError::Format(e) }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}
#[cfg(feature = "std")]
impl std::error::Error for FormatError {}
#[cfg(feature = "std")]
impl std::error::Error for ChainError {}
