//! Digests over lists of AP flash ranges.
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

use crate::api::{Digest, RoRange, Verdict};
use crate::error::FlashError;
use crate::hal::ApFlash;

/// SHA-256 over the concatenated contents of `ranges`, in order.
pub fn hash_ranges<A: ApFlash + ?Sized>(flash: &mut A, ranges: &[RoRange]) -> Result<Digest, FlashError> {
    let mut hasher = Sha256::new();
    for range in ranges {
        if !range.is_supported() {
            log::error!("unsupported range {:x}:{:x}", range.offset, range.size);
            return Err(FlashError::OutOfRange);
        }
        log::debug!("hashing {:x}:{:x}", range.offset, range.size);
        flash.ap_hash_update(&mut hasher, range.offset, range.size)?;
    }
    Ok(hasher.finalize().into())
}

/// Compares the digest of `ranges` against `expected`. Transport errors count
/// as a failed comparison.
pub fn validate_ranges<A: ApFlash + ?Sized>(flash: &mut A, ranges: &[RoRange], expected: &[u8]) -> Verdict {
    let digest = match hash_ranges(flash, ranges) {
        Ok(digest) => digest,
        Err(e) => {
            log::error!("AP RO hashing failed: {}", e);
            return Verdict::Failed;
        }
    };
    if bool::from(digest.as_slice().ct_eq(expected)) {
        Verdict::Succeeded
    } else {
        log::error!("AP RO verification FAILED!");
        log::error!("calculated digest {}", hex::encode(digest));
        log::error!("stored digest {}", hex::encode(expected));
        Verdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MAX_SUPPORTED_FLASH_SIZE;
    use crate::testing::{filler, MockPlatform};

    fn reference(image: &[u8], ranges: &[RoRange]) -> Digest {
        let mut h = Sha256::new();
        for r in ranges {
            h.update(&image[r.offset as usize..(r.offset + r.size) as usize]);
        }
        h.finalize().into()
    }

    #[test]
    fn digest_matches_contents() {
        let image = filler(0x10000);
        let ranges = [RoRange::new(0x100, 0x1234), RoRange::new(0x8000, 0x10), RoRange::new(0x10, 0x20)];
        let mut p = MockPlatform::new(image.clone());
        assert_eq!(hash_ranges(&mut p, &ranges).unwrap(), reference(&image, &ranges));
        assert_eq!(validate_ranges(&mut p, &ranges, &reference(&image, &ranges)), Verdict::Succeeded);
    }

    #[test]
    fn any_flipped_byte_fails() {
        let image = filler(0x4000);
        let ranges = [RoRange::new(0, 0x10), RoRange::new(0x2000, 0x10)];
        let digest = reference(&image, &ranges);
        for &at in &[0usize, 0xf, 0x2000, 0x200f] {
            let mut flipped = image.clone();
            flipped[at] ^= 0x01;
            let mut p = MockPlatform::new(flipped);
            assert_eq!(validate_ranges(&mut p, &ranges, &digest), Verdict::Failed);
        }
        // bytes outside the ranges are not covered
        let mut outside = image.clone();
        outside[0x10] ^= 0x01;
        assert_eq!(validate_ranges(&mut MockPlatform::new(outside), &ranges, &digest), Verdict::Succeeded);

        let mut bad_digest = digest;
        bad_digest[31] ^= 0x80;
        assert_eq!(validate_ranges(&mut MockPlatform::new(image), &ranges, &bad_digest), Verdict::Failed);
    }

    #[test]
    fn transport_errors_fail() {
        let mut p = MockPlatform::new(filler(0x1000));
        p.fail_ap_reads = true;
        assert_eq!(hash_ranges(&mut p, &[RoRange::new(0, 0x10)]), Err(FlashError::ReadFailed));
        assert_eq!(validate_ranges(&mut p, &[RoRange::new(0, 0x10)], &[0; 32]), Verdict::Failed);
    }

    #[test]
    fn ranges_outside_supported_flash_are_refused() {
        let mut p = MockPlatform::new(Vec::new());
        let past_end = RoRange::new(MAX_SUPPORTED_FLASH_SIZE - 0x10, 0x20);
        assert_eq!(hash_ranges(&mut p, &[past_end]), Err(FlashError::OutOfRange));
        assert!(p.ap_reads.is_empty());
    }
}
