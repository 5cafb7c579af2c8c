//! Split a payload of known size into multipart upload parts.

use super::UploadError;
use vidhost_core::constants::MAX_PART_COUNT;

/// Byte range uploaded as one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based.
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

/// `ceil(total / part_size)` parts of `part_size` bytes; the last one may be shorter.
///
/// A part size below `min_part_size` is rejected when it would produce a non-final
/// part that small. Parts are never coalesced to get around the limit.
pub fn plan_parts(total: u64, part_size: u64, min_part_size: u64) -> Result<Vec<PartPlan>, UploadError> {
    if total == 0 {
        return Err(UploadError::EmptySource);
    }
    if part_size == 0 {
        return Err(UploadError::PartSizeBelowMinimum {
            part_size,
            min_size: min_part_size,
        });
    }

    let count = total.div_ceil(part_size);
    if count > u64::from(MAX_PART_COUNT) {
        return Err(UploadError::TooManyParts {
            parts: count,
            max: MAX_PART_COUNT,
        });
    }
    if count > 1 && part_size < min_part_size {
        return Err(UploadError::PartSizeBelowMinimum {
            part_size,
            min_size: min_part_size,
        });
    }

    Ok((0..count)
        .map(|index| {
            let offset = index * part_size;
            PartPlan {
                part_number: index as u32 + 1,
                offset,
                len: part_size.min(total - offset),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn twelve_mib_in_five_mib_parts() {
        let parts = plan_parts(12 * MIB, 5 * MIB, 5 * MIB).unwrap();
        let sizes: Vec<u64> = parts.iter().map(|p| p.len).collect();
        assert_eq!(sizes, vec![5 * MIB, 5 * MIB, 2 * MIB]);
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(parts[2].offset, 10 * MIB);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let parts = plan_parts(10 * MIB, 5 * MIB, 5 * MIB).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len == 5 * MIB));
    }

    #[test]
    fn payload_smaller_than_one_part() {
        let parts = plan_parts(100, 5 * MIB, 5 * MIB).unwrap();
        assert_eq!(parts, vec![PartPlan { part_number: 1, offset: 0, len: 100 }]);
    }

    #[test]
    fn ranges_cover_payload_without_gaps() {
        let total = 23 * MIB + 17;
        let parts = plan_parts(total, 5 * MIB, 5 * MIB).unwrap();
        assert_eq!(parts.len() as u64, total.div_ceil(5 * MIB));
        let mut expected_offset = 0;
        for part in &parts {
            assert_eq!(part.offset, expected_offset);
            expected_offset += part.len;
        }
        assert_eq!(expected_offset, total);
    }

    #[test]
    fn empty_payload_rejected() {
        assert!(matches!(
            plan_parts(0, 5 * MIB, 5 * MIB),
            Err(UploadError::EmptySource)
        ));
    }

    #[test]
    fn undersized_non_final_part_rejected() {
        assert!(matches!(
            plan_parts(10 * MIB, MIB, 5 * MIB),
            Err(UploadError::PartSizeBelowMinimum { .. })
        ));
        // A single small part is the final part, so it is allowed.
        assert!(plan_parts(MIB / 2, MIB, 5 * MIB).is_ok());
    }

    #[test]
    fn part_count_is_bounded() {
        assert!(matches!(
            plan_parts(u64::from(MAX_PART_COUNT) * 10 + 1, 10, 1),
            Err(UploadError::TooManyParts { .. })
        ));
    }
}
