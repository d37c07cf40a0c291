//! Bit layout for a generated id.
//!
//! ```text
//! | sign=0 | timestamp (41 bits) | datacenter (2 bits) | worker (8 bits) | sequence (12 bits) |
//! ```

/// 2022-01-01T00:00:00Z UTC, in milliseconds since the Unix epoch.
pub const EPOCH_MS: i64 = 1_640_966_400_000;

pub const TIMESTAMP_BITS: u32 = 41;
pub const DATACENTER_BITS: u32 = 2;
pub const WORKER_BITS: u32 = 8;
pub const SEQUENCE_BITS: u32 = 12;

pub const TIMESTAMP_SHIFT: u32 = DATACENTER_BITS + WORKER_BITS + SEQUENCE_BITS;
pub const DATACENTER_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;
pub const WORKER_SHIFT: u32 = SEQUENCE_BITS;

/// Maximum timestamp value (`2^41 - 1`).
pub const MAX_TIMESTAMP: i64 = (1 << TIMESTAMP_BITS) - 1;
/// Maximum datacenter id (`2^2 - 1`).
pub const MAX_DATACENTER_ID: i64 = (1 << DATACENTER_BITS) - 1;
/// Maximum worker id (`2^8 - 1` = 255).
pub const MAX_WORKER_ID: i64 = (1 << WORKER_BITS) - 1;
/// Maximum sequence value (`2^12 - 1` = 4095).
pub const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// Packs the four fields of a Snowflake-style id into a single `i64`.
///
/// Callers are expected to have already validated that each field fits in its
/// bit width; this function masks defensively but does not return an error.
pub const fn pack(timestamp: i64, datacenter: i64, worker: i64, sequence: i64) -> i64 {
    ((timestamp & MAX_TIMESTAMP) << TIMESTAMP_SHIFT)
        | ((datacenter & MAX_DATACENTER_ID) << DATACENTER_SHIFT)
        | ((worker & MAX_WORKER_ID) << WORKER_SHIFT)
        | (sequence & MAX_SEQUENCE)
}

/// The four decoded fields of a packed id, as returned by [`unpack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub timestamp: i64,
    pub datacenter: i64,
    pub worker: i64,
    pub sequence: i64,
}

/// Decodes a packed id back into its four fields. Used by tests and
/// diagnostics; the hot path only ever calls [`pack`].
pub const fn unpack(id: i64) -> Fields {
    Fields {
        timestamp: (id >> TIMESTAMP_SHIFT) & MAX_TIMESTAMP,
        datacenter: (id >> DATACENTER_SHIFT) & MAX_DATACENTER_ID,
        worker: (id >> WORKER_SHIFT) & MAX_WORKER_ID,
        sequence: id & MAX_SEQUENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let id = pack(12345, 2, 200, 999);
        let fields = unpack(id);
        assert_eq!(fields.timestamp, 12345);
        assert_eq!(fields.datacenter, 2);
        assert_eq!(fields.worker, 200);
        assert_eq!(fields.sequence, 999);
        assert!(id > 0);
    }

    #[test]
    fn pack_masks_oversized_fields() {
        // A datacenter value wider than 2 bits must not bleed into the
        // timestamp field.
        let id = pack(0, 0b110, 0, 0);
        let fields = unpack(id);
        assert_eq!(fields.datacenter, 0b10);
        assert_eq!(fields.timestamp, 0);
    }

    #[test]
    fn max_timestamp_fits_in_63_bits() {
        let id = pack(MAX_TIMESTAMP, MAX_DATACENTER_ID, MAX_WORKER_ID, MAX_SEQUENCE);
        assert!(id > 0, "sign bit must never be set");
    }
}
