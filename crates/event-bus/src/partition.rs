/// Maps a message key onto one of `partitions` partitions.
///
/// Uses 32-bit FNV-1a so the mapping is stable across processes and builds;
/// a key must keep landing on the same partition for its whole lifetime.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    if partitions <= 1 {
        return 0;
    }

    let hash = key.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    });
    hash % partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        let p = partition_for("ORD-20240101120000-42", 8);
        for _ in 0..10 {
            assert_eq!(partition_for("ORD-20240101120000-42", 8), p);
        }
    }

    #[test]
    fn single_partition_topics_always_map_to_zero() {
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }

    #[test]
    fn keys_spread_over_partitions() {
        let used: std::collections::HashSet<u32> = (0..100)
            .map(|i| partition_for(&format!("ORD-{i}"), 4))
            .collect();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn known_vector() {
        // FNV-1a("a") = 0xe40c292c
        assert_eq!(partition_for("a", u32::MAX), 0xe40c_292c % u32::MAX);
    }
}
