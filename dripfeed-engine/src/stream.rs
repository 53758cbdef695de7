use fastrand::Rng;

/// Salt that separates pacing jitter draws from copy variation draws.
pub(crate) const JITTER_SALT: u64 = 0x6a69_7474_6572_5f31;

/// Seeded generator for one `(seed, sequence_index)` pair.
///
/// The pair is folded through a splitmix64 finaliser so neighbouring indices
/// start from unrelated states.
pub(crate) fn seeded_stream(seed: u64, sequence_index: u64) -> Rng {
    Rng::with_seed(mix(seed, sequence_index))
}

fn mix(seed: u64, sequence_index: u64) -> u64 {
    let mut z = seed ^ sequence_index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
