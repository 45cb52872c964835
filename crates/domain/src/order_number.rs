//! Human-facing order number generation.

use rand::Rng;

/// Generates a pseudo-random order number: two dash-joined digit groups,
/// e.g. `483920-517`.
///
/// The space is small enough that collisions happen in practice; callers
/// must treat a uniqueness-constraint violation on insert as a signal to
/// regenerate and retry, not as a fatal error.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let part1: u32 = rng.gen_range(100_000..1_000_000);
    let part2: u32 = rng.gen_range(100..1_000);
    format!("{part1}-{part2}")
}
