/// Sequence window arithmetic
///
/// Sequence numbers live in a small wrapping space and must be compared by
/// modular distance. Every window-membership test in the crate routes
/// through `in_window`; raw `<`/`>` comparisons on sequence numbers are
/// incorrect once the space wraps.

/// Modular distance `(seq - start) mod modulus`
pub fn distance(seq: i32, start: i32, modulus: i32) -> i32 {
    (seq - start).rem_euclid(modulus)
}

/// True iff `seq` lies inside the window of `size` slots starting at `start`
pub fn in_window(seq: i32, start: i32, size: usize, modulus: i32) -> bool {
    distance(seq, start, modulus) < size as i32
}

/// The sequence number following `seq`
pub fn advance(seq: i32, modulus: i32) -> i32 {
    (seq + 1).rem_euclid(modulus)
}

/// The sequence number preceding `seq`
pub fn previous(seq: i32, modulus: i32) -> i32 {
    (seq - 1).rem_euclid(modulus)
}
