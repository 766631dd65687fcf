//! Location-code alphabet and quadrant mapping.
//!
//! Geohash codes use a 32-symbol alphabet. The quadtree splits it into four
//! contiguous groups of eight, one per child slot:
//!
//! ```text
//! slot 0: 0 1 2 3 4 5 6 7
//! slot 1: 8 9 b c d e f g
//! slot 2: h j k m n p q r
//! slot 3: s t u v w x y z
//! ```

/// The geohash base-32 alphabet, in quadrant order.
pub const ALPHABET: &str = "0123456789bcdefghjkmnpqrstuvwxyz";

/// Number of children per node.
pub const BRANCHING: usize = 4;

const GROUP_SIZE: usize = 8;

/// Map one location-code character to its child slot.
///
/// Returns `None` for characters outside the alphabet (including `a`, `i`,
/// `l` and `o`, which geohash never uses). Upper-case input is accepted.
pub fn quadrant(c: char) -> Option<usize> {
    let c = c.to_ascii_lowercase();
    ALPHABET.find(c).map(|pos| pos / GROUP_SIZE)
}

/// The eight characters routed to `slot`.
pub fn group(slot: usize) -> &'static str {
    let start = slot * GROUP_SIZE;
    &ALPHABET[start..start + GROUP_SIZE]
}

/// Check that every character of `code` belongs to the alphabet.
pub fn is_valid(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| quadrant(c).is_some())
}

/// The child slots visited when descending from a node whose code has
/// length `from` down to the full `code`.
pub fn path(code: &str, from: usize) -> Option<Vec<usize>> {
    code.chars().skip(from).map(quadrant).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_partition_alphabet() {
        let joined: String = (0..BRANCHING).map(group).collect();
        assert_eq!(joined, ALPHABET);
        assert_eq!(group(1), "89bcdefg");
        assert_eq!(group(2), "hjkmnpqr");
    }

    #[test]
    fn test_quadrant_mapping() {
        assert_eq!(quadrant('0'), Some(0));
        assert_eq!(quadrant('7'), Some(0));
        assert_eq!(quadrant('8'), Some(1));
        assert_eq!(quadrant('g'), Some(1));
        assert_eq!(quadrant('h'), Some(2));
        assert_eq!(quadrant('r'), Some(2));
        assert_eq!(quadrant('s'), Some(3));
        assert_eq!(quadrant('Z'), Some(3));
        assert_eq!(quadrant('a'), None);
        assert_eq!(quadrant('o'), None);
        assert_eq!(quadrant('/'), None);
    }

    #[test]
    fn test_path() {
        assert_eq!(path("dpwhwtmpz0", 6), Some(vec![2, 2, 3, 0]));
        assert_eq!(path("dpwhwtbr2v", 6), Some(vec![1, 2, 0, 3]));
        assert_eq!(path("dpwhwtma", 6), None);
        assert!(is_valid("dpwhwt"));
        assert!(!is_valid("dpwhwl"));
        assert!(!is_valid(""));
    }
}
