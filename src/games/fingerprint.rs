//! Content fingerprint of a game payload
//!
//! Clients derive a record's `createdId` from the fingerprint of the board
//! they created. Comparing the fingerprints of the stored and the incoming
//! payload against that id tells which side moved the record past its
//! creation point. The digest is a heuristic discriminator, not a
//! cryptographic hash: it must only be deterministic and identical to the
//! one clients compute.

use super::types::BaseGameInfo;

const SEPARATOR: &str = "_";

/// Deterministic digest of the gameplay-relevant fields of `info`
///
/// Format: `sum(matrix)_seconds_sqrt(cells)_filledCells_sum(newItems)_stackLen`.
pub fn fingerprint(info: &BaseGameInfo) -> String {
    let current = info.current();
    let side = (current.matrix.len() as f64).sqrt();

    [
        current.matrix_sum().to_string(),
        info.total_played_seconds().to_string(),
        side.to_string(),
        current.filled_cells().to_string(),
        current.new_items_sum().to_string(),
        info.stack().len().to_string(),
    ]
    .join(SEPARATOR)
}

impl BaseGameInfo {
    /// See [`fingerprint`]
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{GameState, EMPTY_CELL};

    fn board(count: u32, tiles: &[(usize, i32)], new_items: Vec<i32>) -> GameState {
        let mut matrix = vec![EMPTY_CELL; (count * count) as usize];
        for &(index, value) in tiles {
            matrix[index] = value;
        }
        GameState::new(matrix, new_items)
    }

    #[test]
    fn test_known_digest() {
        let info = BaseGameInfo::new(
            42,
            9,
            board(9, &[(0, 2), (10, 4)], vec![1, 3]),
            vec![board(9, &[], vec![])],
        )
        .unwrap();

        // 79 empty cells at -1 plus tiles 2 and 4
        assert_eq!(fingerprint(&info), "-73_42_9_2_4_1");
    }

    #[test]
    fn test_side_prints_without_fraction() {
        let info = BaseGameInfo::new(0, 16, board(16, &[], vec![]), vec![]).unwrap();
        assert_eq!(info.fingerprint(), "-256_0_16_0_0_0");
    }

    #[test]
    fn test_equal_payloads_share_digest() {
        let a = BaseGameInfo::new(7, 9, board(9, &[(3, 8)], vec![2]), vec![]).unwrap();
        let b = BaseGameInfo::new(7, 9, board(9, &[(3, 8)], vec![2]), vec![]).unwrap();

        assert_eq!(a, b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_history_changes_digest() {
        let current = board(9, &[(3, 8)], vec![2]);
        let fresh = BaseGameInfo::new(7, 9, current.clone(), vec![]).unwrap();
        let played = BaseGameInfo::new(7, 9, current.clone(), vec![current]).unwrap();

        assert_ne!(fingerprint(&fresh), fingerprint(&played));
    }
}
