use super::fen::Side;

/// Piece values used to break stalemates and draws
pub fn piece_value(piece: char) -> u32 {
    match piece.to_ascii_lowercase() {
        'p' => 1,
        'n' | 'b' => 3,
        'r' => 5,
        'q' => 9,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialCount {
    pub white: u32,
    pub black: u32,
}

impl MaterialCount {
    pub fn from_placement(placement: &str) -> Self {
        placement
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .fold(MaterialCount::default(), |mut count, c| {
                if c.is_ascii_uppercase() {
                    count.white += piece_value(c);
                } else {
                    count.black += piece_value(c);
                }
                count
            })
    }

    /// Side with more material, or `None` on an exact tie.
    pub fn leader(&self) -> Option<Side> {
        match self.white.cmp(&self.black) {
            std::cmp::Ordering::Greater => Some(Side::White),
            std::cmp::Ordering::Less => Some(Side::Black),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queen_and_pawn_beat_rook_and_bishop() {
        // White: K, Q, P = 10. Black: k, r, b = 8.
        let count = MaterialCount::from_placement("4k3/8/2rb4/8/8/3QP3/8/4K3");
        assert_eq!(count, MaterialCount { white: 10, black: 8 });
        assert_eq!(count.leader(), Some(Side::White));
    }

    #[test]
    fn equal_material_is_a_tie() {
        let count = MaterialCount::from_placement("4k3/4n3/8/8/8/8/4B3/4K3");
        assert_eq!(count.leader(), None);
    }

    #[test]
    fn kings_are_worthless() {
        assert_eq!(piece_value('K'), 0);
        assert_eq!(piece_value('k'), 0);
    }
}
