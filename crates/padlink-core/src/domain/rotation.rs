//! Quarter-turn rotation transform between logical and physical coordinates.
//!
//! A surface has a fixed physical extent of `cols × rows`, but the
//! application may address it in any of four orientations.  The transform
//! happens entirely on this side of the wire: the remote client always
//! receives physical indices and reports key presses in physical space, so it
//! never needs rotation awareness.
//!
//! All coordinates here are 1-based, matching the application-facing device
//! API.  For every rotation the logical→physical mapping is a bijection and
//! [`Rotation::to_logical`] is its exact algebraic inverse.

/// One of the four supported surface orientations, in quarter turns
/// clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No rotation; logical and physical coordinates coincide.
    #[default]
    R0,
    /// One quarter turn clockwise.  Logical extent is `rows × cols`.
    R90,
    /// Half turn.
    R180,
    /// Three quarter turns clockwise.  Logical extent is `rows × cols`.
    R270,
}

impl Rotation {
    /// Parses a wire/API rotation index.  Values outside 0..=3 are rejected.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Rotation::R0),
            1 => Some(Rotation::R90),
            2 => Some(Rotation::R180),
            3 => Some(Rotation::R270),
            _ => None,
        }
    }

    /// Returns the rotation as its 0..=3 index.
    pub fn index(self) -> u8 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 1,
            Rotation::R180 => 2,
            Rotation::R270 => 3,
        }
    }

    /// Returns the logical extent presented to the application for a physical
    /// extent of `cols × rows`: columns and rows swap on odd quarter turns.
    pub fn logical_extent(self, cols: u16, rows: u16) -> (u16, u16) {
        match self {
            Rotation::R0 | Rotation::R180 => (cols, rows),
            Rotation::R90 | Rotation::R270 => (rows, cols),
        }
    }

    /// Maps a 1-based logical coordinate to its 1-based physical coordinate
    /// on a `cols × rows` surface.
    ///
    /// The caller is responsible for bounds-checking against the logical
    /// extent first; the arithmetic itself assumes an in-range input.
    pub fn to_physical(self, cols: u16, rows: u16, x: u16, y: u16) -> (u16, u16) {
        match self {
            Rotation::R0 => (x, y),
            Rotation::R90 => (y, rows + 1 - x),
            Rotation::R180 => (cols + 1 - x, rows + 1 - y),
            Rotation::R270 => (cols + 1 - y, x),
        }
    }

    /// Maps a 1-based physical coordinate back to the 1-based logical
    /// coordinate the application addressed: the inverse of
    /// [`to_physical`](Self::to_physical).
    pub fn to_logical(self, cols: u16, rows: u16, px: u16, py: u16) -> (u16, u16) {
        match self {
            Rotation::R0 => (px, py),
            Rotation::R90 => (rows + 1 - py, px),
            Rotation::R180 => (cols + 1 - px, rows + 1 - py),
            Rotation::R270 => (py, cols + 1 - px),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
