//! Fixed ASCII pieces. Every piece is `PIECE_ROWS` rows tall and the rows of a
//! piece share one width so pieces can be joined column-wise.

pub const PIECE_ROWS: usize = 5;

pub const ENGINE: [&str; PIECE_ROWS] = [
    "    o o o o o o o . . .   ",
    "   o      _____           ",
    " .][__n_n_|DD[  ====_____ ",
    ">(________|__|_[_________]",
    "_/oo OOOOO oo`  ooo   ooo ",
];

pub const CABOOSE: [&str; PIECE_ROWS] = [
    " _____=======_||____",
    " |     _____       |",
    " |    |_____|      |",
    "_|_________________|",
    "'o!o!o        o!o!o'",
];

pub const MIN_CAR_INTERIOR: usize = 17;

/// Column where a car's interior begins, relative to the car's first column.
pub const CAR_INTERIOR_OFFSET: usize = 2;
/// First interior row of a car; the content area spans two rows.
pub const CAR_CONTENT_ROW: usize = 1;
pub const CAR_CONTENT_ROWS: usize = 2;

const CAR_ROOF: &str = "_____=======_||";

/// Builds a car body whose interior is `interior` columns wide.
pub fn car(interior: usize) -> [String; PIECE_ROWS] {
    let interior = interior.max(MIN_CAR_INTERIOR);
    let width = interior + 3;
    let rows = [
        format!("{}{}", CAR_ROOF, "_".repeat(interior + 2 - CAR_ROOF.len())),
        format!(" |{}|", " ".repeat(interior)),
        format!(" |{}|", " ".repeat(interior)),
        format!("_|{}|", "_".repeat(interior)),
        format!(" 'o!o{}o!o`", " ".repeat(interior - 8)),
    ];
    rows.map(|row| format!("{:<width$}", row, width = width))
}
