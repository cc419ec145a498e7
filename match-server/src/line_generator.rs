//! Produces the random rows that enter a board from the floor.

use protocol::{BOARD_WIDTH, Cell, Row};
use rand::Rng;

/// Generates a row of blocks with bombs at random columns. An obstacle row carries
/// exactly one bomb, a row following the player's own move carries two at distinct columns.
pub fn new_line<R: Rng>(rng: &mut R, is_obstacle: bool) -> Row {
    let mut row = [Cell::Block; BOARD_WIDTH];
    let first = rng.random_range(0..BOARD_WIDTH);
    row[first] = Cell::Bomb;
    if !is_obstacle {
        // Offset over the remaining columns, never hits the first one.
        let second = (first + 1 + rng.random_range(0..BOARD_WIDTH - 1)) % BOARD_WIDTH;
        row[second] = Cell::Bomb;
    }
    row
}
