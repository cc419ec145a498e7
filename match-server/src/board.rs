//! Contains the board of one player with the chain reaction removal and the gravity collapse.
//! The board knows nothing of matches or networking.

use protocol::{BOARD_HEIGHT, BOARD_WIDTH, Cell, Row};

/// Encodes a position on the board. Origin is the upper left cell, y grows toward the floor.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct CellPosition {
    /// Horizontal position from left to right.
    pub x: i32,
    /// Vertical position from the ceiling to the floor.
    pub y: i32,
}

impl CellPosition {
    /// Checks if we are a valid position, which means we are on the board in the required range.
    pub fn is_valid(&self) -> bool {
        !(self.x < 0 || self.y < 0 || self.x >= BOARD_WIDTH as i32 || self.y >= BOARD_HEIGHT as i32)
    }

    fn shifted(self, direction: &ScanDirection) -> CellPosition {
        CellPosition {
            x: self.x + direction.x_dir,
            y: self.y + direction.y_dir,
        }
    }
}

/// Indicates a direction in which we want to walk from a local position.
struct ScanDirection {
    x_dir: i32,
    y_dir: i32,
}

use ScanDirection as D;
/// The 8 neighbours a bomb clears: N, NE, E, SE, S, SW, W, NW.
#[rustfmt::skip]
static SCAN_DIRECTIONS: [ScanDirection; 8] = [
    D { x_dir: 0, y_dir: -1 },
    D { x_dir: 1, y_dir: -1 },
    D { x_dir: 1, y_dir: 0 },
    D { x_dir: 1, y_dir: 1 },
    D { x_dir: 0, y_dir: 1 },
    D { x_dir: -1, y_dir: 1 },
    D { x_dir: -1, y_dir: 0 },
    D { x_dir: -1, y_dir: -1 },
];

/// The grid of one player. Dimensions are [`BOARD_HEIGHT`] × [`BOARD_WIDTH`] and never change.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Board {
    /// Rows from the ceiling (index 0) to the floor.
    rows: [Row; BOARD_HEIGHT],
}

impl Board {
    /// Creates a board where every cell is void.
    pub fn new() -> Self {
        Board::default()
    }

    /// Builds a board from its rows, ceiling first.
    #[cfg(test)]
    pub fn from_rows(rows: [Row; BOARD_HEIGHT]) -> Self {
        Board { rows }
    }

    /// The rows from the ceiling to the floor.
    #[cfg(test)]
    pub fn rows(&self) -> &[Row; BOARD_HEIGHT] {
        &self.rows
    }

    /// Gets the cell at the position, none if the position is off the board.
    pub fn cell(&self, position: CellPosition) -> Option<Cell> {
        position
            .is_valid()
            .then(|| self.rows[position.y as usize][position.x as usize])
    }

    fn set_cell(&mut self, position: CellPosition, cell: Cell) {
        self.rows[position.y as usize][position.x as usize] = cell;
    }

    /// Counts the void cells in the column. The column has to be on the board.
    pub fn empty_count(&self, x: usize) -> u32 {
        self.rows.iter().filter(|row| row[x].is_void()).count() as u32
    }

    /// Removes the cell at the position and, if it is a bomb, everything the blast reaches.
    /// Returns the number of removed cells, which is 0 if the position is off the board or void.
    ///
    /// Works with an explicit stack, so the worst case chain is bounded by the board size.
    pub fn remove_chain(&mut self, start: CellPosition) -> u32 {
        let mut pending = vec![start];
        let mut removed = 0;
        while let Some(position) = pending.pop() {
            let Some(cell) = self.cell(position) else {
                continue;
            };
            if cell.is_void() {
                continue;
            }
            self.set_cell(position, Cell::Void);
            removed += 1;
            if cell == Cell::Bomb {
                pending.extend(SCAN_DIRECTIONS.iter().map(|dir| position.shifted(dir)));
            }
        }
        removed
    }

    /// Lets every column fall to the floor, void cells end up on top.
    pub fn collapse(&mut self) {
        for x in 0..BOARD_WIDTH {
            let mut target = BOARD_HEIGHT;
            for y in (0..BOARD_HEIGHT).rev() {
                let cell = self.rows[y][x];
                if !cell.is_void() {
                    target -= 1;
                    self.rows[y][x] = Cell::Void;
                    self.rows[target][x] = cell;
                }
            }
        }
    }

    /// Pushes the rows in at the floor. Everything moves up by one row per new row and
    /// whatever leaves over the ceiling is lost.
    pub fn push_rows(&mut self, new_rows: &[Row]) {
        for row in new_rows {
            self.rows.rotate_left(1);
            self.rows[BOARD_HEIGHT - 1] = *row;
        }
    }

    /// A board overflows once anything has reached the ceiling row.
    pub fn overflows(&self) -> bool {
        self.rows[0].iter().any(|cell| !cell.is_void())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(x: i32, y: i32) -> CellPosition {
        CellPosition { x, y }
    }

    fn board_with(cells: &[(i32, i32, Cell)]) -> Board {
        let mut board = Board::new();
        for &(x, y, cell) in cells {
            board.set_cell(at(x, y), cell);
        }
        board
    }

    fn arbitrary_board() -> impl Strategy<Value = Board> {
        let cell = prop_oneof![Just(Cell::Void), Just(Cell::Block), Just(Cell::Bomb)];
        proptest::collection::vec(cell, BOARD_WIDTH * BOARD_HEIGHT).prop_map(|cells| {
            let mut rows = [[Cell::Void; BOARD_WIDTH]; BOARD_HEIGHT];
            for (index, cell) in cells.into_iter().enumerate() {
                rows[index / BOARD_WIDTH][index % BOARD_WIDTH] = cell;
            }
            Board::from_rows(rows)
        })
    }

    #[test]
    fn removing_void_or_off_board_scores_nothing() {
        let mut board = board_with(&[(0, 8, Cell::Block)]);
        let before = board.clone();
        assert_eq!(board.remove_chain(at(1, 8)), 0);
        assert_eq!(board.remove_chain(at(-1, 0)), 0);
        assert_eq!(board.remove_chain(at(0, 9)), 0);
        assert_eq!(board, before);
    }

    #[test]
    fn isolated_block_scores_one() {
        let mut board = board_with(&[(3, 8, Cell::Block), (5, 8, Cell::Block)]);
        assert_eq!(board.remove_chain(at(3, 8)), 1);
        assert_eq!(board.cell(at(3, 8)), Some(Cell::Void));
        assert_eq!(board.cell(at(5, 8)), Some(Cell::Block));
    }

    #[test]
    fn bomb_clears_all_eight_neighbours() {
        let mut cells = vec![(4, 4, Cell::Bomb)];
        for dir in SCAN_DIRECTIONS.iter() {
            cells.push((4 + dir.x_dir, 4 + dir.y_dir, Cell::Block));
        }
        cells.push((6, 4, Cell::Block));
        let mut board = board_with(&cells);
        assert_eq!(board.remove_chain(at(4, 4)), 9);
        assert_eq!(board.cell(at(6, 4)), Some(Cell::Block));
    }

    #[test]
    fn bombs_chain_into_bombs() {
        let mut board = board_with(&[
            (0, 8, Cell::Bomb),
            (1, 7, Cell::Bomb),
            (2, 6, Cell::Bomb),
            (3, 5, Cell::Block),
            (4, 5, Cell::Block),
        ]);
        assert_eq!(board.remove_chain(at(0, 8)), 4);
        assert_eq!(board.cell(at(4, 5)), Some(Cell::Block));
    }

    #[test]
    fn full_board_of_bombs_clears_completely() {
        let mut board = Board::from_rows([[Cell::Bomb; BOARD_WIDTH]; BOARD_HEIGHT]);
        assert_eq!(
            board.remove_chain(at(0, 0)),
            (BOARD_WIDTH * BOARD_HEIGHT) as u32
        );
        assert_eq!(board, Board::new());
    }

    #[test]
    fn collapse_packs_columns_to_the_floor() {
        let mut board = board_with(&[(2, 0, Cell::Bomb), (2, 4, Cell::Block), (7, 8, Cell::Block)]);
        board.collapse();
        assert_eq!(
            board,
            board_with(&[(2, 7, Cell::Bomb), (2, 8, Cell::Block), (7, 8, Cell::Block)])
        );
    }

    #[test]
    fn pushed_rows_enter_at_the_floor() {
        let mut board = board_with(&[(0, 8, Cell::Bomb)]);
        let row = [Cell::Block; BOARD_WIDTH];
        board.push_rows(&[row]);
        assert_eq!(board.rows()[8], row);
        assert_eq!(board.cell(at(0, 7)), Some(Cell::Bomb));
        assert!(!board.overflows());
    }

    #[test]
    fn stack_reaching_the_ceiling_overflows() {
        let mut board = Board::new();
        let row = [Cell::Block; BOARD_WIDTH];
        board.push_rows(&[row; BOARD_HEIGHT - 1]);
        assert!(!board.overflows());
        board.push_rows(&[row]);
        assert!(board.overflows());
    }

    #[test]
    fn empty_count_counts_one_column() {
        let board = board_with(&[(1, 8, Cell::Block), (1, 7, Cell::Bomb), (2, 8, Cell::Block)]);
        assert_eq!(board.empty_count(1), 7);
        assert_eq!(board.empty_count(0), 9);
    }

    proptest! {
        #[test]
        fn collapse_is_idempotent(mut board in arbitrary_board()) {
            board.collapse();
            let once = board.clone();
            board.collapse();
            prop_assert_eq!(board, once);
        }

        #[test]
        fn collapse_keeps_column_contents(board in arbitrary_board()) {
            let mut collapsed = board.clone();
            collapsed.collapse();
            for x in 0..BOARD_WIDTH {
                prop_assert_eq!(board.empty_count(x), collapsed.empty_count(x));
            }
        }

        #[test]
        fn bomb_scores_at_least_its_neighbourhood(
            board in arbitrary_board(),
            x in 0..BOARD_WIDTH as i32,
            y in 0..BOARD_HEIGHT as i32,
        ) {
            let mut board = board;
            board.set_cell(at(x, y), Cell::Bomb);
            let neighbours = SCAN_DIRECTIONS
                .iter()
                .filter_map(|dir| board.cell(at(x, y).shifted(dir)))
                .filter(|cell| !cell.is_void())
                .count() as u32;
            let voids_before: u32 = (0..BOARD_WIDTH).map(|column| board.empty_count(column)).sum();
            let score = board.remove_chain(at(x, y));
            let voids_after: u32 = (0..BOARD_WIDTH).map(|column| board.empty_count(column)).sum();
            prop_assert!(score >= 1 + neighbours);
            prop_assert_eq!(voids_after - voids_before, score);
        }
    }
}
