//! The wire vocabulary shared by the match server and its clients.
//! Every frame is a JSON object tagged by `"type"`; cells travel as small integers.

use serde::{Deserialize, Serialize};

/// The buffer sizes for the channels for intra process communication.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// The number of columns of a board.
pub const BOARD_WIDTH: usize = 8;
/// The number of rows of a board. Row 0 is the ceiling.
pub const BOARD_HEIGHT: usize = 9;

/// The state of a single cell on the board.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cell {
    /// There is nothing in the cell.
    #[default]
    Void,
    /// A plain block, removing it has no side effect.
    Block,
    /// A bomb, removing it clears the eight surrounding cells as well.
    Bomb,
}

impl Cell {
    /// Checks if the cell holds anything.
    pub fn is_void(self) -> bool {
        self == Cell::Void
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> u8 {
        match cell {
            Cell::Void => 0,
            Cell::Block => 1,
            Cell::Bomb => 2,
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Void),
            1 => Ok(Cell::Block),
            2 => Ok(Cell::Bomb),
            other => Err(format!("Unknown cell state {other}.")),
        }
    }
}

/// One horizontal line of a board.
pub type Row = [Cell; BOARD_WIDTH];

/// Messages a client sends to the server.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Opens a room under the given name and waits for a guest.
    Create { name: String },
    /// Cancels the own room while nobody has joined.
    Delete,
    /// Joins a named room. The empty name asks for anonymous matchmaking.
    Join { name: String },
    /// Gives up the running match.
    Surrender,
    /// Removes the cell at (x, y). `empty_count` is the number of void cells the
    /// client sees in column x.
    Remove { x: i32, y: i32, empty_count: u32 },
}

/// Messages the server sends to a client.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The room was created. The name may be a display substitute.
    Create { name: String },
    /// Echo of an accepted move.
    Remove { x: i32, y: i32, empty_count: u32 },
    /// New rows entering the board at the floor, in order.
    Addition { board: Vec<Row> },
    /// The match begins.
    Start,
    /// The match is won.
    Win,
    /// The match is lost.
    Lose,
    /// The pending obstacle batches this side is allowed to see.
    Obstacle { count: Vec<u32> },
    /// A human readable notice.
    Message { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_uses_camel_case_empty_count() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"REMOVE","x":3,"y":-1,"emptyCount":4}"#).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::Remove {
                x: 3,
                y: -1,
                empty_count: 4
            }
        );
    }

    #[test]
    fn unit_variants_carry_only_the_tag() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"DELETE"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Delete);
        let encoded = serde_json::to_value(ServerMessage::Start).unwrap();
        assert_eq!(encoded, json!({"type": "START"}));
    }

    #[test]
    fn malformed_frames_do_not_parse() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"JOIN"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"DANCE"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"name":"R1"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn addition_rows_are_integer_arrays() {
        let mut row = [Cell::Block; BOARD_WIDTH];
        row[2] = Cell::Bomb;
        let encoded = serde_json::to_value(ServerMessage::Addition { board: vec![row] }).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "ADDITION", "board": [[1, 1, 2, 1, 1, 1, 1, 1]]})
        );
    }

    #[test]
    fn unknown_cell_values_are_rejected() {
        assert!(serde_json::from_str::<Cell>("3").is_err());
        assert_eq!(serde_json::from_str::<Cell>("0").unwrap(), Cell::Void);
    }

    #[test]
    fn obstacle_lists_pending_batches() {
        let encoded = serde_json::to_value(ServerMessage::Obstacle { count: vec![2, 1] }).unwrap();
        assert_eq!(encoded, json!({"type": "OBSTACLE", "count": [2, 1]}));
    }
}
