//! Terminal command parsing

use shared::{MoveInput, PromotionPiece};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(MoveInput),
    Reset,
    Board,
    Help,
    Quit,
}

pub const HELP: &str =
    "Commands: e2e4 / e7e8q (coordinates), Nf3 / O-O (notation), board, reset, help, quit";

/// Parses one line of user input. Blank lines give `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match line.to_ascii_lowercase().as_str() {
        "reset" => Command::Reset,
        "board" | "b" => Command::Board,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Move(parse_move(line)),
    };
    Some(command)
}

/// `e2e4` style input becomes coordinates, anything else is sent as notation.
pub fn parse_move(text: &str) -> MoveInput {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();

    if (bytes.len() == 4 || bytes.len() == 5)
        && is_square(&bytes[0..2])
        && is_square(&bytes[2..4])
    {
        let promotion = match bytes.get(4) {
            None => None,
            Some(b'q') => Some(PromotionPiece::Queen),
            Some(b'r') => Some(PromotionPiece::Rook),
            Some(b'b') => Some(PromotionPiece::Bishop),
            Some(b'n') => Some(PromotionPiece::Knight),
            Some(_) => return MoveInput::Notation(text.to_string()),
        };
        return MoveInput::Coordinates {
            from: lower[0..2].to_string(),
            to: lower[2..4].to_string(),
            promotion,
        };
    }

    MoveInput::Notation(text.to_string())
}

fn is_square(bytes: &[u8]) -> bool {
    matches!(bytes, [file, rank] if (b'a'..=b'h').contains(file) && (b'1'..=b'8').contains(rank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates() {
        assert_eq!(
            parse_command("e2e4"),
            Some(Command::Move(MoveInput::coordinates("e2", "e4")))
        );
        assert_eq!(
            parse_command(" E7E8Q "),
            Some(Command::Move(MoveInput::Coordinates {
                from: "e7".to_string(),
                to: "e8".to_string(),
                promotion: Some(PromotionPiece::Queen),
            }))
        );
    }

    #[test]
    fn test_notation_passthrough() {
        assert_eq!(
            parse_command("Nf3"),
            Some(Command::Move(MoveInput::Notation("Nf3".to_string())))
        );
        assert_eq!(
            parse_command("O-O"),
            Some(Command::Move(MoveInput::Notation("O-O".to_string())))
        );
        // Not a promotion letter, so it is left for the server to judge.
        assert_eq!(
            parse_move("e7e8k"),
            MoveInput::Notation("e7e8k".to_string())
        );
        assert_eq!(parse_move("i2i4"), MoveInput::Notation("i2i4".to_string()));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_command("reset"), Some(Command::Reset));
        assert_eq!(parse_command("QUIT"), Some(Command::Quit));
        assert_eq!(parse_command("board"), Some(Command::Board));
        assert_eq!(parse_command("?"), Some(Command::Help));
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_bishop_move_not_taken_as_keyword() {
        assert_eq!(
            parse_command("Bb5"),
            Some(Command::Move(MoveInput::Notation("Bb5".to_string())))
        );
    }
}
