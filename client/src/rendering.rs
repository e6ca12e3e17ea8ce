//! Text rendering of the board and game status

use shared::{Color, GameSnapshot};

/// Draws the piece placement field of a FEN string as an 8x8 grid.
///
/// White pieces are upper case. The board is flipped when viewed as black.
/// Returns `None` for a malformed placement field.
pub fn render_board(fen: &str, perspective: Color) -> Option<String> {
    let placement = fen.split_whitespace().next()?;
    let mut rows: Vec<Vec<char>> = Vec::with_capacity(8);

    for rank in placement.split('/') {
        let mut row = Vec::with_capacity(8);
        for c in rank.chars() {
            match c.to_digit(10) {
                Some(n) => row.extend(std::iter::repeat('.').take(n as usize)),
                None => row.push(c),
            }
        }
        if row.len() != 8 {
            return None;
        }
        rows.push(row);
    }
    if rows.len() != 8 {
        return None;
    }

    let mut ranks: Vec<usize> = (0..8).collect();
    let mut files = "a b c d e f g h".to_string();
    if perspective == Color::Black {
        ranks.reverse();
        for row in &mut rows {
            row.reverse();
        }
        files = files.chars().rev().collect();
    }

    let mut out = String::new();
    for index in ranks {
        let label = 8 - index;
        let squares: Vec<String> = rows[index].iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("{} {}\n", label, squares.join(" ")));
    }
    out.push_str(&format!("  {}\n", files));
    Some(out)
}

pub fn render_status(snapshot: &GameSnapshot, seat: Option<Color>) -> String {
    if !snapshot.active {
        let result = snapshot
            .result
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return format!("Game over: {}", result);
    }

    match seat {
        Some(seat) if seat == snapshot.side_to_move => "Your move".to_string(),
        Some(_) => format!("Waiting for {}", snapshot.side_to_move),
        None => format!("{} to move", snapshot.side_to_move),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameResult, STARTING_FEN};

    fn snapshot(active: bool, result: Option<GameResult>) -> GameSnapshot {
        GameSnapshot {
            position: STARTING_FEN.to_string(),
            side_to_move: Color::White,
            move_history: vec![],
            active,
            result,
        }
    }

    #[test]
    fn test_start_position_from_white() {
        let board = render_board(STARTING_FEN, Color::White).unwrap();
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], "8 r n b q k b n r");
        assert_eq!(lines[3], "5 . . . . . . . .");
        assert_eq!(lines[7], "1 R N B Q K B N R");
        assert_eq!(lines[8], "  a b c d e f g h");
    }

    #[test]
    fn test_flipped_for_black() {
        let board = render_board(STARTING_FEN, Color::Black).unwrap();
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], "1 R N B K Q B N R");
        assert_eq!(lines[7], "8 r n b k q b n r");
        assert_eq!(lines[8], "  h g f e d c b a");
    }

    #[test]
    fn test_malformed_fen() {
        assert!(render_board("", Color::White).is_none());
        assert!(render_board("8/8/8 w - - 0 1", Color::White).is_none());
        assert!(render_board("9/8/8/8/8/8/8/8 w - - 0 1", Color::White).is_none());
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(render_status(&snapshot(true, None), Some(Color::White)), "Your move");
        assert_eq!(
            render_status(&snapshot(true, None), Some(Color::Black)),
            "Waiting for white"
        );
        assert_eq!(render_status(&snapshot(true, None), None), "white to move");
        assert!(render_status(&snapshot(false, Some(GameResult::Stalemate)), None)
            .starts_with("Game over: "));
    }
}
