//! Rules engine adapter.
//!
//! Chess legality, move generation and terminal detection come from
//! `shakmaty`. This module narrows it to what the game session needs:
//! FEN import/export, the legal move list in both SAN and coordinate form,
//! move application from either input shape, and the terminal predicates.
//! Threefold repetition needs the game's past positions, which `shakmaty`
//! does not keep, so the board counts repetition keys itself.

use shakmaty::{
    fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, EnPassantMode, Move, Position,
};
use shared::{Color, MoveInput, PromotionPiece};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// One legal move, described every way a caller may refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    /// Standard algebraic notation without check suffix (`Nf3`).
    pub san: String,
    /// SAN with `+` or `#` appended when the move checks or mates.
    pub san_plus: String,
    /// Coordinate notation (`g1f3`, `e7e8q`, castling as `e1g1`).
    pub uci: String,
    pub from: String,
    pub to: String,
    pub is_capture: bool,
    pub is_check: bool,
    pub is_castle: bool,
}

impl LegalMove {
    /// True if `token` names this move in SAN, SAN with suffix, or coordinates.
    pub fn matches(&self, token: &str) -> bool {
        token == self.san_plus || token == self.san || token == self.uci
    }
}

/// Result of a successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub san: String,
    pub uci: String,
    pub mover: Color,
    pub is_capture: bool,
    pub is_check: bool,
    pub is_castle: bool,
}

#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    repetitions: HashMap<String, u32>,
}

impl Board {
    pub fn new() -> Self {
        Self::with_position(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        Ok(Self::with_position(position))
    }

    fn with_position(position: Chess) -> Self {
        let mut board = Self {
            position,
            repetitions: HashMap::new(),
        };
        board.record_repetition();
        board
    }

    pub fn to_fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Color {
        to_color(self.position.turn())
    }

    pub fn legal_moves(&self) -> Vec<LegalMove> {
        self.position
            .legal_moves()
            .iter()
            .map(|m| self.describe(m))
            .collect()
    }

    /// Legal moves starting on `square` (e.g. `"e2"`).
    pub fn legal_moves_from(&self, square: &str) -> Vec<LegalMove> {
        self.legal_moves()
            .into_iter()
            .filter(|m| m.from == square)
            .collect()
    }

    /// Applies a move given as coordinates or notation.
    ///
    /// The position is only replaced when the move is legal; on error the
    /// board is untouched.
    pub fn play(&mut self, input: &MoveInput) -> Result<AppliedMove, RulesError> {
        let m = self.find_move(input)?;
        let described = self.describe(&m);
        let mover = self.turn();

        self.position = self
            .position
            .clone()
            .play(&m)
            .map_err(|_| RulesError::IllegalMove(input.to_string()))?;
        self.record_repetition();

        Ok(AppliedMove {
            san: described.san_plus,
            uci: described.uci,
            mover,
            is_capture: described.is_capture,
            is_check: described.is_check,
            is_castle: described.is_castle,
        })
    }

    pub fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    pub fn is_insufficient_material(&self) -> bool {
        self.position.is_insufficient_material()
    }

    pub fn is_fifty_move_draw(&self) -> bool {
        self.position.halfmoves() >= 100
    }

    pub fn is_threefold_repetition(&self) -> bool {
        self.repetitions
            .get(&self.repetition_key())
            .is_some_and(|count| *count >= 3)
    }

    pub fn is_draw(&self) -> bool {
        self.is_fifty_move_draw()
            || self.is_stalemate()
            || self.is_insufficient_material()
            || self.is_threefold_repetition()
    }

    pub fn is_game_over(&self) -> bool {
        self.is_checkmate() || self.is_draw()
    }

    fn find_move(&self, input: &MoveInput) -> Result<Move, RulesError> {
        let wanted = normalize(input)?;
        let legals = self.position.legal_moves();

        let exact = legals.iter().find(|m| {
            let described = self.describe(m);
            match &wanted {
                Wanted::Coordinates(uci) => described.uci == *uci,
                Wanted::Notation(token) => described.matches(token),
            }
        });
        if let Some(m) = exact {
            return Ok(m.clone());
        }

        // A coordinate move onto the last rank without a piece promotes to a queen.
        if let Wanted::Coordinates(uci) = &wanted {
            if uci.len() == 4 {
                let queen = format!("{}{}", uci, PromotionPiece::Queen.uci_char());
                if let Some(m) = legals.iter().find(|m| self.describe(m).uci == queen) {
                    return Ok(m.clone());
                }
            }
        }

        Err(RulesError::IllegalMove(input.to_string()))
    }

    fn describe(&self, m: &Move) -> LegalMove {
        let san = San::from_move(&self.position, m).to_string();
        let uci = UciMove::from_move(m, CastlingMode::Standard).to_string();

        let mut after = self.position.clone();
        after.play_unchecked(m);
        let is_check = after.is_check();
        let suffix = if after.is_checkmate() {
            "#"
        } else if is_check {
            "+"
        } else {
            ""
        };

        LegalMove {
            san_plus: format!("{san}{suffix}"),
            san,
            from: uci.get(0..2).unwrap_or_default().to_string(),
            to: uci.get(2..4).unwrap_or_default().to_string(),
            uci,
            is_capture: m.is_capture(),
            is_check,
            is_castle: m.is_castle(),
        }
    }

    /// Placement, side to move, castling rights and en passant square.
    fn repetition_key(&self) -> String {
        self.to_fen()
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn record_repetition(&mut self) {
        *self.repetitions.entry(self.repetition_key()).or_insert(0) += 1;
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

enum Wanted {
    Coordinates(String),
    Notation(String),
}

fn normalize(input: &MoveInput) -> Result<Wanted, RulesError> {
    match input {
        MoveInput::Coordinates {
            from,
            to,
            promotion,
        } => {
            let from = parse_square(from)?;
            let to = parse_square(to)?;
            let mut uci = format!("{from}{to}");
            if let Some(piece) = promotion {
                uci.push(piece.uci_char());
            }
            Ok(Wanted::Coordinates(uci))
        }
        MoveInput::Notation(text) => Ok(Wanted::Notation(text.trim().to_string())),
    }
}

fn parse_square(text: &str) -> Result<String, RulesError> {
    let square = text.trim().to_ascii_lowercase();
    let bytes = square.as_bytes();
    if bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && (b'1'..=b'8').contains(&bytes[1])
    {
        Ok(square)
    } else {
        Err(RulesError::InvalidSquare(text.to_string()))
    }
}

fn to_color(color: shakmaty::Color) -> Color {
    match color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}
