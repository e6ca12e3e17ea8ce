use crate::rules::{AppliedMove, Board, LegalMove, RulesError};
use log::{info, warn};
use shared::{Color, ConnectionId, GameResult, GameSnapshot, MoveInput};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("game is already over")]
    GameOver,
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Which connection holds each playing seat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seats {
    white: Option<ConnectionId>,
    black: Option<ConnectionId>,
}

impl Seats {
    pub fn holder(&self, seat: Color) -> Option<ConnectionId> {
        match seat {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn seat_of(&self, id: ConnectionId) -> Option<Color> {
        if self.white == Some(id) {
            Some(Color::White)
        } else if self.black == Some(id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    fn assign(&mut self, id: ConnectionId) -> Option<Color> {
        if let Some(seat) = self.seat_of(id) {
            return Some(seat);
        }
        if self.white.is_none() {
            self.white = Some(id);
            Some(Color::White)
        } else if self.black.is_none() {
            self.black = Some(id);
            Some(Color::Black)
        } else {
            None
        }
    }

    fn reserve(&mut self, seat: Color, id: ConnectionId) {
        match seat {
            Color::White => self.white = Some(id),
            Color::Black => self.black = Some(id),
        }
    }

    fn release(&mut self, id: ConnectionId) -> Option<Color> {
        let seat = self.seat_of(id)?;
        match seat {
            Color::White => self.white = None,
            Color::Black => self.black = None,
        }
        Some(seat)
    }
}

/// Everything the AI needs for one turn. Built fresh each time.
#[derive(Debug, Clone)]
pub struct AiRequestContext {
    pub position: String,
    pub side_to_move: Color,
    pub move_history: Vec<String>,
    pub legal_moves: Vec<LegalMove>,
}

/// The single authoritative game session.
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    history: Vec<String>,
    active: bool,
    seats: Seats,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            history: Vec::new(),
            active: true,
            seats: Seats::default(),
        }
    }

    /// Starts a session from an arbitrary position, used by tests and benchmarks.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let board = Board::from_fen(fen)?;
        let active = !board.is_game_over();
        Ok(Self {
            board,
            history: Vec::new(),
            active,
            seats: Seats::default(),
        })
    }

    /// Applies `candidate` if legal. Illegal input leaves the session untouched.
    pub fn apply_move(&mut self, candidate: &MoveInput) -> bool {
        match self.try_apply_move(candidate) {
            Ok(_) => true,
            Err(e) => {
                warn!("Rejected move {}: {}", candidate, e);
                false
            }
        }
    }

    pub fn try_apply_move(&mut self, candidate: &MoveInput) -> Result<AppliedMove, MoveError> {
        if !self.active {
            return Err(MoveError::GameOver);
        }

        let applied = self.board.play(candidate)?;
        self.history.push(applied.san.clone());
        self.active = !self.board.is_game_over();

        info!(
            "{} played {} ({}), {} moves so far",
            applied.mover,
            applied.san,
            applied.uci,
            self.history.len()
        );
        if !self.active {
            info!("Game over: {}", self.result().unwrap_or(GameResult::Unknown));
        }

        Ok(applied)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            position: self.board.to_fen(),
            side_to_move: self.board.turn(),
            move_history: self.history.clone(),
            active: self.active,
            result: self.result(),
        }
    }

    /// Terminal classification, `None` while the game is running.
    ///
    /// Checkmate wins over everything. The fifty-move rule is the generic
    /// draw; the remaining causes keep their own category.
    pub fn result(&self) -> Option<GameResult> {
        if self.active {
            return None;
        }

        let board = &self.board;
        let result = if board.is_checkmate() {
            GameResult::Checkmate {
                winner: board.turn().opposite(),
            }
        } else if board.is_fifty_move_draw() {
            GameResult::Draw
        } else if board.is_stalemate() {
            GameResult::Stalemate
        } else if board.is_threefold_repetition() {
            GameResult::ThreefoldRepetition
        } else if board.is_insufficient_material() {
            GameResult::InsufficientMaterial
        } else {
            GameResult::Unknown
        };
        Some(result)
    }

    /// Back to the standard start. Seats are kept.
    pub fn reset(&mut self) -> GameSnapshot {
        self.board = Board::new();
        self.history.clear();
        self.active = true;
        info!("Game reset");
        self.snapshot()
    }

    pub fn assign_seat(&mut self, id: ConnectionId) -> Option<Color> {
        let seat = self.seats.assign(id);
        match seat {
            Some(seat) => info!("Connection {} seated as {}", id, seat),
            None => info!("Connection {} is spectating", id),
        }
        seat
    }

    /// Puts `id` in `seat` regardless of the join order. Used for the AI player.
    pub fn reserve_seat(&mut self, seat: Color, id: ConnectionId) {
        self.seats.reserve(seat, id);
    }

    pub fn release_seat(&mut self, id: ConnectionId) {
        if let Some(seat) = self.seats.release(id) {
            info!("Connection {} left the {} seat", id, seat);
        }
    }

    pub fn seats(&self) -> &Seats {
        &self.seats
    }

    pub fn seat_of(&self, id: ConnectionId) -> Option<Color> {
        self.seats.seat_of(id)
    }

    pub fn side_to_move(&self) -> Color {
        self.board.turn()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn legal_moves(&self) -> Vec<LegalMove> {
        if !self.active {
            return Vec::new();
        }
        self.board.legal_moves()
    }

    pub fn ai_context(&self) -> AiRequestContext {
        AiRequestContext {
            position: self.board.to_fen(),
            side_to_move: self.board.turn(),
            move_history: self.history.clone(),
            legal_moves: self.legal_moves(),
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
