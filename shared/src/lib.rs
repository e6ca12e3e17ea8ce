use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Identifier the server hands out to every accepted connection.
pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromotionPiece {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl PromotionPiece {
    /// Lowercase letter used in coordinate notation (`e7e8q`).
    pub fn uci_char(self) -> char {
        match self {
            PromotionPiece::Queen => 'q',
            PromotionPiece::Rook => 'r',
            PromotionPiece::Bishop => 'b',
            PromotionPiece::Knight => 'n',
        }
    }
}

/// A move as submitted over the wire.
///
/// Browser-style clients send coordinates, the AI resolver produces notation.
/// The server normalizes both forms before asking the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveInput {
    Coordinates {
        from: String,
        to: String,
        promotion: Option<PromotionPiece>,
    },
    Notation(String),
}

impl MoveInput {
    pub fn coordinates(from: &str, to: &str) -> Self {
        MoveInput::Coordinates {
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
        }
    }
}

impl fmt::Display for MoveInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveInput::Coordinates {
                from,
                to,
                promotion,
            } => {
                write!(f, "{}{}", from, to)?;
                if let Some(piece) = promotion {
                    write!(f, "{}", piece.uci_char())?;
                }
                Ok(())
            }
            MoveInput::Notation(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Checkmate { winner: Color },
    Draw,
    Stalemate,
    ThreefoldRepetition,
    InsufficientMaterial,
    Unknown,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Checkmate { winner } => write!(f, "checkmate, {} wins", winner),
            GameResult::Draw => write!(f, "draw"),
            GameResult::Stalemate => write!(f, "stalemate"),
            GameResult::ThreefoldRepetition => write!(f, "draw by threefold repetition"),
            GameResult::InsufficientMaterial => write!(f, "draw by insufficient material"),
            GameResult::Unknown => write!(f, "game over"),
        }
    }
}

/// Full view of the authoritative game, identical for every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub position: String,
    pub side_to_move: Color,
    pub move_history: Vec<String>,
    pub active: bool,
    pub result: Option<GameResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NotYourTurn,
    IllegalMove,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotYourTurn => write!(f, "not your turn"),
            RejectReason::IllegalMove => write!(f, "invalid move"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        client_version: u32,
    },
    SubmitMove(MoveInput),
    RequestReset,
    Leave,

    SeatAssigned {
        seat: Color,
    },
    SpectatorAssigned,
    GameState(GameSnapshot),
    MoveApplied {
        san: String,
        uci: String,
        by: Color,
    },
    MoveRejected {
        reason: RejectReason,
        attempted: String,
    },
    AiUnavailable {
        message: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,
    #[error("frame of {0} bytes exceeds the frame size limit")]
    TooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Encodes a packet as a length-prefixed frame.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, FrameError> {
    let body = bincode::serialize(packet)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. A clean EOF before the length prefix is `FrameError::Closed`.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}
