//! Turn and role authorization.
//!
//! Runs before every move attempt. A connection may move only while it holds
//! the seat of the side to move; spectators never may.

use crate::game::Seats;
use shared::{Color, ConnectionId, RejectReason};

pub fn authorize(
    seats: &Seats,
    side_to_move: Color,
    id: ConnectionId,
) -> Result<Color, RejectReason> {
    match seats.seat_of(id) {
        Some(seat) if seat == side_to_move => Ok(seat),
        _ => Err(RejectReason::NotYourTurn),
    }
}
