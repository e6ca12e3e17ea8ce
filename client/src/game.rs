use crate::rendering::{render_board, render_status};
use log::{debug, warn};
use shared::{Color, GameSnapshot, Packet};

/// Local mirror of what the server has told this connection.
///
/// The client never plays moves on its own copy; it only replaces the
/// snapshot whenever a new one arrives.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub seat: Option<Color>,
    pub joined: bool,
    pub snapshot: Option<GameSnapshot>,
    pub disconnected: Option<String>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the mirror and returns lines worth showing to the user.
    pub fn apply_packet(&mut self, packet: Packet) -> Vec<String> {
        match packet {
            Packet::SeatAssigned { seat } => {
                self.joined = true;
                self.seat = Some(seat);
                vec![format!("You play {}", seat)]
            }
            Packet::SpectatorAssigned => {
                self.joined = true;
                self.seat = None;
                vec!["Both seats are taken, you are spectating".to_string()]
            }
            Packet::GameState(snapshot) => {
                self.snapshot = Some(snapshot);
                self.render()
            }
            Packet::MoveApplied { san, by, .. } => vec![format!("{} played {}", by, san)],
            Packet::MoveRejected { reason, attempted } => {
                vec![format!("Move {} rejected: {}", attempted, reason)]
            }
            Packet::AiUnavailable { message } => vec![message],
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.joined = false;
                self.disconnected = Some(reason.clone());
                vec![format!("Disconnected: {}", reason)]
            }
            other => {
                debug!("Ignoring client-bound {:?}", other);
                Vec::new()
            }
        }
    }

    pub fn is_my_turn(&self) -> bool {
        match (&self.snapshot, self.seat) {
            (Some(snapshot), Some(seat)) => snapshot.active && snapshot.side_to_move == seat,
            _ => false,
        }
    }

    pub fn render(&self) -> Vec<String> {
        let Some(snapshot) = &self.snapshot else {
            return vec!["No board yet".to_string()];
        };
        let perspective = self.seat.unwrap_or(Color::White);

        let mut lines = Vec::new();
        match render_board(&snapshot.position, perspective) {
            Some(board) => lines.extend(board.lines().map(str::to_string)),
            None => lines.push(snapshot.position.clone()),
        }
        if !snapshot.move_history.is_empty() {
            lines.push(format!("Moves: {}", snapshot.move_history.join(" ")));
        }
        lines.push(render_status(snapshot, self.seat));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{RejectReason, STARTING_FEN};

    fn start_snapshot() -> GameSnapshot {
        GameSnapshot {
            position: STARTING_FEN.to_string(),
            side_to_move: Color::White,
            move_history: vec![],
            active: true,
            result: None,
        }
    }

    #[test]
    fn test_seat_then_snapshot() {
        let mut state = ClientGameState::new();
        assert!(!state.is_my_turn());

        let lines = state.apply_packet(Packet::SeatAssigned { seat: Color::White });
        assert_eq!(lines, vec!["You play white"]);

        let lines = state.apply_packet(Packet::GameState(start_snapshot()));
        assert_eq!(lines.last().unwrap(), "Your move");
        assert!(state.is_my_turn());
    }

    #[test]
    fn test_spectator_never_on_turn() {
        let mut state = ClientGameState::new();
        state.apply_packet(Packet::SpectatorAssigned);
        state.apply_packet(Packet::GameState(start_snapshot()));
        assert!(state.joined);
        assert!(!state.is_my_turn());
    }

    #[test]
    fn test_rejection_keeps_snapshot() {
        let mut state = ClientGameState::new();
        state.apply_packet(Packet::SeatAssigned { seat: Color::Black });
        state.apply_packet(Packet::GameState(start_snapshot()));

        let lines = state.apply_packet(Packet::MoveRejected {
            reason: RejectReason::NotYourTurn,
            attempted: "e7e5".to_string(),
        });
        assert_eq!(lines, vec!["Move e7e5 rejected: not your turn"]);
        assert_eq!(state.snapshot, Some(start_snapshot()));
    }

    #[test]
    fn test_history_rendered() {
        let mut state = ClientGameState::new();
        let mut snapshot = start_snapshot();
        snapshot.move_history = vec!["e4".to_string(), "e5".to_string()];
        let lines = state.apply_packet(Packet::GameState(snapshot));
        assert!(lines.contains(&"Moves: e4 e5".to_string()));
    }

    #[test]
    fn test_disconnect_recorded() {
        let mut state = ClientGameState::new();
        state.apply_packet(Packet::Disconnected {
            reason: "Server full".to_string(),
        });
        assert_eq!(state.disconnected.as_deref(), Some("Server full"));
        assert!(!state.joined);
    }
}
