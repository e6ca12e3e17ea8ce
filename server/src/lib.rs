//! # Chess Server Library
//!
//! Authoritative server for a two-player chess game with spectators and an
//! optional AI opponent. The server owns the only copy of the game, decides
//! who may move, and pushes the full board state to every connection after
//! each change.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! One session per process: the position, the move history, whether the game
//! is still running, and which connection holds which seat. Clients never
//! change the board directly; they submit moves and mirror whatever the
//! server broadcasts back.
//!
//! ### Turn Arbitration
//! Every submitted move is checked against the seat map before the rules are
//! consulted. Spectators and the player off turn are turned away without
//! touching the position.
//!
//! ### AI Opponent
//! When enabled, one seat belongs to a text-generation service. Its answers
//! are retried, validated against the legal moves and, when the service keeps
//! failing, replaced by a scripted choice so the game never stalls.
//!
//! ## Architecture Design
//!
//! ### Single Session Loop
//! All game mutations happen in one task that consumes messages from
//! connection readers and from AI resolution tasks. The loop never awaits a
//! suggestion; results arrive as messages tagged with the game generation, so
//! an answer for a game that was reset in the meantime is dropped.
//!
//! ### TCP Framing
//! Each packet is a big-endian `u32` length followed by a `bincode` body, see
//! the `shared` crate.
//!
//! ## Module Organization
//!
//! - `rules`: move generation, notation and terminal checks on top of `shakmaty`
//! - `game`: the session controller and seat map
//! - `arbiter`: turn and role authorization
//! - `ai`: suggestion service trait, Gemini client, retrying resolver, fallback
//! - `client_manager`: open connections and their outgoing queues
//! - `network`: listener, per-connection tasks and the session loop
//! - `config`: validated runtime settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Two human players, no AI seat
//!     let config = ServerConfig {
//!         ai_seat: None,
//!         ..ServerConfig::default()
//!     };
//!     let mut server = Server::new(config, None).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod arbiter;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod rules;
