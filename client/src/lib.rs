//! # Chess Client Library
//!
//! Terminal client for the chess server. It joins the game, prints the board
//! every time the server broadcasts a new state, and turns lines typed on
//! stdin into move submissions or reset requests.
//!
//! The client keeps no rules of its own. Every move is judged by the server,
//! and the local copy of the game is replaced wholesale by each snapshot.
//!
//! ## Module Organization
//!
//! - `game`: the local mirror of seat and snapshot
//! - `input`: parsing of typed commands
//! - `network`: TCP connection and the interactive loop
//! - `rendering`: text board and status line

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
