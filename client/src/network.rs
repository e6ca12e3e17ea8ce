use crate::game::ClientGameState;
use crate::input::{parse_command, Command, HELP};
use log::{error, info, warn};
use shared::{read_packet, write_packet, FrameError, Packet, PROTOCOL_VERSION};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Client {
    /// Moved into a reader task once the interactive loop starts.
    reader: Option<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    game_state: ClientGameState,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let mut client = Client {
            reader: Some(reader),
            writer,
            game_state: ClientGameState::new(),
        };
        client
            .send_packet(&Packet::Join {
                client_version: PROTOCOL_VERSION,
            })
            .await?;
        Ok(client)
    }

    pub async fn send_packet(&mut self, packet: &Packet) -> Result<(), FrameError> {
        write_packet(&mut self.writer, packet).await
    }

    /// Waits for the next packet and folds it into the local mirror.
    pub async fn recv_packet(&mut self) -> Result<(Packet, Vec<String>), FrameError> {
        let reader = self.reader.as_mut().ok_or(FrameError::Closed)?;
        let packet = read_packet(reader).await?;
        let lines = self.game_state.apply_packet(packet.clone());
        Ok((packet, lines))
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    /// Returns false when the session should end.
    async fn handle_command(&mut self, command: Command) -> Result<bool, FrameError> {
        match command {
            Command::Move(input) => {
                if self.game_state.seat.is_none() {
                    println!("Spectators cannot move");
                } else {
                    self.send_packet(&Packet::SubmitMove(input)).await?;
                }
            }
            Command::Reset => self.send_packet(&Packet::RequestReset).await?,
            Command::Board => print_lines(&self.game_state.render()),
            Command::Help => println!("{}", HELP),
            Command::Quit => {
                self.send_packet(&Packet::Leave).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reads frames on a separate task so a half-read frame is never dropped
    /// when stdin wins the select.
    fn spawn_reader(
        mut reader: OwnedReadHalf,
    ) -> mpsc::UnboundedReceiver<Result<Packet, FrameError>> {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let result = read_packet(&mut reader).await;
                let done = result.is_err();
                if packet_tx.send(result).is_err() || done {
                    break;
                }
            }
        });
        packet_rx
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let reader = self.reader.take().ok_or("client is already running")?;
        let mut packets = Self::spawn_reader(reader);
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            tokio::select! {
                result = packets.recv() => {
                    match result.unwrap_or(Err(FrameError::Closed)) {
                        Ok(packet) => {
                            let lines = self.game_state.apply_packet(packet);
                            print_lines(&lines);
                            if self.game_state.disconnected.is_some() {
                                break;
                            }
                        }
                        Err(FrameError::Closed) => {
                            warn!("Server closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("Error receiving packet: {}", e);
                            break;
                        }
                    }
                },

                line = stdin.next_line() => {
                    let Some(line) = line? else {
                        let _ = self.send_packet(&Packet::Leave).await;
                        break;
                    };
                    if let Some(command) = parse_command(&line) {
                        if !self.handle_command(command).await? {
                            break;
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
