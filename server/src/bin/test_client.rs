//! Scripted bot that joins a session, readies up and types the race text.

use clap::Parser;
use shared::{ClientMessage, GameStatus, ServerMessage, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Bot client for the typing race server")]
struct Args {
    /// Server address
    #[clap(long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Player name to register
    #[clap(short, long, default_value = "bot")]
    name: String,

    /// Join this session instead of creating one
    #[clap(short, long)]
    session: Option<u32>,

    /// Delay between keystrokes in milliseconds
    #[clap(short, long, default_value = "80")]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);
    let (reader, mut writer) = stream.into_split();

    // Every outgoing message goes through one writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();
    let writer_handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let mut line = match shared::encode(&message) {
                Ok(line) => line,
                Err(e) => {
                    eprintln!("Failed to encode {}: {}", message.message_type(), e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                eprintln!("Failed to send: {}", e);
                break;
            }
        }
    });

    tx.send(ClientMessage::JoinGameRequest {
        player_name: args.name.clone(),
    })?;
    match args.session {
        Some(session_id) => tx.send(ClientMessage::JoinSessionRequest { session_id })?,
        None => tx.send(ClientMessage::CreateSessionRequest)?,
    }

    let mut own_id: Option<u32> = None;
    let mut joined = false;
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let message: ServerMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                eprintln!("Unreadable message {:?}: {}", line, e);
                continue;
            }
        };

        match message {
            ServerMessage::JoinGameResponse { outcome } if !outcome.is_accepted() => {
                println!("Name rejected: {:?}", outcome.detail);
                break;
            }
            ServerMessage::CreateSessionResponse { session_id, .. } => {
                println!("Created session {}", session_id);
                tx.send(ClientMessage::JoinSessionRequest { session_id })?;
            }
            ServerMessage::JoinSessionResponse { outcome } => {
                if !outcome.is_accepted() {
                    println!("Could not join: {:?}", outcome.detail);
                    break;
                }
                joined = true;
                tx.send(ClientMessage::ReadyRequest { ready: true })?;
            }
            ServerMessage::PlayerJoinedNotification {
                num_players,
                player_id,
                player_name,
            } => {
                if joined && own_id.is_none() {
                    own_id = Some(player_id);
                }
                println!("{} joined ({} players)", player_name, num_players);
            }
            ServerMessage::PlayerLeftNotification {
                num_players,
                player_id,
            } => println!("Player {} left ({} players)", player_id, num_players),
            ServerMessage::GameStateNotification { status } => {
                println!("Game is now {:?}", status);
                if status == GameStatus::Finished {
                    break;
                }
            }
            ServerMessage::TextNotification { text } => {
                println!("Racing on: {}", text);
                let tx = tx.clone();
                let delay = Duration::from_millis(args.delay_ms);
                tokio::spawn(async move {
                    for character in text.chars() {
                        if tx.send(ClientMessage::CharacterRequest { character }).is_err() {
                            break;
                        }
                        sleep(delay).await;
                    }
                });
            }
            ServerMessage::PlayerStateNotification {
                player_id,
                accuracy,
                progress,
                wpm,
            } if Some(player_id) == own_id => {
                println!(
                    "progress {:5.1}%  wpm {:5.1}  accuracy {:5.1}%",
                    progress * 100.0,
                    wpm,
                    accuracy * 100.0
                );
            }
            _ => {}
        }
    }

    drop(tx);
    let _ = tokio::time::timeout(Duration::from_secs(1), writer_handle).await;
    println!("Disconnected");
    Ok(())
}
