//! Interactive terminal client for the chatter multi-room chat.
//!
//! Thin glue over [`client_sync::ChatClient`]: a stdin command loop plus an
//! event printer task. All synchronization behavior lives in the runtime.

mod config;
mod logging;

use std::sync::Arc;

use client_core::{ClientEvent, EventStream, RoomId, RoomSyncState};
use client_rest::{RestApi, WsFeed};
use client_sync::{ChatClient, SessionHandle, SyncConfig};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::debug;

use crate::config::CliConfig;

const USAGE: &str = "\
commands:
  /register <user> <pass>   create an account
  /login [user] [pass]      log in (falls back to CHATTER_USER/CHATTER_PASSWORD)
  /logout                   drop the session
  /rooms                    list rooms
  /create <name>            create a room
  /open <room-id>           open a room and follow its feed
  /close [room-id]          close a room (default: current)
  /quit                     exit
anything else is sent to the most recently opened room";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let config = CliConfig::from_env()?;

    let session = SessionHandle::new();
    let client = ChatClient::with_config(
        Arc::new(RestApi::new(config.api_url.clone())),
        Arc::new(WsFeed::new(config.ws_url.clone())),
        Arc::new(session.clone()),
        SyncConfig {
            retry: config.retry,
            ..SyncConfig::default()
        },
    );

    let printer = tokio::spawn(print_events(client.events()));

    println!("chatter - connected to {}", config.api_url);
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current_room: Option<RoomId> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        handle_line(&client, &session, &config, line, &mut current_room).await;
    }

    if let Some(room_id) = current_room.take() {
        let _ = client.close_room(room_id).await;
    }
    printer.abort();
    Ok(())
}

async fn handle_line(
    client: &ChatClient,
    session: &SessionHandle,
    config: &CliConfig,
    line: &str,
    current_room: &mut Option<RoomId>,
) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match command {
        "/help" => println!("{USAGE}"),
        "/register" => match args.as_slice() {
            [username, password] => match client.register(username, password).await {
                Ok(()) => println!("registered '{username}'; now /login"),
                Err(err) => println!("register failed: {err}"),
            },
            _ => println!("usage: /register <user> <pass>"),
        },
        "/login" => {
            let username = args
                .first()
                .map(|v| (*v).to_owned())
                .or_else(|| config.prefill_username.clone());
            let password = args
                .get(1)
                .map(|v| (*v).to_owned())
                .or_else(|| config.prefill_password.clone());
            let (Some(username), Some(password)) = (username, password) else {
                println!("usage: /login <user> <pass>");
                return;
            };
            match client.login(&username, &password).await {
                Ok(new_session) => {
                    println!(
                        "logged in as {} (id {})",
                        new_session.username, new_session.user_id
                    );
                    session.set(new_session);
                }
                Err(err) => println!("login failed: {err}"),
            }
        }
        "/logout" => {
            session.clear();
            println!("logged out");
        }
        "/rooms" => match client.list_rooms().await {
            Ok(rooms) => {
                for room in rooms {
                    println!("{:>6}  {}", room.id, room.name);
                }
            }
            Err(err) => println!("room list failed: {err}"),
        },
        "/create" => {
            let name = args.join(" ");
            match client.create_room(&name).await {
                Ok(room) => println!("created room {} ({})", room.name, room.id),
                Err(err) => println!("create failed: {err}"),
            }
        }
        "/open" => match args.first().and_then(|v| v.parse::<RoomId>().ok()) {
            Some(room_id) => match client.open_room(room_id) {
                Ok(()) => {
                    *current_room = Some(room_id);
                    println!("opened room {room_id}");
                }
                Err(err) => println!("open failed: {err}"),
            },
            None => println!("usage: /open <room-id>"),
        },
        "/close" => {
            let target = args
                .first()
                .and_then(|v| v.parse::<RoomId>().ok())
                .or(*current_room);
            let Some(room_id) = target else {
                println!("usage: /close <room-id>");
                return;
            };
            match client.close_room(room_id).await {
                Ok(()) => {
                    if *current_room == Some(room_id) {
                        *current_room = None;
                    }
                    println!("closed room {room_id}");
                }
                Err(err) => println!("close failed: {err}"),
            }
        }
        _ if command.starts_with('/') => println!("unknown command; /help for usage"),
        _ => {
            let Some(room_id) = *current_room else {
                println!("open a room first (/rooms, /open <room-id>)");
                return;
            };
            if let Err(err) = client.send(room_id, line).await {
                println!("send failed: {err}");
            }
        }
    }
}

/// Print cross-room events as they arrive.
async fn print_events(mut events: EventStream) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::MessageAdded { room_id, message }) => {
                let marker = if message.is_confirmed() {
                    ""
                } else {
                    " (sending)"
                };
                println!("[{room_id}] <{}> {}{marker}", message.author_id, message.body);
            }
            Ok(ClientEvent::RoomStateChanged { room_id, state }) => match state {
                RoomSyncState::Live => println!("[{room_id}] live"),
                RoomSyncState::Reconnecting => println!("[{room_id}] reconnecting"),
                _ => debug!(room_id, ?state, "room state changed"),
            },
            Ok(ClientEvent::RoomUnavailable { room_id, error }) => {
                println!("[{room_id}] unavailable: {error} (reopen to retry)");
            }
            Ok(ClientEvent::RoomListUpdated { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
