//! Client execution logic.

use std::sync::Arc;

use hanabi_core::domain::{RealtimeStore, RoomId, UserId, UserName};
use hanabi_core::usecase::{
    Celebration, CommandOutcome, RoomSession, SessionEvent, SessionOptions,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::{
    command::{Command, HELP, parse_command},
    error::ClientError,
    formatter::RoomFormatter,
    infrastructure::websocket_store::{MAX_RECONNECT_ATTEMPTS, WebSocketRealtimeStore},
    ui::redisplay_prompt,
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub name: UserName,
    /// Room to join; a new room is created when `None`
    pub room: Option<RoomId>,
    pub user_id: UserId,
    pub show_celebrations: bool,
}

/// What to tell the user after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Silent,
    Message(String),
    Quit,
}

/// Run the client until the user quits or the connection cannot be restored
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let store = Arc::new(WebSocketRealtimeStore::connect(&options.url).await?);
    let (session, mut events) = open_session(store.clone(), &options).await?;

    println!(
        "\nYou are '{}' in room '{}'. Share the room id to invite others.\nType 'help' for commands. Press Ctrl+C to exit.\n",
        options.name,
        session.room_id()
    );

    let prompt = format!("{}> ", options.name);
    let mut input = spawn_readline(prompt.clone());

    let result = loop {
        tokio::select! {
            line = input.recv() => {
                // Ctrl+C or Ctrl+D closes the input
                let Some(line) = line else { break Ok(()) };
                match parse_command(&line) {
                    Ok(command) => match execute(&session, command).await {
                        Reply::Silent => {}
                        Reply::Message(text) => println!("{}", text),
                        Reply::Quit => break Ok(()),
                    },
                    Err(e) => println!("{}", e),
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break Ok(()) };
                if let Some(text) = render_event(&session, &event, options.show_celebrations) {
                    print!("{}", text);
                    redisplay_prompt(&prompt);
                }
                if matches!(event, SessionEvent::RoomMissing) {
                    break Ok(());
                }
            }
            _ = store.closed() => {
                break Err(ClientError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS));
            }
        }
    };

    session.close();
    tracing::info!("Left room");
    result
}

async fn open_session(
    store: Arc<dyn RealtimeStore>,
    options: &ClientOptions,
) -> Result<(RoomSession, mpsc::UnboundedReceiver<SessionEvent>), ClientError> {
    let opened = match &options.room {
        Some(room_id) => {
            RoomSession::join(
                store,
                room_id.clone(),
                options.user_id.clone(),
                options.name.clone(),
                SessionOptions::default(),
            )
            .await?
        }
        None => {
            RoomSession::create(
                store,
                RoomId::generate(),
                options.user_id.clone(),
                options.name.clone(),
                SessionOptions::default(),
            )
            .await?
        }
    };
    Ok(opened)
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

fn reply<T>(outcome: CommandOutcome<T>) -> Reply {
    match outcome {
        CommandOutcome::Dispatched(_) => Reply::Silent,
        CommandOutcome::Skipped(reason) => Reply::Message(RoomFormatter::format_skip(&reason)),
    }
}

/// Run one parsed command against the session
pub async fn execute(session: &RoomSession, command: Command) -> Reply {
    let me = session.user_id().clone();
    let commands = session.commands();

    match command {
        Command::Vote(vote) => reply(commands.set_user_vote(&me, Some(vote)).await),
        Command::Unvote => reply(commands.set_user_vote(&me, None).await),
        Command::ToggleShow => reply(commands.toggle_show().await),
        Command::Reset => reply(commands.reset_votes().await),
        Command::Rename(name) => reply(commands.set_user_name(&me, name).await),
        Command::CreateGroup => match commands.create_group().await {
            CommandOutcome::Dispatched(group_id) => {
                Reply::Message(format!("Created group {}", group_id))
            }
            skipped => reply(skipped),
        },
        Command::RenameGroup(group_id, name) => reply(commands.rename_group(&group_id, name).await),
        Command::DeleteGroup(group_id) => reply(commands.delete_group(&group_id).await),
        Command::JoinGroup(group_id) => reply(commands.set_user_group(&me, &group_id).await),
        Command::Confetti(launch) => reply(session.publish_celebration(launch).await),
        Command::ShowRoom => match session.snapshot().room() {
            Some(room) => Reply::Message(RoomFormatter::format_room(room, &me)),
            None => Reply::Message("The room is not loaded yet.".to_string()),
        },
        Command::Help => Reply::Message(HELP.to_string()),
        Command::Quit => Reply::Quit,
    }
}

/// Text to print for a session event, if any
pub fn render_event(session: &RoomSession, event: &SessionEvent, show_celebrations: bool) -> Option<String> {
    match event {
        SessionEvent::RoomUpdated(room) => Some(RoomFormatter::format_room(room, session.user_id())),
        SessionEvent::RoomMissing => Some(RoomFormatter::format_room_missing()),
        SessionEvent::Celebrate(_) if !show_celebrations => None,
        SessionEvent::Celebrate(Celebration::Consensus(consensus)) => {
            let snapshot = session.snapshot();
            Some(RoomFormatter::format_consensus(
                consensus,
                snapshot.room().map(|room| room.as_ref()),
            ))
        }
        SessionEvent::Celebrate(Celebration::Confetti(event)) => {
            Some(RoomFormatter::format_confetti(event))
        }
        SessionEvent::ConnectionChanged(state) => Some(RoomFormatter::format_connection(*state)),
    }
}
