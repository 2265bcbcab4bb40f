//! forkchat - branching chat client for OpenAI-compatible endpoints

mod commands;
mod config;
mod store;
mod utils;

use anyhow::Context;
use clap::Parser;
use forkchat_ai::{HttpTransport, StreamPhase};
use forkchat_core::{ChatEvent, ChatSession, Conversation};
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::commands::{CommandResult, PathCommand};
use crate::store::ConversationStore;

/// forkchat - branching chat client
#[derive(Parser, Debug)]
#[command(name = "forkchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use, as "<Provider>: <model>"
    #[arg(short, long)]
    model: Option<String>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Resume a saved conversation by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved conversations
    #[arg(long)]
    conversations: bool,

    /// Delete a saved conversation by ID
    #[arg(long)]
    delete: Option<String>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("forkchat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.init_config {
        let path = config::Config::init().context("Error creating config")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let store = ConversationStore::new(ConversationStore::default_dir());

    if args.conversations {
        return list_conversations(&store);
    }

    if let Some(ref id) = args.delete {
        store.delete(id)?;
        println!("Deleted conversation {}", id);
        return Ok(());
    }

    let cfg = config::Config::load();

    let mut conversation = match args.resume {
        Some(ref id) => {
            let conversation = store.load(id)?;
            println!(
                "Resuming \"{}\" ({} messages)",
                conversation.title,
                conversation.message_count()
            );
            conversation
        }
        None => Conversation::new(cfg.model()),
    };
    if let Some(model) = args.model {
        conversation.model = model;
    }

    let registry = cfg
        .registry()
        .context("Invalid provider in config")?;
    if let Err(e) = registry.resolve(&conversation.model) {
        let known: Vec<&str> = registry.providers().iter().map(|p| p.name.as_str()).collect();
        anyhow::bail!(
            "{}\nConfigured providers: {}\nAdd one with: forkchat --init-config",
            e,
            known.join(", ")
        );
    }

    let session = ChatSession::new(
        conversation,
        registry,
        Arc::new(HttpTransport::new()),
        cfg.generation_settings(),
    );

    if let Some(command) = args.command {
        return run_command(&session, &store, &command).await;
    }

    run_interactive(&session, &store).await
}

/// Await `work` while rendering session events; Ctrl-C aborts the stream
async fn drive<T>(
    session: &ChatSession,
    events: &mut broadcast::Receiver<ChatEvent>,
    work: impl Future<Output = T>,
) -> T {
    tokio::pin!(work);
    let mut open = true;
    loop {
        tokio::select! {
            output = &mut work => {
                while let Ok(event) = events.try_recv() {
                    render(&event);
                }
                return output;
            }
            event = events.recv(), if open => match event {
                Ok(event) => render(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => open = false,
            },
            _ = tokio::signal::ctrl_c() => session.abort(),
        }
    }
}

fn render(event: &ChatEvent) {
    match event {
        ChatEvent::Token { delta, .. } => {
            print!("{}", delta);
            let _ = io::stdout().flush();
        }
        ChatEvent::StreamEnd { phase, .. } => {
            println!();
            if *phase == StreamPhase::Cancelled {
                eprintln!("[Cancelled]");
            }
        }
        ChatEvent::StreamError { message, retryable, .. } => {
            eprintln!("\n[Error: {}]", message);
            if *retryable {
                eprintln!("[This may be temporary; /regen the reply to try again]");
            }
        }
        ChatEvent::TitleUpdated { title } => {
            eprintln!("[Title: {}]", title);
        }
        ChatEvent::StreamStart { .. } | ChatEvent::TitleStart | ChatEvent::BranchFlash { .. } => {}
    }
}

fn save(session: &ChatSession, store: &ConversationStore) {
    if let Err(e) = store.save(&session.snapshot()) {
        eprintln!("Warning: failed to save conversation: {:#}", e);
    }
}

async fn run_command(
    session: &ChatSession,
    store: &ConversationStore,
    command: &str,
) -> anyhow::Result<()> {
    println!("forkchat> {}", command);
    println!();

    let mut events = session.subscribe();
    let result = drive(session, &mut events, session.send_message(command)).await;
    save(session, store);
    result?;
    Ok(())
}

async fn run_interactive(session: &ChatSession, store: &ConversationStore) -> anyhow::Result<()> {
    let mut events = session.subscribe();

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        let conv = session.snapshot();
        eprintln!("forkchat ({}) conversation: {}", conv.model, utils::short_id(&conv.id));
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let snapshot = session.snapshot();
        let Some(result) = commands::execute_command(input, &snapshot) else {
            if let Err(e) = drive(session, &mut events, session.send_message(input)).await {
                eprintln!("Error: {}", e);
            }
            save(session, store);
            continue;
        };

        match result {
            CommandResult::Exit => break,
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            CommandResult::Regenerate(id) => {
                match drive(session, &mut events, session.regenerate(&id)).await {
                    Ok(Some(_)) => {}
                    Ok(None) => println!("That message can no longer be regenerated."),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            CommandResult::Edit(id, text) => {
                match drive(session, &mut events, session.edit_message(&id, &text)).await {
                    Ok(Some(mutation)) if mutation.generation.is_none() => println!("Edited."),
                    Ok(Some(_)) => {}
                    Ok(None) => println!("Nothing to change."),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            CommandResult::SwitchBranch(id, index) => match session.switch_branch(&id, index) {
                Some(_) => {
                    if let CommandResult::Message(path) = PathCommand::execute(&session.snapshot())
                    {
                        println!("{}", path);
                    }
                }
                None => println!("No branch {} there.", index),
            },
            CommandResult::GenerateTitle => {
                match drive(session, &mut events, session.generate_title()).await {
                    Some(_) => {}
                    None => println!("Title unchanged."),
                }
            }
            CommandResult::ToggleArchive => {
                let archived = !snapshot.is_archived;
                session.set_archived(archived);
                println!("{}", if archived { "Archived." } else { "Unarchived." });
            }
        }
        save(session, store);
    }

    Ok(())
}

fn list_conversations(store: &ConversationStore) -> anyhow::Result<()> {
    let conversations = store.list()?;
    if conversations.is_empty() {
        println!("No saved conversations found.");
        println!("Conversations are stored in: {}", store.dir().display());
        return Ok(());
    }

    println!("Saved conversations:\n");
    println!("{:<38} {:<18} {:<6} Title", "ID", "Updated", "Msgs");
    println!("{}", "-".repeat(90));
    for c in conversations {
        let archived = if c.is_archived { " (archived)" } else { "" };
        println!(
            "{:<38} {:<18} {:<6} {}{}  [{}]",
            c.id,
            c.updated_at_display(),
            c.message_count,
            utils::truncate_chars(&c.title, 40),
            archived,
            c.model
        );
    }
    println!("\nResume with: forkchat --resume <conversation-id>");
    Ok(())
}
