//! Command-line client for ephemeral chats.
//!
//! Lists chats with unread counts and, given `--chat`, prints the decrypted
//! messages of that chat. `--read-all` sends read receipts (which starts the
//! burn countdown) and `--watch` keeps the process alive so timers fire.
//!
//! Usage:
//!   ephemeral-chat [--chat <id>] [--read-all] [--watch <secs>]

use anyhow::{Context, Result};
use ephemeral_chat::models::{ChatId, MessageView};
use ephemeral_chat::{logging, Config, MessageStore};
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default)]
struct CliArgs {
    chat: Option<ChatId>,
    read_all: bool,
    watch_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing()?;

    let args = parse_args()?;
    let config = Config::from_env().context("failed to load configuration")?;
    info!(api_root = %config.api_root, burn_delay_secs = config.burn_delay_secs, "starting ephemeral-chat");

    let store = MessageStore::from_config(&config)?;

    let chats = store.refresh_chats().await.context("failed to list chats")?;
    println!("{} chats, {} unread", chats.len(), store.unread_total());
    for chat in &chats {
        println!(
            "  #{:<6} members={:?} unread={}{}",
            chat.id,
            chat.member_ids(),
            chat.unread_count,
            if chat.is_pinned { " [pinned]" } else { "" }
        );
    }

    let Some(chat_id) = args.chat else {
        return Ok(());
    };

    let chat = store
        .open_chat(chat_id)
        .await
        .with_context(|| format!("failed to open chat {chat_id}"))?;
    let views = store
        .load_messages(chat_id, config.default_page())
        .await
        .with_context(|| format!("failed to load messages of chat {chat_id}"))?;

    println!("\nchat #{} ({} messages)", chat.id, views.len());
    for view in &views {
        print_view(view);
    }

    if args.read_all {
        for view in views.iter().filter(|v| !v.message.is_read) {
            let outcome = store.mark_read(view.id()).await;
            info!(message_id = view.id(), outcome = ?outcome, "marked read");
        }
    }

    if let Some(secs) = args.watch_secs {
        watch(&store, Duration::from_secs(secs)).await;
    }

    store.clear_current_chat();
    Ok(())
}

async fn watch(store: &MessageStore, duration: Duration) {
    let deadline = tokio::time::Instant::now() + duration;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut seen: HashSet<_> = store.messages().iter().map(|v| v.id()).collect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {
                store.tick().await;
                let visible: HashSet<_> = store.messages().iter().map(|v| v.id()).collect();
                for gone in seen.difference(&visible) {
                    println!("  message {gone} burned");
                }
                seen = visible;
            }
        }
    }
}

fn print_view(view: &MessageView) {
    let at = view
        .message
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let media = view
        .message
        .media_url
        .as_deref()
        .map(|url| format!(" <{} {url}>", view.message.content_type.as_str()))
        .unwrap_or_default();
    println!(
        "  [{at}] #{} from {}: {}{media}{}",
        view.id(),
        view.message.sender_id,
        view.text(),
        if view.message.is_read { "" } else { " (unread)" }
    );
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs::default();
    let argv: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--chat" => {
                if i + 1 >= argv.len() {
                    anyhow::bail!("--chat requires a chat id");
                }
                args.chat = Some(argv[i + 1].parse().context("Invalid chat id")?);
                i += 2;
            }
            "--read-all" => {
                args.read_all = true;
                i += 1;
            }
            "--watch" => {
                if i + 1 >= argv.len() {
                    anyhow::bail!("--watch requires a number of seconds");
                }
                args.watch_secs = Some(argv[i + 1].parse().context("Invalid watch duration")?);
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                anyhow::bail!("Unknown argument: {}", argv[i]);
            }
        }
    }

    Ok(args)
}

fn print_help() {
    println!(
        r#"
ephemeral-chat - read burn-after-read private chats

USAGE:
    ephemeral-chat [OPTIONS]

OPTIONS:
    --chat <ID>        Open a chat and print its messages
    --read-all         Mark every unread message read (starts the burn countdown)
    --watch <SECS>     Keep running so burn timers fire, then exit
    -h, --help         Print help

ENVIRONMENT:
    CHAT_API_ROOT              API base URL (default http://localhost:3000/api)
    CHAT_BEARER_TOKEN          Bearer token (required)
    CHAT_BURN_DELAY_SECS       Seconds from read to burn (default 30)
    CHAT_PAGE_LIMIT            Messages per page, 1-50 (default 20)
    CHAT_REQUEST_TIMEOUT_SECS  HTTP timeout (default 15)
    RUST_LOG                   Log filter (default info)
"#
    );
}
