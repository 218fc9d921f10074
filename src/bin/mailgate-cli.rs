#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for browsing an IMAP account through a pooled session

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use mailgate::{
    ImapConfig, MailClient, MessageSummary, PartNode, format_part_path, parse_part_path,
};
use std::env;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailgate-cli")]
#[command(about = "Browse an IMAP account: mailboxes, message pages and parts")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List mailboxes
    Mailboxes,

    /// List one page of messages, newest first
    List {
        /// Mailbox to list
        #[arg(long, default_value = "INBOX")]
        mailbox: String,

        /// Page number (0 is the most recent 50 messages)
        #[arg(long, default_value = "0")]
        page: u32,
    },

    /// Show a message part by UID
    Show {
        /// Message UID
        uid: u32,

        /// Mailbox containing the message
        #[arg(long, default_value = "INBOX")]
        mailbox: String,

        /// Part path such as 1.2 (default: the message's text part)
        #[arg(long)]
        part: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ImapConfig::from_env()?;
    let username = env::var("IMAP_USERNAME").context("IMAP_USERNAME not set")?;
    let password = env::var("IMAP_PASSWORD").context("IMAP_PASSWORD not set")?;

    let client = MailClient::new(config);
    let token = client.login(&username, &password).await?;

    let result = match &args.command {
        Command::Mailboxes => cmd_mailboxes(&client, &token, &args).await,
        Command::List { mailbox, page } => cmd_list(&client, &token, &args, mailbox, *page).await,
        Command::Show { uid, mailbox, part } => {
            cmd_show(&client, &token, &args, mailbox, *uid, part.as_deref()).await
        }
    };

    client.logout(&token).await?;
    result
}

async fn cmd_mailboxes(client: &MailClient, token: &str, args: &Args) -> anyhow::Result<()> {
    let mailboxes = client.list_mailboxes(token).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&mailboxes)?);
    } else {
        for mailbox in &mailboxes {
            println!("{mailbox}");
        }
    }

    Ok(())
}

async fn cmd_list(
    client: &MailClient,
    token: &str,
    args: &Args,
    mailbox: &str,
    page: u32,
) -> anyhow::Result<()> {
    let messages = client.list_messages(token, mailbox, page).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        print_message_table(&messages);
    }

    Ok(())
}

async fn cmd_show(
    client: &MailClient,
    token: &str,
    args: &Args,
    mailbox: &str,
    uid: u32,
    part: Option<&str>,
) -> anyhow::Result<()> {
    let path = match part {
        Some(part) => parse_part_path(part)?,
        None => {
            // Peek at the structure first to find the default text part.
            let (summary, _) = client.fetch_part(token, mailbox, uid, &[]).await?;
            summary.text_part_path().unwrap_or_default()
        }
    };

    let (summary, entity) = client.fetch_part(token, mailbox, uid, &path).await?;

    if args.json {
        let output = serde_json::json!({
            "message": summary,
            "tree": summary.part_tree(),
            "part": format_part_path(&path),
            "mime_type": entity.mime_type,
            "filename": entity.filename,
            "text": entity.text,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_summary(&summary);
    if let Some(tree) = summary.part_tree() {
        println!("\n--- Parts ---\n");
        print_tree(&tree, 0);
    }

    println!("\n--- Part {} ({}) ---\n", display_path(&path), entity.mime_type);
    match &entity.text {
        Some(text) => println!("{text}"),
        None => println!(
            "[{} bytes of {}{}]",
            entity.body.len(),
            entity.mime_type,
            entity
                .filename
                .as_ref()
                .map(|f| format!(", {f}"))
                .unwrap_or_default()
        ),
    }

    Ok(())
}

fn display_path(path: &[u32]) -> String {
    if path.is_empty() {
        "TEXT".to_string()
    } else {
        format_part_path(path)
    }
}

fn print_message_table(messages: &[MessageSummary]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    let header = format!("{:<8} {:<20} {:<30} {}", "UID", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        let envelope = message.envelope.clone().unwrap_or_default();
        println!(
            "{:<8} {:<20} {:<30} {}",
            message.uid,
            envelope
                .date
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            truncate(
                &envelope
                    .from
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                28
            ),
            truncate(&envelope.subject, 40),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn print_summary(summary: &MessageSummary) {
    let envelope = summary.envelope.clone().unwrap_or_default();
    let join = |list: &[mailgate::Address]| {
        list.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("UID:     {}", summary.uid);
    if let Some(date) = envelope.date {
        println!("Date:    {}", date.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("From:    {}", join(&envelope.from));
    println!("To:      {}", join(&envelope.to));
    if !envelope.cc.is_empty() {
        println!("CC:      {}", join(&envelope.cc));
    }
    println!("Subject: {}", envelope.subject);
    if let Some(id) = &envelope.message_id {
        println!("Msg-ID:  {id}");
    }
}

fn print_tree(node: &PartNode, depth: usize) {
    let label = if node.path.is_empty() {
        String::new()
    } else {
        format!("{} ", node.path_string())
    };
    println!("{}{label}{node}", "  ".repeat(depth));
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
