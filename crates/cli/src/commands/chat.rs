//! Console transport: the same `Bot` the server runs, fed from stdin.

use std::sync::Arc;

use henry_core::config::{AppConfig, LoadOptions, LogFormat};
use henry_core::message::{InboundMessage, MessageContext, OutboundReply};
use henry_core::{AnonymousDirectory, Bot, BotSettings, RecordingOutbox, Services};
use henry_lookup::{StaticMapClient, YelpClient};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::commands::CommandResult;

pub const CONSOLE_USER: &str = "console-user";
const CONSOLE_CHANNEL: &str = "console";
const PROMPT: &str = "you> ";

pub fn run(user: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        skip_slack_validation: true,
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };
    init_logging(&config);

    let search = match YelpClient::from_config(&config.search) {
        Ok(search) => search,
        Err(error) => return CommandResult::failure("chat", "lookup_client", error.to_string(), 2),
    };
    let services = Services {
        search: Arc::new(search),
        maps: Arc::new(StaticMapClient::from_config(&config.maps)),
        directory: Arc::new(AnonymousDirectory),
    };
    let bot = Bot::new(services, BotSettings::from_config(&config));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("chat", "runtime", error.to_string(), 1),
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    match runtime.block_on(run_session(&bot, user, stdin, stdout)) {
        Ok(turns) => CommandResult::success("chat", format!("session ended after {turns} messages")),
        Err(error) => CommandResult::failure("chat", "console_io", error.to_string(), 1),
    }
}

/// Logs go to stderr so they never interleave with the conversation.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Reads one message per line until EOF, `quit` or `exit`. Returns the
/// number of messages handed to the bot.
pub async fn run_session<R, W>(
    bot: &Bot,
    user: &str,
    input: R,
    mut output: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outbox = RecordingOutbox::new();
    let mut lines = input.lines();
    let mut turns = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        let message =
            InboundMessage::new(user, CONSOLE_CHANNEL, MessageContext::DirectMessage, text);
        bot.handle(&message, &outbox).await;
        turns += 1;

        for reply in outbox.drain().await {
            output.write_all(render_reply(&reply).as_bytes()).await?;
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(turns)
}

pub fn render_reply(reply: &OutboundReply) -> String {
    let name = reply.username.as_deref().unwrap_or(henry_core::message::BOT_USERNAME);
    let mut rendered = String::new();
    if !reply.text.is_empty() {
        rendered.push_str(&format!("{name}> {}\n", reply.text));
    }

    for attachment in &reply.attachments {
        match (&attachment.title, &attachment.title_link) {
            (Some(title), Some(link)) => rendered.push_str(&format!("  [{title}] {link}\n")),
            (Some(title), None) => rendered.push_str(&format!("  [{title}]\n")),
            _ => {}
        }
        if let Some(text) = &attachment.text {
            rendered.push_str(&format!("  {text}\n"));
        }
        if let Some(image_url) = &attachment.image_url {
            rendered.push_str(&format!("  image: {image_url}\n"));
        }
    }
    rendered
}
