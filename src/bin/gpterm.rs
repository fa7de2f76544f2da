//! Interactive chat in the terminal.
//!
//! This binary provides a streaming REPL for OpenAI-compatible chat
//! endpoints.  Code blocks in replies are highlighted while they stream and
//! numbered so they can be copied with `!copy N`.
//!
//! # Usage
//!
//! ```bash
//! # Start a new chat
//! gpterm
//!
//! # Ask one question and exit
//! gpterm how do I list hidden files
//!
//! # List and resume saved chats
//! gpterm --list
//! gpterm --resume Listing_Hidden_Files-10-42_03-07-24
//!
//! # Talk to a local server
//! gpterm --base-url http://localhost:11434/v1 --model llama3
//! ```
//!
//! The API key is read from `GPTERM_API_KEY` or `OPENAI_API_KEY`.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, DefaultEditor, Editor, Helper};

use gpterm::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, MULTI_LINE_END, PlainTextRenderer, Renderer,
    SystemClipboard, complete_command, help_text, list_sessions, load_roles, parse_command,
    system_description,
};
use gpterm::render::{INFO_COLOR, REPLY_COLOR, USER_COLOR};
use gpterm::{ChatMessage, JsonLinesLogger, OpenAi, Role};

const USAGE: &str = "gpterm [OPTIONS] [QUESTION]...";

/// Completes `!` commands at the prompt.
struct CommandHelper;

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let candidates = complete_command(&line[..pos])
            .into_iter()
            .map(String::from)
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for CommandHelper {
    type Hint = String;
}

impl Highlighter for CommandHelper {}

impl Validator for CommandHelper {}

impl Helper for CommandHelper {}

/// Main entry point for the gpterm application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, question) = ChatArgs::from_command_line_relaxed(USAGE);
    let config = match ChatConfig::try_from(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    let use_color = config.use_color;

    if args.list {
        for name in list_sessions(&config.storage_dir)? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut client = OpenAi::with_options(None, config.base_url.clone(), None)?;
    if let Some(path) = &config.log_path {
        client = client.with_logger(Arc::new(JsonLinesLogger::open(path)?));
    }
    let roles = load_roles(&config.storage_dir, &system_description())?;
    let storage_dir = config.storage_dir.clone();

    let mut session = match &args.resume {
        Some(name) => ChatSession::resume(client, config, roles, storage_dir.join(name))?,
        None => ChatSession::new(client, config, roles),
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;
    let mut renderer = PlainTextRenderer::with_color_and_interrupt(use_color, interrupted.clone());

    if !question.is_empty() {
        let question = question.join(" ");
        if let Err(err) = session.send_streaming(&question, &mut renderer).await {
            if !err.is_abort() {
                renderer.print_error(&format!("An error occurred: {err}"));
            }
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut rl: Editor<CommandHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(CommandHelper));
    let prompt = if use_color {
        format!("\n\x1b[1m{USER_COLOR}ASK: \x1b[0m")
    } else {
        "\nASK: ".to_string()
    };

    renderer.print_info(&format!(
        "gpterm (model: {}, role: {}). Type !help for commands.",
        session.model(),
        session.role().name
    ));
    if let Some(path) = session.session_path() {
        renderer.print_info(&format!(
            "Resumed {} with {} code blocks.",
            path.display(),
            session.blocks().len()
        ));
    }

    let mut clipboard = SystemClipboard::new();
    loop {
        interrupted.store(false, Ordering::Relaxed);

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                save(&mut session, &mut renderer).await;
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let message = match parse_command(&line) {
            None => line,
            Some(ChatCommand::Quit) => {
                save(&mut session, &mut renderer).await;
                break;
            }
            Some(ChatCommand::Kill) => break,
            Some(ChatCommand::Role) => {
                let name = session.cycle_role().name.clone();
                renderer.print_info(&format!("Role changed to {name}."));
                continue;
            }
            Some(ChatCommand::Model) => {
                let model = session.cycle_model().to_string();
                renderer.print_info(&format!("Model changed to {model}."));
                continue;
            }
            Some(ChatCommand::Tokens) => {
                renderer.print_info(&format!("Estimated tokens: {}", session.estimated_tokens()));
                continue;
            }
            Some(ChatCommand::Copy(id)) => {
                match session.copy_block(id, &mut clipboard) {
                    Ok(()) => renderer.print_info("Copied to clipboard"),
                    Err(err) if err.is_not_found() => renderer.print_error("Invalid identifier"),
                    Err(err) => renderer.print_error(&err.to_string()),
                }
                continue;
            }
            Some(ChatCommand::Temperature(value)) => {
                session.set_temperature(Some(value));
                renderer.print_info(&format!("Temperature set to {value:.2}"));
                continue;
            }
            Some(ChatCommand::ClearTemperature) => {
                session.set_temperature(None);
                renderer.print_info("Temperature reset to model default");
                continue;
            }
            Some(ChatCommand::History) => {
                print_history(session.messages(), use_color);
                continue;
            }
            Some(ChatCommand::Help) => {
                for line in help_text().lines() {
                    println!("    {line}");
                }
                continue;
            }
            Some(ChatCommand::Invalid(message)) => {
                renderer.print_error(&message);
                continue;
            }
            Some(ChatCommand::Multi) => {
                renderer.print_info(&format!(
                    "Multi-line input. Enter '{MULTI_LINE_END}' or hit Ctrl-D on a new line to finish:"
                ));
                let message = read_multi_line()?;
                renderer.print_info("Finished multi-line input.");
                if message.trim().is_empty() {
                    continue;
                }
                message
            }
        };

        if let Err(err) = session.send_streaming(&message, &mut renderer).await
            && !err.is_abort()
        {
            renderer.print_error(&format!("An error occurred: {err}"));
        }
    }

    Ok(())
}

fn read_multi_line() -> rustyline::Result<String> {
    let mut editor = DefaultEditor::new()?;
    let mut lines = Vec::new();
    loop {
        match editor.readline("") {
            Ok(line) if line.trim() == MULTI_LINE_END => break,
            Ok(line) => lines.push(line),
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(lines.join("\n"))
}

async fn save(session: &mut ChatSession<OpenAi>, renderer: &mut PlainTextRenderer) {
    match session.save().await {
        Ok(path) => renderer.print_info(&format!("Saved chat to {}", display_name(&path))),
        Err(err) => renderer.print_error(&format!("Failed to save chat: {err}")),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_history(messages: &[ChatMessage], use_color: bool) {
    for message in messages {
        let (label, color) = match message.role {
            Role::Assistant => ("GPT".to_string(), REPLY_COLOR),
            Role::User => (message.role.to_string().to_uppercase(), USER_COLOR),
            Role::System => (message.role.to_string().to_uppercase(), INFO_COLOR),
        };
        if use_color {
            println!("{color}{label}: {}\x1b[0m\n", message.content);
        } else {
            println!("{label}: {}\n", message.content);
        }
    }
}
