use std::io::{self, Write};

use chat_console::app::{ChatSession, RecoveryChoice, SessionReply, UserPrompts};
use chat_console::config::{provider_from_env, SessionConfig};
use chat_console::coordinator::ExchangeError;
use chat_console::render::ConsoleSink;
use stream_ingest::RenderSink;
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (provider, configured_model) = provider_from_env().map_err(io::Error::other)?;
    let model = configured_model.unwrap_or_else(|| "scripted".to_string());

    let cwd = std::env::current_dir()?;
    let save_root = envelope_store::envelope_root(&cwd);

    let mut session = ChatSession::new(
        provider,
        SessionConfig::conversational_chat(model),
        save_root,
        Box::new(|| Box::new(ConsoleSink::default()) as Box<dyn RenderSink + Send>),
    )
    .map_err(io::Error::other)?;

    println!("chat_console - type 'help' for commands, 'bye' to leave");

    let mut prompts = ConsolePrompts;
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = read_line()? else {
            break;
        };

        match session.handle_line(&line, &mut prompts) {
            SessionReply::Quit => break,
            reply => print_reply(reply),
        }
    }

    Ok(())
}

fn print_reply(reply: SessionReply) {
    match reply {
        SessionReply::Empty | SessionReply::Quit => {}
        SessionReply::Help(text)
        | SessionReply::Data(text)
        | SessionReply::Params(text) => println!("{text}"),
        SessionReply::ResetDone => println!("Context and parameters have been reset."),
        SessionReply::Saved(path) => println!("Data has been saved to {}.", path.display()),
        SessionReply::Loaded(path) => println!("Data has been loaded from {}.", path.display()),
        SessionReply::LoadRejected(reason) => {
            println!("The file is not valid for this session: {reason}");
        }
        SessionReply::ClearScreen => print!("\x1b[2J\x1b[H"),
        SessionReply::Answer { text, .. } => println!("\n{text}"),
        SessionReply::Dismissed => println!("Prompt discarded."),
        SessionReply::Abandoned(reason) => println!("Exchange abandoned: {reason}"),
        SessionReply::Failed(reason) => println!("Error: {reason}"),
    }
}

struct ConsolePrompts;

impl UserPrompts for ConsolePrompts {
    fn confirm_short_prompt(&mut self, _input: &str) -> bool {
        println!("Proceed with this very short prompt? [y/N]");
        matches!(read_line(), Ok(Some(line)) if line.trim().eq_ignore_ascii_case("y"))
    }

    fn recovery_choice(&mut self, error: &ExchangeError) -> RecoveryChoice {
        println!("Exchange failed: {error}");
        println!("(r)etry, (a)bandon, or (i)nspect the current context?");

        match read_line() {
            Ok(Some(line)) => match line.trim().to_ascii_lowercase().as_str() {
                "r" | "retry" => RecoveryChoice::Retry,
                "i" | "inspect" => RecoveryChoice::Inspect,
                _ => RecoveryChoice::Abandon,
            },
            _ => RecoveryChoice::Abandon,
        }
    }

    fn show_inspection(&mut self, data: &str) {
        println!("{data}");
    }
}

/// Reads one line without holding a persistent stdin lock, so prompt
/// helpers can read between iterations.
fn read_line() -> io::Result<Option<String>> {
    let mut buffer = String::new();
    let bytes = io::stdin().read_line(&mut buffer)?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(buffer))
}
