//! Interactive session layer.
//!
//! Owns the conversation window and drives the coordinator. Every error an
//! exchange can raise is surfaced here as a user-directed recovery loop
//! (retry, abandon and re-enter, or inspect the current context) and never
//! terminates the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use completion_provider::CompletionProvider;
use conversation::{ConversationWindow, Envelope, EnvelopeError, PromptMode, RequestBuilder};
use envelope_store::{load_envelope, save_envelope, save_envelope_to_root};
use stream_ingest::RenderSink;
use tracing::info;

use crate::commands::{parse_command, ChatCommand};
use crate::config::SessionConfig;
use crate::coordinator::{ExchangeCoordinator, ExchangeError};
use crate::templates::{conversational_template, flat_template_envelope, FLAT_CHAT_TEMPLATE};

/// Prompts shorter than this ask for confirmation before submission.
pub const MIN_PROMPT_LEN: usize = 5;

const HELP_TEXT: &str = "Commands:\n\
    - help, menu: show this help\n\
    - data, context: show current contextual data\n\
    - params, config: show call parameters\n\
    - reset: restore the conversation to its template state\n\
    - save [path]: write the envelope to a file\n\
    - load <path>: replace the conversation from a file\n\
    - clear: clear the screen\n\
    - bye, exit, quit: leave the session";

/// User decision after a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Retry,
    Abandon,
    Inspect,
}

/// Interactive questions the session needs answered. Implemented by the
/// console front end and scripted in tests.
pub trait UserPrompts {
    /// Whether a very short prompt should still be submitted.
    fn confirm_short_prompt(&mut self, input: &str) -> bool {
        let _ = input;
        true
    }

    /// What to do about a failed exchange.
    fn recovery_choice(&mut self, error: &ExchangeError) -> RecoveryChoice {
        let _ = error;
        RecoveryChoice::Abandon
    }

    /// Receives the formatted context when the user chooses to inspect it.
    fn show_inspection(&mut self, data: &str) {
        let _ = data;
    }
}

/// What the session did with one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReply {
    Empty,
    Help(String),
    Data(String),
    Params(String),
    ResetDone,
    Saved(PathBuf),
    Loaded(PathBuf),
    LoadRejected(String),
    ClearScreen,
    Quit,
    /// A completed exchange: the extracted reply, already committed.
    Answer { text: String, attempts: u32 },
    /// The user declined to submit or abandoned a failed exchange.
    Dismissed,
    Abandoned(String),
    /// A non-exchange failure (bad path, serialization, ...).
    Failed(String),
}

/// Produces a fresh render sink per exchange attempt.
pub type SinkFactory = Box<dyn FnMut() -> Box<dyn RenderSink + Send>>;

pub struct ChatSession {
    config: SessionConfig,
    window: ConversationWindow,
    builder: RequestBuilder,
    coordinator: ExchangeCoordinator,
    save_root: PathBuf,
    sink_factory: SinkFactory,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        config: SessionConfig,
        save_root: PathBuf,
        sink_factory: SinkFactory,
    ) -> Result<Self, EnvelopeError> {
        let template = match config.prompt_mode {
            PromptMode::Conversational => conversational_template()?,
            PromptMode::Flat => flat_template_envelope()?,
        };

        let window = ConversationWindow::new(
            template.turns()?,
            template.metadata(),
            config.retention_policy(),
        );

        let builder = match config.prompt_mode {
            PromptMode::Conversational => RequestBuilder::conversational(
                config.model.clone(),
                config.params.clone(),
                config.session_mode.clone(),
            ),
            PromptMode::Flat => RequestBuilder::flat(
                config.model.clone(),
                config.params.clone(),
                config.session_mode.clone(),
                FLAT_CHAT_TEMPLATE,
            ),
        };

        let coordinator = ExchangeCoordinator::new(provider, config.coordinator_config());

        Ok(Self {
            config,
            window,
            builder,
            coordinator,
            save_root,
            sink_factory,
        })
    }

    #[must_use]
    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn handle_line(&mut self, line: &str, prompts: &mut dyn UserPrompts) -> SessionReply {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return SessionReply::Empty;
        }

        if let Some(command) = parse_command(trimmed) {
            return self.run_command(command);
        }

        if trimmed.chars().count() < MIN_PROMPT_LEN && !prompts.confirm_short_prompt(trimmed) {
            return SessionReply::Dismissed;
        }

        self.submit(trimmed, prompts)
    }

    fn run_command(&mut self, command: ChatCommand) -> SessionReply {
        match command {
            ChatCommand::Help => SessionReply::Help(HELP_TEXT.to_string()),
            ChatCommand::ShowData => SessionReply::Data(self.format_data()),
            ChatCommand::ShowParams => SessionReply::Params(self.params_text()),
            ChatCommand::Reset => {
                self.window.reset();
                SessionReply::ResetDone
            }
            ChatCommand::Clear => SessionReply::ClearScreen,
            ChatCommand::Quit => SessionReply::Quit,
            ChatCommand::Save(path) => self.save(path.as_deref()),
            ChatCommand::Load(path) => self.load(path.as_deref()),
        }
    }

    fn submit(&mut self, input: &str, prompts: &mut dyn UserPrompts) -> SessionReply {
        loop {
            let request = match self.builder.build(&self.window, input) {
                Ok(request) => request,
                Err(error) => return SessionReply::Failed(error.to_string()),
            };

            let sink = (self.sink_factory)();
            match self
                .coordinator
                .completion(&mut self.window, &request, input, sink)
            {
                Ok(outcome) => {
                    return SessionReply::Answer {
                        text: outcome.extracted,
                        attempts: outcome.attempts,
                    };
                }
                Err(error) => loop {
                    match prompts.recovery_choice(&error) {
                        RecoveryChoice::Retry => break,
                        RecoveryChoice::Abandon => {
                            return SessionReply::Abandoned(error.to_string());
                        }
                        RecoveryChoice::Inspect => {
                            let data = self.format_data();
                            prompts.show_inspection(&data);
                        }
                    }
                },
            }
        }
    }

    fn save(&mut self, path: Option<&str>) -> SessionReply {
        let envelope = Envelope::from_window(
            &self.config.session_mode,
            self.window.turns(),
            self.window.metadata(),
        );

        let written = match path {
            Some(path) => {
                save_envelope(Path::new(path), &envelope).map(|()| PathBuf::from(path))
            }
            None => save_envelope_to_root(&self.save_root, &envelope),
        };

        match written {
            Ok(path) => {
                info!(path = %path.display(), "envelope saved");
                SessionReply::Saved(path)
            }
            Err(error) => SessionReply::Failed(error.to_string()),
        }
    }

    /// Replaces the window wholesale from a saved envelope. Any
    /// validation or parse failure rejects the load and leaves the window
    /// untouched.
    fn load(&mut self, path: Option<&str>) -> SessionReply {
        let Some(path) = path else {
            return SessionReply::Failed("load requires a file path".to_string());
        };

        let envelope = match load_envelope(Path::new(path), &self.config.session_mode) {
            Ok(envelope) => envelope,
            Err(error) => return SessionReply::LoadRejected(error.to_string()),
        };

        let turns = match envelope.turns() {
            Ok(turns) => turns,
            Err(error) => return SessionReply::LoadRejected(error.to_string()),
        };

        self.window.replace_contents(turns, envelope.metadata());
        SessionReply::Loaded(PathBuf::from(path))
    }

    /// Current context as markdown; rendering is the caller's concern.
    #[must_use]
    pub fn format_data(&self) -> String {
        let mut contextual = String::from("## Contextual Data\n");
        for (key, value) in self.window.metadata() {
            contextual.push_str(&format!("- **{key}**: {value}\n"));
        }

        let mut transcript = String::from("## Messages\n");
        for turn in self.window.turns() {
            transcript.push_str(&format!("{}: {}\n\n", turn.role.as_str(), turn.content));
        }

        format!(
            "# {} session\n\n{contextual}\n{transcript}",
            self.config.session_mode
        )
    }

    #[must_use]
    pub fn params_text(&self) -> String {
        let mut text = format!("# Current Parameter Values\n\n- model: {}\n", self.config.model);
        for (key, value) in &self.config.params {
            text.push_str(&format!("- {key}: {value}\n"));
        }
        text
    }
}
