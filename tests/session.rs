use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chat_console::app::{ChatSession, RecoveryChoice, SessionReply, UserPrompts};
use chat_console::config::SessionConfig;
use chat_console::coordinator::ExchangeError;
use chat_console::render::NullSink;
use completion_provider::CompletionProvider;
use completion_provider_mock::ScriptedProvider;
use conversation::Envelope;
use envelope_store::save_envelope;
use stream_ingest::RenderSink;

#[derive(Default)]
struct ScriptedPrompts {
    confirmations: VecDeque<bool>,
    choices: VecDeque<RecoveryChoice>,
    inspections: Vec<String>,
}

impl UserPrompts for ScriptedPrompts {
    fn confirm_short_prompt(&mut self, _input: &str) -> bool {
        self.confirmations.pop_front().unwrap_or(false)
    }

    fn recovery_choice(&mut self, _error: &ExchangeError) -> RecoveryChoice {
        self.choices.pop_front().unwrap_or(RecoveryChoice::Abandon)
    }

    fn show_inspection(&mut self, data: &str) {
        self.inspections.push(data.to_string());
    }
}

fn session_with(provider: Arc<dyn CompletionProvider>, config: SessionConfig) -> ChatSession {
    let save_root = std::env::temp_dir().join("chat-console-session-tests");
    ChatSession::new(
        provider,
        config,
        save_root,
        Box::new(|| Box::new(NullSink) as Box<dyn RenderSink + Send>),
    )
    .expect("built-in templates must produce a session")
}

fn conversational_session(provider: Arc<dyn CompletionProvider>) -> ChatSession {
    session_with(provider, SessionConfig::conversational_chat("scripted"))
}

#[test]
fn commands_answer_without_touching_the_provider() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let mut session =
        conversational_session(Arc::clone(&provider) as Arc<dyn CompletionProvider>);
    let mut prompts = ScriptedPrompts::default();

    assert!(matches!(
        session.handle_line("help", &mut prompts),
        SessionReply::Help(_)
    ));
    assert!(matches!(
        session.handle_line("params", &mut prompts),
        SessionReply::Params(_)
    ));
    let SessionReply::Data(data) = session.handle_line("context", &mut prompts) else {
        panic!("context must render data");
    };
    assert!(data.contains("## Messages"));
    assert!(matches!(
        session.handle_line("bye", &mut prompts),
        SessionReply::Quit
    ));
    assert_eq!(provider.run_count(), 0);
}

#[test]
fn short_prompts_need_confirmation() {
    let provider = Arc::new(ScriptedProvider::new(vec!["ok".to_string()]));
    let mut session =
        conversational_session(Arc::clone(&provider) as Arc<dyn CompletionProvider>);

    let mut declining = ScriptedPrompts::default();
    assert_eq!(
        session.handle_line("hi", &mut declining),
        SessionReply::Dismissed
    );
    assert_eq!(provider.run_count(), 0);

    let mut confirming = ScriptedPrompts {
        confirmations: VecDeque::from([true]),
        ..ScriptedPrompts::default()
    };
    assert!(matches!(
        session.handle_line("hi", &mut confirming),
        SessionReply::Answer { .. }
    ));
    assert_eq!(provider.run_count(), 1);
}

#[test]
fn a_completed_exchange_commits_user_and_assistant_turns() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        "Nice to ".to_string(),
        "meet you.".to_string(),
    ]));
    let mut session = conversational_session(provider);
    let mut prompts = ScriptedPrompts::default();

    let reply = session.handle_line("introduce yourself", &mut prompts);
    assert_eq!(
        reply,
        SessionReply::Answer {
            text: "Nice to meet you.".to_string(),
            attempts: 1,
        }
    );

    let turns = session.window().turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].content, "introduce yourself");
    assert_eq!(turns[2].content, "Nice to meet you.");
}

#[test]
fn recovery_loop_supports_inspect_and_retry() {
    let mut config = SessionConfig::conversational_chat("scripted");
    config.max_attempts = 1;

    let provider = Arc::new(
        ScriptedProvider::new(vec!["Recovered reply.".to_string()]).failing_attempts(1),
    );
    let mut session =
        session_with(Arc::clone(&provider) as Arc<dyn CompletionProvider>, config);

    let mut prompts = ScriptedPrompts {
        choices: VecDeque::from([RecoveryChoice::Inspect, RecoveryChoice::Retry]),
        ..ScriptedPrompts::default()
    };

    let reply = session.handle_line("please answer", &mut prompts);
    assert!(matches!(reply, SessionReply::Answer { ref text, .. } if text == "Recovered reply."));
    assert_eq!(prompts.inspections.len(), 1);
    assert!(prompts.inspections[0].contains("## Messages"));
    assert_eq!(provider.run_count(), 2);
}

#[test]
fn abandoning_a_failed_exchange_keeps_history_untouched() {
    let mut config = SessionConfig::conversational_chat("scripted");
    config.max_attempts = 1;

    let provider =
        Arc::new(ScriptedProvider::new(vec!["unseen".to_string()]).failing_attempts(9));
    let mut session = session_with(provider, config);
    let before = session.window().clone();

    let mut prompts = ScriptedPrompts::default();
    let reply = session.handle_line("please answer", &mut prompts);

    assert!(matches!(reply, SessionReply::Abandoned(_)));
    assert_eq!(session.window(), &before);
}

#[test]
fn loading_a_foreign_mode_envelope_is_rejected_and_window_unchanged() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("translate.json");
    let foreign = Envelope::from_window("translate", &[], &BTreeMap::new());
    save_envelope(&path, &foreign).expect("save should succeed");

    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let mut session = conversational_session(provider);
    let before = session.window().clone();

    let mut prompts = ScriptedPrompts::default();
    let reply = session.handle_line(&format!("load {}", path.display()), &mut prompts);

    let SessionReply::LoadRejected(reason) = reply else {
        panic!("foreign mode must be rejected, got {reply:?}");
    };
    assert!(reason.contains("translate"));
    assert_eq!(session.window(), &before, "rejected load must not change the window");
}

#[test]
fn save_then_load_round_trips_the_window() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path: PathBuf = dir.path().join("chat.json");

    let provider = Arc::new(ScriptedProvider::new(vec!["Reply one.".to_string()]));
    let mut session = conversational_session(provider);
    let mut prompts = ScriptedPrompts::default();

    assert!(matches!(
        session.handle_line("first question", &mut prompts),
        SessionReply::Answer { .. }
    ));
    let saved_state = session.window().clone();

    assert!(matches!(
        session.handle_line(&format!("save {}", path.display()), &mut prompts),
        SessionReply::Saved(_)
    ));
    assert!(matches!(
        session.handle_line("reset", &mut prompts),
        SessionReply::ResetDone
    ));
    assert_eq!(session.window().len(), 1);

    assert!(matches!(
        session.handle_line(&format!("load {}", path.display()), &mut prompts),
        SessionReply::Loaded(_)
    ));
    assert_eq!(session.window().turns(), saved_state.turns());
    assert_eq!(session.window().metadata(), saved_state.metadata());
}

#[test]
fn background_flat_session_streams_the_marked_field() {
    let mut config = SessionConfig::flat_chat("scripted");
    config.wait_timeout = Duration::from_secs(5);
    config.poll_interval = Duration::from_millis(25);

    let provider = Arc::new(ScriptedProvider::with_envelope_script("Flat reply."));
    let mut session = session_with(provider, config);
    let mut prompts = ScriptedPrompts::default();

    let reply = session.handle_line("render me an answer", &mut prompts);
    assert_eq!(
        reply,
        SessionReply::Answer {
            text: "Flat reply.".to_string(),
            attempts: 1,
        }
    );

    assert_eq!(session.window().len(), 3);
    assert_eq!(
        session.window().metadata().get("tokens"),
        Some(&serde_json::json!(42))
    );
}
