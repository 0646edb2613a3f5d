//! The interactive chat loop.
//!
//! One task owns all session state. Stdin lines and turn events are joined
//! with `select!`; turn events mutate the store here, never on the turn
//! task, so the single-turn and rollback invariants hold without locking.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::auth::state::AuthState;
use crate::auth::AuthManager;
use crate::commands::{parse_input, render_help, ChatCommand, ParsedInput};
use crate::core::config::Config;
use crate::core::conversation::ConversationStore;
use crate::core::models::{family_for_model, find_builtin_model};
use crate::core::turn::{
    ChunkPacing, TurnEvent, TurnReceiver, TurnRequest, TurnRunner, TurnTag,
};
use crate::platform::http::HttpPlatform;
use crate::platform::{PlatformAuth, PlatformChat};

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct StagedImage {
    path: PathBuf,
    data_url: String,
}

/// All mutable session state, owned by the loop task.
pub struct ChatSession {
    store: ConversationStore,
    runner: TurnRunner,
    auth: AuthState,
    model_id: String,
    next_turn_id: u64,
    staged_image: Option<StagedImage>,
}

impl ChatSession {
    pub fn new(
        platform: Arc<dyn PlatformChat>,
        pacing: ChunkPacing,
        model_id: String,
        auth: AuthState,
    ) -> (Self, TurnReceiver) {
        let (runner, events) = TurnRunner::new(platform, pacing);
        (
            Self {
                store: ConversationStore::new(),
                runner,
                auth,
                model_id,
                next_turn_id: 0,
                staged_image: None,
            },
            events,
        )
    }

    fn handle_input(&mut self, input: &str) -> Flow {
        match parse_input(input) {
            ParsedInput::Message(text) => {
                self.submit_prompt(&text);
                Flow::Continue
            }
            ParsedInput::Command(command) => self.execute_command(command),
        }
    }

    fn submit_prompt(&mut self, text: &str) {
        let prompt = text.trim();
        if prompt.is_empty() {
            return;
        }
        if !self.auth.is_authenticated() {
            println!("⚠️  Authentication required. Run 'palabre auth' to sign in.");
            return;
        }
        if self.store.is_response_in_flight() {
            println!("⚠️  A response is still streaming. Wait for it to finish.");
            return;
        }

        if self.staged_image.is_some() {
            let accepts = family_for_model(&self.model_id)
                .map(|family| family.accepts_images())
                .unwrap_or(false);
            if !accepts {
                println!(
                    "⚠️  {} does not accept image attachments. Switch to a Grok model or /attach clear.",
                    self.model_id
                );
                return;
            }
        }

        let image = self.staged_image.take();
        let content = compose_message_content(prompt, image.is_some());

        let conversation_id = self.store.active_id().to_string();
        if let Err(err) = self.store.append_user_message(&conversation_id, &content) {
            println!("❌ {err}");
            return;
        }
        self.store.begin_streaming();

        self.next_turn_id += 1;
        self.runner.spawn_turn(TurnRequest {
            turn_id: self.next_turn_id,
            conversation_id,
            model_id: self.model_id.clone(),
            prompt: prompt.to_string(),
            image_url: image.map(|staged| staged.data_url),
        });
    }

    /// Apply one turn event. Returns true when the event was terminal.
    fn handle_event(&mut self, event: TurnEvent, tag: TurnTag) -> bool {
        match event {
            TurnEvent::Chunk(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
                self.store.append_stream_chunk(&text);
                false
            }
            TurnEvent::Completed { full_text } => {
                println!();
                if let Err(err) =
                    self.store
                        .complete_streaming(&tag.conversation_id, &full_text, &tag.model_id)
                {
                    debug!(conversation_id = %tag.conversation_id, error = %err, "Dropping completion for a deleted conversation");
                }
                true
            }
            TurnEvent::Failed(err) => {
                println!();
                println!("❌ {err}");
                if let Err(store_err) = self.store.fail_streaming(&tag.conversation_id) {
                    debug!(conversation_id = %tag.conversation_id, error = %store_err, "Dropping failure for a deleted conversation");
                }
                true
            }
        }
    }

    fn execute_command(&mut self, command: ChatCommand) -> Flow {
        match command {
            ChatCommand::Help => println!("{}", render_help()),
            ChatCommand::New => {
                self.store.new_conversation();
                println!("✓ New conversation started.");
            }
            ChatCommand::List => print!("{}", render_conversation_list(&self.store)),
            ChatCommand::Switch(arg) => self.switch_conversation(arg),
            ChatCommand::Delete(arg) => self.delete_conversation(arg),
            ChatCommand::Model(arg) => self.show_or_switch_model(arg),
            ChatCommand::Attach(arg) => self.manage_attachment(arg),
            ChatCommand::Whoami => match self.auth.user() {
                Some(user) => match &user.email {
                    Some(email) => println!("Signed in as {} <{}>.", user.username, email),
                    None => println!("Signed in as {}.", user.username),
                },
                None => println!("Not signed in."),
            },
            ChatCommand::Quit => {
                println!("Bye.");
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn switch_conversation(&mut self, arg: Option<String>) {
        let Some(arg) = arg else {
            println!("Usage: /switch <n>  (see /list)");
            return;
        };
        let Some(index) = resolve_index(&arg, self.store.conversations().len()) else {
            println!("❌ No conversation numbered '{arg}'. Use /list.");
            return;
        };
        let id = self.store.conversations()[index].id.clone();
        if let Err(err) = self.store.select_conversation(&id) {
            println!("❌ {err}");
            return;
        }
        println!("✓ Switched to '{}'.", self.store.active_conversation().title);
    }

    fn delete_conversation(&mut self, arg: Option<String>) {
        let id = match arg {
            Some(arg) => match resolve_index(&arg, self.store.conversations().len()) {
                Some(index) => self.store.conversations()[index].id.clone(),
                None => {
                    println!("❌ No conversation numbered '{arg}'. Use /list.");
                    return;
                }
            },
            None => self.store.active_id().to_string(),
        };

        let title = self
            .store
            .conversation(&id)
            .map(|c| c.title.clone())
            .unwrap_or_default();
        match self.store.delete_conversation(&id) {
            Ok(()) => {
                println!("✓ Deleted '{title}'.");
                println!("Now in '{}'.", self.store.active_conversation().title);
            }
            Err(err) => println!("❌ {err}"),
        }
    }

    fn show_or_switch_model(&mut self, arg: Option<String>) {
        let Some(model_id) = arg else {
            match family_for_model(&self.model_id) {
                Some(family) => println!("Model: {} ({})", self.model_id, family.display_name()),
                None => println!("Model: {}", self.model_id),
            }
            return;
        };
        let Some(family) = family_for_model(&model_id) else {
            println!("❌ Unsupported model '{model_id}'. See 'palabre models'.");
            return;
        };
        match find_builtin_model(&model_id) {
            Some(entry) => println!(
                "✓ Model set to {} ({}, {})",
                entry.id,
                entry.display_name,
                family.display_name()
            ),
            None => println!("✓ Model set to {model_id} ({})", family.display_name()),
        }
        self.model_id = model_id;
    }

    fn manage_attachment(&mut self, arg: Option<String>) {
        match arg.as_deref() {
            None => match &self.staged_image {
                Some(staged) => println!("Attached: {}", staged.path.display()),
                None => println!("No attachment staged. Usage: /attach <path>"),
            },
            Some("clear") => {
                self.staged_image = None;
                println!("✓ Attachment cleared.");
            }
            Some(path) => match stage_image(Path::new(path)) {
                Ok(staged) => {
                    println!(
                        "✓ Attached {}. It will ride along with your next message.",
                        staged.path.display()
                    );
                    self.staged_image = Some(staged);
                }
                Err(message) => println!("❌ {message}"),
            },
        }
    }
}

/// 1-based list position to vector index.
fn resolve_index(arg: &str, len: usize) -> Option<usize> {
    arg.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

fn compose_message_content(prompt: &str, has_attachment: bool) -> String {
    if has_attachment {
        format!("{prompt}\n\n[Images: 1 file uploaded]")
    } else {
        prompt.to_string()
    }
}

fn image_mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn stage_image(path: &Path) -> Result<StagedImage, String> {
    let Some(mime) = image_mime_for(path) else {
        return Err(format!(
            "'{}' is not a supported image (png, jpg, gif, webp).",
            path.display()
        ));
    };
    let bytes = std::fs::read(path)
        .map_err(|err| format!("Could not read '{}': {err}", path.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(StagedImage {
        path: path.to_path_buf(),
        data_url: format!("data:{mime};base64,{encoded}"),
    })
}

fn render_conversation_list(store: &ConversationStore) -> String {
    let mut out = String::new();
    for (position, conversation) in store.conversations().iter().enumerate() {
        let marker = if conversation.id == store.active_id() {
            "▸"
        } else {
            " "
        };
        out.push_str(&format!(
            "{marker} {}. {} ({} messages)\n",
            position + 1,
            conversation.title,
            conversation.messages.len()
        ));
    }
    out
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Connect, check identity, and run the read-eval loop until quit or EOF.
pub async fn run_chat(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let manager = AuthManager::new();
    let base_url = config.effective_base_url();
    let Some(token) = manager.resolve_token() else {
        println!("❌ Not signed in. Run 'palabre auth' first.");
        return Ok(());
    };

    let platform = Arc::new(HttpPlatform::new(&base_url, token));
    let mut auth = AuthState::new();
    auth.apply_check(platform.whoami().await?);

    match auth.user() {
        Some(user) => println!("✅ Signed in as {}.", user.username),
        None => println!("⚠️  The gateway rejected the stored token. Run 'palabre auth' to sign in again."),
    }

    let model_id = config.effective_model().to_string();
    println!("Chatting with {model_id}. Type /help for commands.");

    let (mut session, mut events) = ChatSession::new(
        platform as Arc<dyn PlatformChat>,
        ChunkPacing::from_config(&config),
        model_id,
        auth,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(input) => {
                        if session.handle_input(&input) == Flow::Quit {
                            break;
                        }
                        if !session.store.is_response_in_flight() {
                            print_prompt();
                        }
                    }
                    None => {
                        println!();
                        break;
                    }
                }
            }
            maybe_event = events.recv() => {
                if let Some((event, tag)) = maybe_event {
                    let terminal = session.handle_event(event, tag);
                    if terminal {
                        print_prompt();
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UserIdentity;
    use crate::core::conversation::Role;
    use crate::utils::test_utils::MockPlatform;
    use serde_json::json;
    use std::time::Duration;

    const TEST_PACING: ChunkPacing = ChunkPacing {
        words_per_chunk: 3,
        interval: Duration::ZERO,
    };

    fn authenticated() -> AuthState {
        let mut auth = AuthState::new();
        auth.apply_check(Some(UserIdentity {
            username: "ada".to_string(),
            email: None,
        }));
        auth
    }

    async fn drain_turn(session: &mut ChatSession, events: &mut TurnReceiver) {
        while let Some((event, tag)) = events.recv().await {
            if session.handle_event(event, tag) {
                break;
            }
        }
    }

    #[test]
    fn index_resolution_is_one_based_and_bounded() {
        assert_eq!(resolve_index("1", 3), Some(0));
        assert_eq!(resolve_index(" 3 ", 3), Some(2));
        assert_eq!(resolve_index("0", 3), None);
        assert_eq!(resolve_index("4", 3), None);
        assert_eq!(resolve_index("two", 3), None);
    }

    #[test]
    fn attachments_annotate_the_stored_message() {
        assert_eq!(compose_message_content("Look", false), "Look");
        assert_eq!(
            compose_message_content("Look", true),
            "Look\n\n[Images: 1 file uploaded]"
        );
    }

    #[test]
    fn image_mime_detection_is_extension_based() {
        assert_eq!(image_mime_for(Path::new("a.png")), Some("image/png"));
        assert_eq!(image_mime_for(Path::new("b.JPG")), Some("image/jpeg"));
        assert_eq!(image_mime_for(Path::new("c.webp")), Some("image/webp"));
        assert_eq!(image_mime_for(Path::new("d.pdf")), None);
        assert_eq!(image_mime_for(Path::new("noext")), None);
    }

    #[test]
    fn the_list_marks_the_active_conversation() {
        let mut store = ConversationStore::new();
        let first = store.active_id().to_string();
        store.append_user_message(&first, "Hello there").unwrap();
        store.complete_streaming(&first, "Hi", "gpt-5").unwrap();
        store.new_conversation();

        let listing = render_conversation_list(&store);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("▸ 1. New Conversation"));
        assert!(lines[1].contains("Hello there..."));
        assert!(lines[1].contains("(2 messages)"));
    }

    #[tokio::test]
    async fn unauthenticated_prompts_never_reach_the_gateway() {
        let platform = MockPlatform::new();
        let (mut session, _events) = ChatSession::new(
            platform.clone(),
            TEST_PACING,
            "x-ai/grok-4".to_string(),
            AuthState::new(),
        );

        session.submit_prompt("Hello");

        assert!(platform.calls().is_empty());
        assert!(session.store.active_conversation().messages.is_empty());
        assert!(!session.store.is_response_in_flight());
    }

    #[tokio::test]
    async fn a_full_turn_lands_the_reply_in_the_store() {
        let platform = MockPlatform::new();
        platform.push_stream(vec![Ok(json!({"text": "Hi "})), Ok(json!({"text": "there"}))]);

        let (mut session, mut events) = ChatSession::new(
            platform,
            TEST_PACING,
            "claude-sonnet-4".to_string(),
            authenticated(),
        );
        session.submit_prompt("Hello");
        assert!(session.store.is_response_in_flight());

        drain_turn(&mut session, &mut events).await;

        let conversation = session.store.active_conversation();
        assert_eq!(conversation.title, "Hello...");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].content, "Hi there");
        assert_eq!(
            conversation.messages[1].model.as_deref(),
            Some("claude-sonnet-4")
        );
        assert!(!session.store.is_response_in_flight());
    }

    #[tokio::test]
    async fn a_failed_turn_rolls_the_conversation_back() {
        let platform = MockPlatform::new();
        platform.push_error("network down");
        platform.push_error("network still down");

        let (mut session, mut events) = ChatSession::new(
            platform,
            TEST_PACING,
            "claude-sonnet-4".to_string(),
            authenticated(),
        );
        session.submit_prompt("Hello");
        drain_turn(&mut session, &mut events).await;

        assert!(session.store.active_conversation().messages.is_empty());
        assert!(!session.store.is_response_in_flight());
    }

    #[tokio::test]
    async fn a_midstream_switch_still_lands_the_reply_on_the_original_conversation() {
        let platform = MockPlatform::new();
        platform.push_stream(vec![Ok(json!({"text": "Hello!"}))]);

        let (mut session, mut events) = ChatSession::new(
            platform,
            TEST_PACING,
            "claude-sonnet-4".to_string(),
            authenticated(),
        );
        let original = session.store.active_id().to_string();
        session.submit_prompt("Hi");

        session.execute_command(ChatCommand::New);
        let switched = session.store.active_id().to_string();
        assert_ne!(original, switched);

        drain_turn(&mut session, &mut events).await;

        assert_eq!(
            session
                .store
                .conversation(&original)
                .unwrap()
                .messages
                .len(),
            2
        );
        assert!(session
            .store
            .conversation(&switched)
            .unwrap()
            .messages
            .is_empty());
    }

    #[tokio::test]
    async fn second_submissions_are_blocked_while_streaming() {
        let platform = MockPlatform::new();
        platform.push_stream(vec![Ok(json!({"text": "thinking"}))]);

        let (mut session, mut events) = ChatSession::new(
            platform.clone(),
            TEST_PACING,
            "claude-sonnet-4".to_string(),
            authenticated(),
        );
        session.submit_prompt("First");
        session.submit_prompt("Second");

        assert_eq!(platform.calls().len(), 1);
        drain_turn(&mut session, &mut events).await;
        assert_eq!(session.store.active_conversation().messages.len(), 2);
    }

    #[tokio::test]
    async fn attachments_are_refused_for_families_without_image_support() {
        let platform = MockPlatform::new();
        let (mut session, _events) = ChatSession::new(
            platform.clone(),
            TEST_PACING,
            "claude-sonnet-4".to_string(),
            authenticated(),
        );
        session.staged_image = Some(StagedImage {
            path: PathBuf::from("crab.png"),
            data_url: "data:image/png;base64,aGk=".to_string(),
        });

        session.submit_prompt("What is this?");

        assert!(platform.calls().is_empty());
        assert!(session.staged_image.is_some());
    }

    #[tokio::test]
    async fn staged_attachments_ride_on_the_next_turn_only() {
        let platform = MockPlatform::new();
        platform.push_complete(json!({"text": "a crab"}));
        platform.push_stream(vec![Ok(json!({"text": "hello again"}))]);

        let (mut session, mut events) = ChatSession::new(
            platform.clone(),
            TEST_PACING,
            "x-ai/grok-4".to_string(),
            authenticated(),
        );
        session.staged_image = Some(StagedImage {
            path: PathBuf::from("crab.png"),
            data_url: "data:image/png;base64,aGk=".to_string(),
        });

        session.submit_prompt("What is this?");
        drain_turn(&mut session, &mut events).await;

        session.submit_prompt("Thanks!");
        drain_turn(&mut session, &mut events).await;

        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].image_url.as_deref(),
            Some("data:image/png;base64,aGk=")
        );
        assert_eq!(calls[1].image_url, None);

        let messages = &session.store.active_conversation().messages;
        assert_eq!(
            messages[0].content,
            "What is this?\n\n[Images: 1 file uploaded]"
        );
        assert_eq!(messages[2].content, "Thanks!");
    }

    #[test]
    fn model_switching_validates_against_the_routing_table() {
        let platform = MockPlatform::new();
        let (mut session, _events) = ChatSession::new(
            platform,
            TEST_PACING,
            "x-ai/grok-4".to_string(),
            authenticated(),
        );

        session.execute_command(ChatCommand::Model(Some("gpt-5".to_string())));
        assert_eq!(session.model_id, "gpt-5");

        session.execute_command(ChatCommand::Model(Some("llama-3-70b".to_string())));
        assert_eq!(session.model_id, "gpt-5");
    }
}
