//! Slash commands typed at the chat prompt.
//!
//! Input that does not start with `/` is a chat message, as is any command
//! name we do not recognize. Parsing is argument capture only; validation
//! that needs session state happens in the chat loop.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    Message(String),
    Command(ChatCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    New,
    List,
    Switch(Option<String>),
    Delete(Option<String>),
    Model(Option<String>),
    Attach(Option<String>),
    Whoami,
    Quit,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
    },
    CommandSpec {
        name: "new",
        usage: "/new",
        help: "Start a new conversation and make it active.",
    },
    CommandSpec {
        name: "list",
        usage: "/list",
        help: "List conversations.",
    },
    CommandSpec {
        name: "switch",
        usage: "/switch <n>",
        help: "Switch to conversation n, as numbered by /list.",
    },
    CommandSpec {
        name: "delete",
        usage: "/delete [n]",
        help: "Delete conversation n, or the active one.",
    },
    CommandSpec {
        name: "model",
        usage: "/model [id]",
        help: "Show the active model, or switch to another.",
    },
    CommandSpec {
        name: "attach",
        usage: "/attach [path|clear]",
        help: "Attach an image to the next message (Grok models only).",
    },
    CommandSpec {
        name: "whoami",
        usage: "/whoami",
        help: "Show the signed-in gateway account.",
    },
    CommandSpec {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat.",
    },
    CommandSpec {
        name: "exit",
        usage: "/exit",
        help: "Leave the chat.",
    },
];

pub fn all_commands() -> &'static [CommandSpec] {
    COMMANDS
}

pub fn render_help() -> String {
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:<22} {}\n", command.usage, command.help));
    }
    help.push_str("Anything else is sent to the model.");
    help
}

pub fn parse_input(input: &str) -> ParsedInput {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return ParsedInput::Message(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return ParsedInput::Message(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();
    let arg = (!args.is_empty()).then(|| args.to_string());

    let command = match command_name.to_ascii_lowercase().as_str() {
        "help" => ChatCommand::Help,
        "new" => ChatCommand::New,
        "list" => ChatCommand::List,
        "switch" => ChatCommand::Switch(arg),
        "delete" => ChatCommand::Delete(arg),
        "model" => ChatCommand::Model(arg),
        "attach" => ChatCommand::Attach(arg),
        "whoami" => ChatCommand::Whoami,
        "quit" | "exit" => ChatCommand::Quit,
        _ => return ParsedInput::Message(input.to_string()),
    };
    ParsedInput::Command(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            parse_input("Hello there"),
            ParsedInput::Message("Hello there".to_string())
        );
    }

    #[test]
    fn known_commands_parse_case_insensitively() {
        assert_eq!(parse_input("/new"), ParsedInput::Command(ChatCommand::New));
        assert_eq!(parse_input("/NEW"), ParsedInput::Command(ChatCommand::New));
        assert_eq!(
            parse_input("  /list  "),
            ParsedInput::Command(ChatCommand::List)
        );
    }

    #[test]
    fn arguments_are_captured_and_trimmed() {
        assert_eq!(
            parse_input("/switch 2"),
            ParsedInput::Command(ChatCommand::Switch(Some("2".to_string())))
        );
        assert_eq!(
            parse_input("/delete   3  "),
            ParsedInput::Command(ChatCommand::Delete(Some("3".to_string())))
        );
        assert_eq!(
            parse_input("/model gpt-5"),
            ParsedInput::Command(ChatCommand::Model(Some("gpt-5".to_string())))
        );
    }

    #[test]
    fn missing_arguments_parse_as_none() {
        assert_eq!(
            parse_input("/switch"),
            ParsedInput::Command(ChatCommand::Switch(None))
        );
        assert_eq!(
            parse_input("/model"),
            ParsedInput::Command(ChatCommand::Model(None))
        );
        assert_eq!(
            parse_input("/attach"),
            ParsedInput::Command(ChatCommand::Attach(None))
        );
    }

    #[test]
    fn unknown_commands_fall_through_as_messages() {
        assert_eq!(
            parse_input("/frobnicate now"),
            ParsedInput::Message("/frobnicate now".to_string())
        );
        assert_eq!(parse_input("/"), ParsedInput::Message("/".to_string()));
    }

    #[test]
    fn quit_and_exit_are_synonyms() {
        assert_eq!(parse_input("/quit"), ParsedInput::Command(ChatCommand::Quit));
        assert_eq!(parse_input("/exit"), ParsedInput::Command(ChatCommand::Quit));
    }

    #[test]
    fn help_lists_every_command() {
        let help = render_help();
        for command in all_commands() {
            assert!(help.contains(command.usage), "missing {}", command.usage);
        }
    }
}
