/// Session command words recognized in user input. Anything that does not
/// parse as a command is a prompt submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    ShowData,
    ShowParams,
    Reset,
    Save(Option<String>),
    Load(Option<String>),
    Clear,
    Quit,
}

pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    let mut words = trimmed.split_whitespace();
    let head = words.next()?.to_ascii_lowercase();
    let argument = words.next().map(str::to_string);

    // Commands take at most one argument; longer lines are prompts.
    if words.next().is_some() {
        return None;
    }

    let parsed = match head.as_str() {
        "help" | "menu" | "commands" | "?" if argument.is_none() => ChatCommand::Help,
        "data" | "context" if argument.is_none() => ChatCommand::ShowData,
        "params" | "settings" | "config" if argument.is_none() => ChatCommand::ShowParams,
        "reset" if argument.is_none() => ChatCommand::Reset,
        "clear" | "clean" if argument.is_none() => ChatCommand::Clear,
        "bye" | "exit" | "quit" if argument.is_none() => ChatCommand::Quit,
        "save" => ChatCommand::Save(argument),
        "load" => ChatCommand::Load(argument),
        _ => return None,
    };

    Some(parsed)
}
