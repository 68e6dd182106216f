//! Parsing of lines typed into the session prompt.

/// A user action entered at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/comment <stars> <text>` or plain text (rated later)
    Comment { stars: Option<u8>, content: String },
    /// `/summary <text>`
    Summary(String),
    /// `/minutes`
    Minutes,
    /// `/minutes save <text>`
    SaveMinutes(String),
    /// `/refresh`: fetch the comment list again
    Refresh,
    /// `/reconnect`
    Reconnect,
    /// `/quit` or `/exit`
    Quit,
    /// `/help`
    Help,
    /// Anything else starting with `/`
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /comment <1-10> <text>   post a rated comment
  /summary <text>          submit your summary when it is your turn
  /minutes                 show the meeting minutes
  /minutes save <text>     replace the meeting minutes
  /refresh                 reload the comment list
  /reconnect               reconnect after the connection was given up
  /quit                    leave the session
";

/// Parse one non-empty input line.
///
/// Text without a leading `/` is treated as an unrated comment so that the
/// missing rating is reported by the normal validation path.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Comment {
            stars: None,
            content: line.to_string(),
        };
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "comment" | "c" => {
            let (stars, content) = match args.split_once(char::is_whitespace) {
                Some((first, content)) => match first.parse::<u8>() {
                    Ok(stars) => (Some(stars), content.trim()),
                    Err(_) => (None, args),
                },
                None => match args.parse::<u8>() {
                    Ok(stars) => (Some(stars), ""),
                    Err(_) => (None, args),
                },
            };
            Command::Comment {
                stars,
                content: content.to_string(),
            }
        }
        "summary" | "s" => Command::Summary(args.to_string()),
        "minutes" => match args.split_once(char::is_whitespace) {
            Some(("save", text)) => Command::SaveMinutes(text.trim().to_string()),
            _ if args == "save" => Command::SaveMinutes(String::new()),
            _ => Command::Minutes,
        },
        "refresh" | "r" => Command::Refresh,
        "reconnect" => Command::Reconnect,
        "quit" | "exit" | "q" => Command::Quit,
        "help" | "h" | "?" => Command::Help,
        other => Command::Unknown(other.to_string()),
    }
}
