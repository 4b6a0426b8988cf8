//! Parsing of REPL input lines.

use relay_shared::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/add <id> [name...]`
    Add { id: String, name: String },
    /// `/del <id>`
    Delete(UserId),
    /// `/open <id>`
    Open(UserId),
    /// `/close`
    Close,
    /// `/list`
    List,
    /// `/history`
    History,
    /// `/search <prefix>`
    Search(String),
    /// `/read <id>`
    Read(UserId),
    /// `/name <display name...>`
    Name(String),
    /// `/whoami`
    WhoAmI,
    /// `/newid`
    NewId,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Anything not starting with `/` is sent to the open conversation.
    Say(String),
}

pub const HELP: &str = "\
/add <id> [name]   add a contact
/del <id>          remove a contact
/open <id>         open the conversation with a user
/close             close the open conversation
/list              show the roster
/history           show the open conversation
/search <prefix>   find users by id prefix
/read <id>         clear unread messages from a user
/name <name>       set your display name
/whoami            show your id and name
/newid             switch to a freshly generated id
/quit              exit
<text>             send text to the open conversation";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args = parts.next().unwrap_or_default().trim();

    let user = |what: &str| -> Result<UserId, String> {
        if args.is_empty() {
            return Err(format!("usage: /{what} <id>"));
        }
        UserId::parse(args).map_err(|e| e.to_string())
    };

    let command = match verb.as_str() {
        "add" => {
            let mut words = args.splitn(2, char::is_whitespace);
            let id = words.next().unwrap_or_default().to_string();
            if id.is_empty() {
                return Err("usage: /add <id> [name]".into());
            }
            let name = words.next().unwrap_or_default().trim().to_string();
            Command::Add { id, name }
        }
        "del" | "delete" => Command::Delete(user("del")?),
        "open" => Command::Open(user("open")?),
        "close" => Command::Close,
        "list" | "ls" => Command::List,
        "history" => Command::History,
        "search" => Command::Search(args.to_string()),
        "read" => Command::Read(user("read")?),
        "name" => {
            if args.is_empty() {
                return Err("usage: /name <display name>".into());
            }
            Command::Name(args.to_string())
        }
        "whoami" => Command::WhoAmI,
        "newid" => Command::NewId,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}
