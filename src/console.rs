//! Operator console commands.

/// Records shown by `logs` / `logs recent` when no count is given.
pub const DEFAULT_RECENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Reload,
    Exit,
    Tasks,
    LogsRecent(usize),
    LogsTask(String),
    LogsExport(String),
    RequestsList,
    RequestsGroup(i64),
    RequestsApprove(String),
    RequestsReject { flag: String, reason: Option<String> },
    RequestsClean,
    RequestsStats,
    Empty,
    Unknown(String),
}

/// Parse one console line.
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Empty;
    };
    let sub = words.next();
    let arg = words.next();

    match (head.to_ascii_lowercase().as_str(), sub) {
        ("help" | "?", _) => Command::Help,
        ("reload", _) => Command::Reload,
        ("exit" | "quit", _) => Command::Exit,
        ("tasks", _) => Command::Tasks,
        ("logs", None) => Command::LogsRecent(DEFAULT_RECENT),
        ("logs", Some("recent")) => match arg {
            None => Command::LogsRecent(DEFAULT_RECENT),
            Some(n) => n
                .parse()
                .map(Command::LogsRecent)
                .unwrap_or_else(|_| Command::Unknown(line.into())),
        },
        ("logs", Some("task")) => rest_after(line, 2)
            .map(Command::LogsTask)
            .unwrap_or_else(|| Command::Unknown(line.into())),
        ("logs", Some("export")) => rest_after(line, 2)
            .map(Command::LogsExport)
            .unwrap_or_else(|| Command::Unknown(line.into())),
        ("requests", Some("list")) => Command::RequestsList,
        ("requests", Some("group")) => arg
            .and_then(|g| g.parse().ok())
            .map(Command::RequestsGroup)
            .unwrap_or_else(|| Command::Unknown(line.into())),
        ("requests", Some("approve")) => arg
            .map(|f| Command::RequestsApprove(f.into()))
            .unwrap_or_else(|| Command::Unknown(line.into())),
        ("requests", Some("reject")) => match arg {
            Some(flag) => Command::RequestsReject {
                flag: flag.into(),
                reason: rest_after(line, 3),
            },
            None => Command::Unknown(line.into()),
        },
        ("requests", Some("clean")) => Command::RequestsClean,
        ("requests", Some("stats")) => Command::RequestsStats,
        _ => Command::Unknown(line.into()),
    }
}

/// Text after the first `n` words, trimmed. `None` when empty.
fn rest_after(line: &str, n: usize) -> Option<String> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

pub const HELP: &str = "\
Commands:
  help                              show this help
  reload                            reload the task catalog from the config file
  tasks                             list scheduled tasks and their next fire time
  logs | logs recent [n]            most recent execution records
  logs task <name>                  records of one task
  logs export <name>                export a task's records to a text file
  requests list                     suspended join requests
  requests group <id>               suspended requests for one group
  requests approve <flag>           approve a suspended request
  requests reject <flag> [reason]   reject a suspended request
  requests clean                    drop requests older than 7 days
  requests stats                    suspended requests per group
  exit                              stop the bot";
