use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::privileges::Privileges;
use crate::server::Server;

pub(crate) use mp::scrim_key_label;

mod clan;
mod general;
mod mp;
mod pool;

pub type CmdResult = anyhow::Result<Option<String>>;

/// Every callback has this shape; the dispatcher owns scheduling, error
/// containment and the response envelope.
pub type Callback = for<'a> fn(&'a Server, Context) -> BoxFuture<'a, CmdResult>;

/// A registered command.
pub struct Command {
    pub triggers: &'static [&'static str],
    pub privileges: Privileges,
    /// Hidden commands are only echoed to staff and the sender.
    pub hidden: bool,
    pub doc: &'static str,
    pub callback: Callback,
}

/// Where the triggering message was sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    /// A channel, by real name.
    Channel(String),
    /// A private message to the bot.
    Private,
}

/// Everything a callback gets to work with.
pub struct Context {
    pub sender_id: i32,
    pub trigger: String,
    pub args: Vec<String>,
    pub target: CommandTarget,
}

/// What the chat router does with a finished command.
pub struct CommandResponse {
    pub text: Option<String>,
    pub hidden: bool,
}

/// The nested command sets; the first token selects one, the next token is
/// dispatched inside it (defaulting to its help).
const SET_TRIGGERS: [&str; 3] = ["mp", "pool", "clan"];

/// Dispatch a prefixed chat message. `None` means no command matched and
/// the message should flow on as ordinary chat.
pub async fn process(
    server: &Server,
    sender_id: i32,
    target: CommandTarget,
    msg: &str,
) -> Option<CommandResponse> {
    let started = Instant::now();

    let stripped = msg.strip_prefix(&server.config.command_prefix)?;
    let mut tokens = stripped.trim().split(' ');
    let mut trigger = tokens.next().unwrap_or("").to_lowercase();
    let mut args: Vec<String> = tokens.map(str::to_string).collect();

    let sender_privileges = {
        let world = server.world.read().await;
        world.players.get(sender_id)?.privileges
    };

    let commands: &'static [Command] = if SET_TRIGGERS.contains(&trigger.as_str()) {
        let set = trigger;
        if args.is_empty() {
            args = vec!["help".to_string()];
        }
        trigger = args.remove(0).to_lowercase();

        match set.as_str() {
            "mp" => {
                if !mp_gate_allows(server, sender_id, &target, &trigger, sender_privileges).await {
                    return None;
                }
                mp::COMMANDS
            }
            "pool" => pool::COMMANDS,
            _ => clan::COMMANDS,
        }
    } else {
        general::COMMANDS
    };

    let command = commands.iter().find(|c| {
        c.triggers.contains(&trigger.as_str())
            && sender_privileges.contains(c.privileges)
    })?;

    let ctx = Context {
        sender_id,
        trigger,
        args,
        target,
    };

    let outcome = std::panic::AssertUnwindSafe((command.callback)(server, ctx))
        .catch_unwind()
        .await;

    let text = match outcome {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => {
            log::error!("command failed: {:#}", err);
            Some("An error occurred while running the command.".to_string())
        }
        Err(_) => {
            log::error!("command handler panicked");
            Some("An exception occurred when running the command.".to_string())
        }
    };

    match text {
        Some(text) => Some(CommandResponse {
            text: Some(format!("{} | Elapsed: {:.2?}", text, started.elapsed())),
            hidden: command.hidden,
        }),
        None => Some(CommandResponse {
            text: None,
            hidden: false,
        }),
    }
}

/// Multiplayer subcommands only run from the match's own chat, for its
/// referees (the host included) or a tournament manager; `mp help` is open.
async fn mp_gate_allows(
    server: &Server,
    sender_id: i32,
    target: &CommandTarget,
    trigger: &str,
    privileges: Privileges,
) -> bool {
    let world = server.world.read().await;
    let Some(match_id) = world.players.get(sender_id).and_then(|s| s.match_id) else {
        return false;
    };
    let Some(m) = world.matches.get(match_id) else {
        return false;
    };
    if *target != CommandTarget::Channel(m.chat_name()) {
        return false;
    }
    if matches!(trigger, "help" | "h") {
        return true;
    }
    m.referees().contains(&sender_id) || privileges.contains(Privileges::TOURNEY_MANAGER)
}

/// Build a set's help text for the privileges of the asking user.
fn set_help(prefix: &str, set_name: &str, commands: &[Command], privileges: Privileges) -> String {
    let mut lines = Vec::new();
    for cmd in commands {
        if cmd.doc.is_empty() || !privileges.contains(cmd.privileges) {
            continue;
        }
        lines.push(format!("{}{} {}: {}", prefix, set_name, cmd.triggers[0], cmd.doc));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_help_filters_by_privilege() {
        fn noop<'a>(_: &'a Server, _: Context) -> BoxFuture<'a, CmdResult> {
            Box::pin(async { Ok(None) })
        }

        let commands = [
            Command {
                triggers: &["open"],
                privileges: Privileges::UNRESTRICTED,
                hidden: false,
                doc: "for everyone",
                callback: noop,
            },
            Command {
                triggers: &["locked"],
                privileges: Privileges::DEVELOPER,
                hidden: true,
                doc: "for devs",
                callback: noop,
            },
        ];

        let help = set_help("!", "mp", &commands, Privileges::UNRESTRICTED);
        assert!(help.contains("!mp open"));
        assert!(!help.contains("!mp locked"));
    }
}
