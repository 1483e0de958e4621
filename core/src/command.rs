use std::sync::OnceLock;

use regex::Regex;

/// Tools whose subcommand is part of the command identity. Any other command
/// collapses to its first token alone.
const SUBCOMMAND_TOOLS: &[&str] = &["editor", "str_replace_editor"];

/// Interpreter variants folded into one canonical name.
const COMMAND_ALIASES: &[(&str, &str)] = &[
    ("python3", "python"),
    ("python2", "python"),
    ("python3.11", "python"),
];

/// A leading run of `NAME=value` environment assignments.
fn env_assignment_prefix() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\s*(?:[A-Z_]+=[^ ]+\s*)+\s*").unwrap())
}

/// Split a command string into its `&&`/`;`-separated sub-commands using
/// POSIX tokenization, so separators inside quotes do not count as
/// boundaries. Returns `None` when tokenization fails (unbalanced quoting or
/// a trailing escape).
fn split_shell_commands(cmd: &str) -> Option<Vec<String>> {
    let tokens = shlex::split(cmd)?;

    let mut commands = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for token in tokens {
        if token == "&&" || token == ";" {
            if !current.is_empty() {
                commands.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        commands.push(current.join(" "));
    }
    Some(commands)
}

/// Strip leading environment assignments: `FOO=1 BAR=2 cmd` becomes `cmd`.
fn strip_env_assignments(action: &str) -> &str {
    match env_assignment_prefix().find(action) {
        Some(m) => &action[m.end()..],
        None => action,
    }
}

fn is_option(token: &str) -> bool {
    token.starts_with('-')
}

fn is_path_like(token: &str) -> bool {
    token.contains('/') || token.contains(".py")
}

/// Derive the base command of a raw action string, the signature used to
/// decide whether two actions are "the same command".
///
/// An action can carry leading environment assignments, several chained
/// sub-commands, quoting, and assorted arguments. This strips all of that
/// down to the command being run, so `cd x/y && editor create /tmp/f.py`
/// yields `editor create` and `PYTHONPATH=/x python3.11 /testbed/t.py`
/// yields `python`. Never fails: malformed input degrades to naive
/// splitting, and an action that strips to nothing yields an empty string.
pub fn base_command(action: &str) -> String {
    if action.trim().is_empty() {
        return String::new();
    }
    let action = strip_env_assignments(action);

    // The last sub-command of a chain is the meaningful one.
    let last = match split_shell_commands(action) {
        Some(commands) => commands.into_iter().next_back().unwrap_or_default(),
        None => action.rsplit("&&").next().unwrap_or(action).to_string(),
    };

    // Only the portion before the first quote is categorized.
    let unquoted = last
        .split('"')
        .next()
        .unwrap_or_default()
        .split('\'')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if unquoted.is_empty() {
        return String::new();
    }

    let tokens = shlex::split(&unquoted)
        .unwrap_or_else(|| unquoted.split_whitespace().map(str::to_string).collect());
    let mut parts: Vec<String> = tokens
        .into_iter()
        .take(2)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        tracing::debug!(action, "no command tokens left after normalizing action");
        return String::new();
    }

    // Second token survives only if it looks like a subcommand, not a flag
    // or a path argument.
    parts = {
        let mut kept = vec![parts[0].clone()];
        kept.extend(
            parts
                .into_iter()
                .skip(1)
                .filter(|p| !is_option(p) && !is_path_like(p)),
        );
        kept
    };

    if !SUBCOMMAND_TOOLS.contains(&parts[0].as_str()) && parts.len() > 1 {
        parts.truncate(1);
    }

    if let Some((_, alias)) = COMMAND_ALIASES.iter().find(|(from, _)| *from == parts[0]) {
        parts[0] = (*alias).to_string();
    }

    parts.join(" ")
}
