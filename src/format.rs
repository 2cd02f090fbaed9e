// src/format.rs
use crate::models::server::ServerSnapshot;

/// Discord's hard limit on channel names.
pub const CHANNEL_NAME_CAP: usize = 100;

const OFFLINE_PREFIX: &str = "[OFFLINE] ";

/// Computes the channel name for a snapshot.
///
/// `label` is the entry's stored name; when absent the fetched server name is
/// used. An offline server ignores the template entirely. Placeholders other
/// than `{players}`, `{max}`, `{name}` and `{status}` are left as typed. The
/// result is cut to `cap` characters.
pub fn channel_name(
    template: &str,
    snapshot: &ServerSnapshot,
    label: Option<&str>,
    cap: usize,
) -> String {
    let label = label.unwrap_or(&snapshot.name);

    let full = if snapshot.is_offline() {
        format!("{}{}", OFFLINE_PREFIX, label)
    } else {
        substitute(template, snapshot, label)
    };

    truncate(full, cap)
}

fn substitute(template: &str, snapshot: &ServerSnapshot, label: &str) -> String {
    let mut out = String::with_capacity(template.len() + label.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        let replaced = tail.find('}').and_then(|close| {
            let value = match &tail[1..close] {
                "players" => snapshot.players.to_string(),
                "max" => snapshot.max_players.to_string(),
                "name" => label.to_string(),
                "status" => snapshot.status.to_string(),
                _ => return None,
            };
            Some((value, close + 1))
        });

        match replaced {
            Some((value, consumed)) => {
                out.push_str(&value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate(name: String, cap: usize) -> String {
    match name.char_indices().nth(cap) {
        Some((cut, _)) => name[..cut].to_string(),
        None => name,
    }
}
