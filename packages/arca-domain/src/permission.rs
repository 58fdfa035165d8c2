use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved username meaning "every caller unless overridden by an exact entry".
pub const WILDCARD_USER: &str = "*";
/// Delimiter of the encoded permission string. Usernames must not contain it.
pub const PERMISSION_DELIMITER: char = '|';

/// Access level attached to a (knowledge item, user) pair. Totally ordered;
/// anything above `None` grants read visibility at retrieval time.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
	#[default]
	None,
	Read,
	Write,
	Owner,
}
impl Permission {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::None => "NONE",
			Self::Read => "READ",
			Self::Write => "WRITE",
			Self::Owner => "OWNER",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"NONE" => Some(Self::None),
			"READ" => Some(Self::Read),
			"WRITE" => Some(Self::Write),
			"OWNER" => Some(Self::Owner),
			_ => None,
		}
	}

	pub fn grants_read(&self) -> bool {
		*self > Self::None
	}
}

/// Usernames are restricted to ASCII letters and digits. The vector store
/// probes the encoded permission string through a word-tokenized full-text
/// index; punctuation or whitespace inside a name would split it into several
/// index tokens, and a caller holding one of those fragments would match the
/// grant.
pub fn is_valid_username(username: &str) -> bool {
	if username == WILDCARD_USER {
		return true;
	}

	!username.is_empty() && username.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

/// Resolves the effective level for a caller: exact entry, else wildcard entry,
/// else `None`.
pub fn effective_permission(entries: &HashMap<String, Permission>, username: &str) -> Permission {
	if let Some(level) = entries.get(username) {
		return *level;
	}

	entries.get(WILDCARD_USER).copied().unwrap_or(Permission::None)
}

/// Encodes the qualifying usernames (level above `None`) as a single
/// delimiter-wrapped string, e.g. `{"alice","bob"}` -> `|alice|bob|`.
///
/// The vector store has no set-membership operator; wrapping every name in the
/// delimiter turns membership into a containment test against `|<caller>|`.
/// Usernames are sorted so the encoding is canonical and repeated
/// synchronization of the same state is byte-identical.
pub fn encode_permissions<'a, I>(qualifying: I) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	let mut usernames: Vec<&str> = qualifying.into_iter().collect();

	usernames.sort_unstable();
	usernames.dedup();

	if usernames.is_empty() {
		return String::new();
	}

	let mut out = String::with_capacity(usernames.iter().map(|name| name.len() + 1).sum::<usize>() + 1);

	out.push(PERMISSION_DELIMITER);

	for username in usernames {
		out.push_str(username);
		out.push(PERMISSION_DELIMITER);
	}

	out
}

/// The caller-side containment probe: `|<username>|`. Anonymous callers probe
/// with the wildcard user.
pub fn probe_for(username: &str) -> String {
	format!("{PERMISSION_DELIMITER}{username}{PERMISSION_DELIMITER}")
}

/// Membership test against an encoded permission string. The empty encoding
/// matches no probe.
pub fn contains_user(encoded: &str, username: &str) -> bool {
	encoded.contains(&probe_for(username))
}

/// Inverse of [`encode_permissions`] for delimiter-free username sets.
pub fn decode_permissions(encoded: &str) -> Vec<String> {
	encoded
		.split(PERMISSION_DELIMITER)
		.filter(|part| !part.is_empty())
		.map(str::to_string)
		.collect()
}

/// Whether the encoded string grants the wildcard identity.
pub fn grants_any(encoded: &str) -> bool {
	contains_user(encoded, WILDCARD_USER)
}
