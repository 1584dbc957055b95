use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::installation::{EnterpriseId, TeamId, UserId};
use crate::errors::DomainError;

/// Slack refuses more reactions than this on a single message.
pub const MAX_REACTIONS: usize = 23;

const SKIN_TONE_MARKER: &[u8] = b"::skin-tone-";

/// Owner of a saved reaction list: a user inside a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkspaceUser {
    pub enterprise_id: Option<EnterpriseId>,
    pub team_id: TeamId,
    pub user_id: UserId,
}

impl WorkspaceUser {
    pub fn new(enterprise_id: Option<&str>, team_id: &str, user_id: &str) -> Self {
        Self {
            enterprise_id: enterprise_id.map(|id| EnterpriseId(id.to_owned())),
            team_id: TeamId(team_id.to_owned()),
            user_id: UserId(user_id.to_owned()),
        }
    }
}

/// An emoji short name without colons, e.g. `thumbsup` or `thumbsup::skin-tone-2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmojiName(String);

impl EmojiName {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let bytes = raw.as_bytes();
        let name_len = bytes.iter().take_while(|byte| is_name_byte(**byte)).count();
        if name_len == 0 {
            return Err(DomainError::InvalidEmoji(raw.to_owned()));
        }
        if name_len == bytes.len() {
            return Ok(Self(raw.to_owned()));
        }

        let Some(rest) = bytes[name_len..].strip_prefix(SKIN_TONE_MARKER) else {
            return Err(DomainError::InvalidEmoji(raw.to_owned()));
        };
        if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
            return Err(DomainError::InvalidEmoji(raw.to_owned()));
        }

        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with any skin-tone modifier removed.
    pub fn base(&self) -> &str {
        match self.0.find("::") {
            Some(index) => &self.0[..index],
            None => &self.0,
        }
    }
}

impl fmt::Display for EmojiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered emoji list; order is the order reactions are applied in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReactionList(Vec<EmojiName>);

impl ReactionList {
    pub fn new(emoji: Vec<EmojiName>) -> Self {
        Self(emoji)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[EmojiName] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmojiName> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(EmojiName::as_str).collect()
    }

    /// Keeps emoji whose base name is in `known`, preserving order.
    pub fn retain_known(self, known: &HashSet<String>) -> Self {
        Self(self.0.into_iter().filter(|emoji| known.contains(emoji.base())).collect())
    }

    /// Saved emoji that are not yet in `already_applied`, in saved order.
    pub fn pending_after(&self, already_applied: &[EmojiName]) -> Vec<EmojiName> {
        self.0.iter().filter(|emoji| !already_applied.contains(emoji)).cloned().collect()
    }

    /// `:a: :b:` rendering used in command responses.
    pub fn to_display(&self) -> String {
        self.0.iter().map(|emoji| format!(":{emoji}:")).collect::<Vec<_>>().join(" ")
    }
}

impl FromIterator<EmojiName> for ReactionList {
    fn from_iter<T: IntoIterator<Item = EmojiName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Pulls `:name:` and `:name::skin-tone-N:` tokens out of free text in order of appearance,
/// dropping repeats.
pub fn extract_emoji(text: &str) -> ReactionList {
    let bytes = text.as_bytes();
    let mut found: Vec<EmojiName> = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b':' {
            index += 1;
            continue;
        }

        match match_emoji_at(bytes, index) {
            Some(closing) => {
                let name = &text[index + 1..closing];
                if !found.iter().any(|emoji| emoji.as_str() == name) {
                    found.push(EmojiName(name.to_owned()));
                }
                index = closing + 1;
            }
            None => index += 1,
        }
    }

    ReactionList(found)
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase()
        || byte.is_ascii_digit()
        || matches!(byte, b'-' | b'_' | b'+' | b'\'')
}

// Returns the index of the closing colon of an emoji token opening at `start`.
fn match_emoji_at(bytes: &[u8], start: usize) -> Option<usize> {
    let name_start = start + 1;
    let name_len = bytes.get(name_start..)?.iter().take_while(|byte| is_name_byte(**byte)).count();
    let colon = name_start + name_len;
    if name_len == 0 || bytes.get(colon) != Some(&b':') {
        return None;
    }

    Some(match_skin_tone(bytes, colon).unwrap_or(colon))
}

fn match_skin_tone(bytes: &[u8], colon: usize) -> Option<usize> {
    let rest = bytes.get(colon..)?.strip_prefix(SKIN_TONE_MARKER)?;
    let digits = rest.iter().take_while(|byte| byte.is_ascii_digit()).count();
    if digits == 0 || rest.get(digits) != Some(&b':') {
        return None;
    }

    Some(colon + SKIN_TONE_MARKER.len() + digits)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{extract_emoji, EmojiName, ReactionList};

    fn list(names: &[&str]) -> ReactionList {
        names.iter().map(|name| EmojiName::parse(name).expect("valid emoji")).collect()
    }

    #[test]
    fn extracts_adjacent_emoji_in_order() {
        let parsed = extract_emoji(":+1::eyes::clap:");

        assert_eq!(parsed.names(), vec!["+1", "eyes", "clap"]);
    }

    #[test]
    fn keeps_skin_tone_modifiers_and_drops_duplicates() {
        let parsed = extract_emoji("nice :thumbsup::skin-tone-2: :tada: and :tada: again :wave:");

        assert_eq!(parsed.names(), vec!["thumbsup::skin-tone-2", "tada", "wave"]);
    }

    #[test]
    fn ignores_text_without_valid_tokens() {
        assert!(extract_emoji("hello there").is_empty());
        assert!(extract_emoji(":: :Upper: : :").is_empty());
        assert!(extract_emoji("").is_empty());
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert!(EmojiName::parse("thumbsup").is_ok());
        assert!(EmojiName::parse("thumbsup::skin-tone-3").is_ok());
        assert!(EmojiName::parse("").is_err());
        assert!(EmojiName::parse("thumbs up").is_err());
        assert!(EmojiName::parse("thumbsup::skin-tone-").is_err());
        assert!(EmojiName::parse(":wave:").is_err());
    }

    #[test]
    fn retain_known_checks_base_name() {
        let known: HashSet<String> = ["thumbsup", "tada"].map(str::to_owned).into();
        let filtered = list(&["thumbsup::skin-tone-2", "made-up", "tada"]).retain_known(&known);

        assert_eq!(filtered.names(), vec!["thumbsup::skin-tone-2", "tada"]);
    }

    #[test]
    fn pending_after_preserves_saved_order() {
        let saved = list(&["a", "b", "c", "d"]);
        let applied = list(&["c", "a"]).as_slice().to_vec();

        let pending = saved.pending_after(&applied);

        assert_eq!(pending.iter().map(EmojiName::as_str).collect::<Vec<_>>(), vec!["b", "d"]);
    }

    #[test]
    fn display_wraps_names_in_colons() {
        assert_eq!(list(&["a", "b"]).to_display(), ":a: :b:");
    }
}
