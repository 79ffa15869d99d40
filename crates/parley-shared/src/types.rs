use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::CONVERSATION_ID_SEPARATOR;
use crate::error::IdError;

// User identity = opaque id issued by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap an id issued by the auth provider.
    ///
    /// Ids become document path segments, so `/` is rejected.  The
    /// conversation id separator is rejected too, so every pair of ids maps
    /// to a distinct conversation.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(c) = s
            .chars()
            .find(|c| *c == '/' || *c == CONVERSATION_ID_SEPARATOR || c.is_whitespace())
        {
            return Err(IdError::ForbiddenCharacter(c));
        }
        Ok(Self(s.to_string()))
    }

    /// Generate a fresh random id (used by the local auth provider).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, IdError> {
        Self::parse(&s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic id of the conversation between two users.
///
/// The two user ids are sorted and joined, so both participants derive the
/// same id without coordination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}{CONVERSATION_ID_SEPARATOR}{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One presence session (one running client) of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn test_conversation_id_is_order_independent() {
        let pairs = [("1", "2"), ("alice", "bob"), ("zz", "a"), ("same", "same")];
        for (a, b) in pairs {
            assert_eq!(
                ConversationId::between(&uid(a), &uid(b)),
                ConversationId::between(&uid(b), &uid(a))
            );
        }
    }

    #[test]
    fn test_conversation_id_format() {
        let id = ConversationId::between(&uid("bob"), &uid("alice"));
        assert_eq!(id.as_str(), "alice_bob");
    }

    #[test]
    fn test_user_id_rejects_path_characters() {
        assert_eq!(UserId::parse(""), Err(IdError::Empty));
        assert_eq!(UserId::parse("a/b"), Err(IdError::ForbiddenCharacter('/')));
        assert_eq!(UserId::parse("a b"), Err(IdError::ForbiddenCharacter(' ')));
    }

    #[test]
    fn test_user_id_rejects_conversation_separator() {
        assert_eq!(
            UserId::parse("a_b"),
            Err(IdError::ForbiddenCharacter(CONVERSATION_ID_SEPARATOR))
        );
    }

    #[test]
    fn test_stored_ids_are_validated() {
        let id: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(id, uid("alice"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
        assert!(serde_json::from_str::<UserId>("\"a_b\"").is_err());
    }

    #[test]
    fn test_distinct_pairs_have_distinct_conversations() {
        let ids = ["a", "b", "c", "ab", "bc", "abc"];
        let mut seen = std::collections::HashMap::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i..] {
                let cid = ConversationId::between(&uid(a), &uid(b));
                if let Some(previous) = seen.insert(cid.clone(), (*a, *b)) {
                    panic!("{previous:?} and {:?} share {cid}", (a, b));
                }
            }
        }
        assert!(UserId::generate().as_str().chars().all(|c| c != CONVERSATION_ID_SEPARATOR));
    }

    #[test]
    fn test_short() {
        assert_eq!(uid("0123456789abcdef").short(), "01234567");
        assert_eq!(uid("abc").short(), "abc");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(UserId::generate(), UserId::generate());
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
