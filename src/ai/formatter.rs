//! Converts stored conversation history into provider-ready turns.

use crate::ai::turn::{Role, Turn};

/// Sender tag that maps to the user role. Every other tag maps to assistant.
pub const USER_SENDER: &str = "user";

/// A stored message that can be replayed to a provider.
pub trait HistoryMessage {
    /// Raw sender tag as persisted.
    fn sender(&self) -> &str;
    /// Message body.
    fn content(&self) -> &str;
}

/// Map a stored sender tag to a turn role.
#[must_use]
pub fn role_for_sender(sender: &str) -> Role {
    if sender == USER_SENDER {
        Role::User
    } else {
        Role::Assistant
    }
}

/// Format an already chronologically ordered history into turns.
///
/// Emits exactly one turn per message, in input order. Content is copied
/// verbatim and empty messages are kept.
#[must_use]
pub fn format_history<M: HistoryMessage>(messages: &[M]) -> Vec<Turn> {
    messages
        .iter()
        .map(|message| Turn::new(role_for_sender(message.sender()), message.content()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stored {
        sender: &'static str,
        content: &'static str,
    }

    impl HistoryMessage for Stored {
        fn sender(&self) -> &str {
            self.sender
        }

        fn content(&self) -> &str {
            self.content
        }
    }

    fn stored(sender: &'static str, content: &'static str) -> Stored {
        Stored { sender, content }
    }

    #[test]
    fn test_format_preserves_length_and_order() {
        let messages = vec![
            stored("user", "Hi"),
            stored("ai", "Hello"),
            stored("user", "Bye"),
        ];

        let turns = format_history(&messages);
        assert_eq!(turns.len(), messages.len());
        for (turn, message) in turns.iter().zip(&messages) {
            assert_eq!(turn.content(), message.content);
        }
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[1].role(), Role::Assistant);
        assert_eq!(turns[2].role(), Role::User);
    }

    #[test]
    fn test_unknown_sender_defaults_to_assistant() {
        let messages = vec![stored("", "a"), stored("bot", "b"), stored("User", "c")];
        let turns = format_history(&messages);
        assert!(turns.iter().all(|turn| turn.role() == Role::Assistant));
    }

    #[test]
    fn test_content_is_verbatim_and_empty_is_kept() {
        let messages = vec![
            stored("user", ""),
            stored("user", "  padded\n"),
            stored("user", "Hi"),
            stored("user", "Hi"),
        ];
        let turns = format_history(&messages);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content(), "");
        assert_eq!(turns[1].content(), "  padded\n");
        assert_eq!(turns[2], turns[3]);
    }

    #[test]
    fn test_format_is_idempotent() {
        let messages = vec![stored("user", "Hi"), stored("ai", "Hello")];
        assert_eq!(format_history(&messages), format_history(&messages));
    }
}
