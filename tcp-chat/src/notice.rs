//! Text of every line the server emits.

use crate::registry::ConnectionId;

pub fn joined(username: &str, id: ConnectionId) -> String {
    format!("{username} [{id}] joined the chat")
}

pub fn left(username: &str, id: ConnectionId) -> String {
    format!("{username} [{id}] left the chat")
}

pub fn chat(username: &str, text: &str) -> String {
    format!("{username}: {text}")
}

pub fn shutting_down() -> String {
    "Server is shutting down".to_string()
}

/// Lists the members already present when someone joins.
///
/// Returns `None` for an empty room so newcomers are not greeted with an empty list.
pub fn roster<'a, I>(members: I) -> Option<String>
where
    I: IntoIterator<Item = (ConnectionId, &'a str)>,
{
    let names: Vec<String> = members
        .into_iter()
        .map(|(id, username)| format!("{username} [{id}]"))
        .collect();

    if names.is_empty() {
        return None;
    }

    Some(format!("Already in the chat: {}", names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn notices_name_the_user_and_id() {
        let registry = Registry::new();
        let id = registry.next_connection_id();

        assert_eq!(joined("alice", id), "alice [1] joined the chat");
        assert_eq!(left("alice", id), "alice [1] left the chat");
        assert_eq!(chat("alice", "hello"), "alice: hello");
    }

    #[test]
    fn roster_joins_members_and_skips_empty_rooms() {
        let registry = Registry::new();
        let alice = registry.next_connection_id();
        let bob = registry.next_connection_id();

        assert_eq!(roster(Vec::<(ConnectionId, &str)>::new()), None);
        assert_eq!(
            roster(vec![(alice, "alice"), (bob, "bob")]),
            Some("Already in the chat: alice [1], bob [2]".to_string())
        );
    }
}
