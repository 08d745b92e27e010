//! Key patterns for archived match records.
//!
//! | Pattern | Value |
//! |---------|-------|
//! | `game:{id}:events` | JSON array of `GameEvent`, in append order |
//! | `game:{id}:metadata` | JSON `Game` descriptor |

use relay_types::GameId;

/// Key of the archived event history for `id`.
pub fn events_key(id: &GameId) -> String {
    format!("game:{id}:events")
}

/// Key of the archived `Game` descriptor for `id`.
pub fn metadata_key(id: &GameId) -> String {
    format!("game:{id}:metadata")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct_and_deterministic() {
        let id = GameId::new("abc-123");
        assert_eq!(events_key(&id), "game:abc-123:events");
        assert_eq!(metadata_key(&id), "game:abc-123:metadata");
        assert_eq!(events_key(&id), events_key(&GameId::new("abc-123")));
    }
}
