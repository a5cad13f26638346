//! Notification topic strings.

use gamesync_types::BlockEventKind;

const ATTACH_PREFIX: &str = "game-block-attach json ";
const DETACH_PREFIX: &str = "game-block-detach json ";

fn prefix(kind: BlockEventKind) -> &'static str {
    match kind {
        BlockEventKind::Attach => ATTACH_PREFIX,
        BlockEventKind::Detach => DETACH_PREFIX,
    }
}

/// Topic carrying `kind` notifications for `game_id`.
pub fn topic(kind: BlockEventKind, game_id: &str) -> String {
    format!("{}{}", prefix(kind), game_id)
}

/// Split a topic into its event kind and game id.
///
/// Returns `None` for topics that are not block notifications.
pub fn parse_topic(topic: &str) -> Option<(BlockEventKind, &str)> {
    [BlockEventKind::Attach, BlockEventKind::Detach]
        .into_iter()
        .find_map(|kind| topic.strip_prefix(prefix(kind)).map(|game_id| (kind, game_id)))
}
