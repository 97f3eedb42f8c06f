//! Filesystem event handler for the notify watcher (hot-reload).

use std::path::Path;

use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind};

use super::core::{reload_into, SharedRules};

/// Handle a single filesystem event from the notify watcher.
///
/// Only events touching the rules file itself trigger a reload. Removal is
/// ignored so the last good rules stay active.
pub(super) fn handle_fs_event(event: &Event, rules_path: &Path, current: &SharedRules) {
    let relevant = matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    );
    if !relevant {
        return;
    }

    let target = rules_path.file_name();
    let touches_rules = event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == target);
    if touches_rules {
        let _ = reload_into(rules_path, current);
    }
}
