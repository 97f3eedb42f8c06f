//! Watch-rule file loader with hot-reload via `notify` watcher.
//!
//! Watches the directory holding the rules file and re-parses the file on
//! create/modify/rename. An edit that fails to parse or validate is logged
//! and the previous rules stay active.

mod core;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::RulesLoader;
