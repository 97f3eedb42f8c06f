//! Tests for the rules loader module.

use std::fs;
use std::path::PathBuf;

use notify::event::{DataChange, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tempfile::TempDir;

use super::watcher::handle_fs_event;
use super::*;
use crate::match_rules::{MatchMode, MatchRules};

const VALID_RULES_YAML: &str = r#"
keywords: [merger, split]
exclusions: [IR meeting]
"#;

fn temp_rules(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create tempdir");
    let path = dir.path().join("rules.yml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

fn modify_event(path: &PathBuf) -> Event {
    Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.clone())
}

#[test]
fn open_loads_valid_file() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();
    assert_eq!(loader.current().keywords, vec!["merger", "split"]);
}

#[test]
fn open_rejects_invalid_file() {
    let (_dir, path) = temp_rules("mode: and\n");
    assert!(RulesLoader::open(&path).is_err());
}

#[test]
fn reload_keeps_previous_on_bad_edit() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();

    fs::write(&path, "keywords: [ unterminated").unwrap();
    assert!(loader.reload().is_err());
    assert_eq!(loader.current().keywords, vec!["merger", "split"]);

    fs::write(&path, "keywords: [dividend]\n").unwrap();
    loader.reload().unwrap();
    assert_eq!(loader.current().keywords, vec!["dividend"]);
}

#[test]
fn fs_event_for_rules_file_reloads() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();

    fs::write(&path, "keywords: [a]\nand_groups: [[b, c]]\nmode: mixed\n").unwrap();
    handle_fs_event(&modify_event(&path), &path, &loader.shared());

    let rules = loader.current();
    assert_eq!(rules.mode, MatchMode::Mixed);
    assert_eq!(rules.and_groups.len(), 1);
}

#[test]
fn fs_event_for_other_file_is_ignored() {
    let (dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();

    fs::write(&path, "keywords: [changed]\n").unwrap();
    let other = dir.path().join("other.yml");
    handle_fs_event(&modify_event(&other), &path, &loader.shared());
    assert_eq!(loader.current().keywords, vec!["merger", "split"]);
}

#[test]
fn removal_keeps_rules() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();
    fs::remove_file(&path).unwrap();
    let event = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
    handle_fs_event(&event, &path, &loader.shared());
    assert_eq!(loader.current().keywords.len(), 2);
}

#[test]
fn replace_persists_atomically() {
    let (dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();

    let rules = MatchRules {
        keywords: vec!["buyback".into()],
        ..MatchRules::default()
    };
    loader.replace(rules).unwrap();
    assert!(!dir.path().join(".rules.yml.tmp").exists());

    let reopened = RulesLoader::open(&path).unwrap();
    assert_eq!(reopened.current().keywords, vec!["buyback"]);
}

#[test]
fn replace_rejects_invalid_rules() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let loader = RulesLoader::open(&path).unwrap();
    assert!(loader.replace(MatchRules::default()).is_err());
    assert_eq!(loader.current().keywords.len(), 2);
}

#[test]
fn open_or_init_writes_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/rules.yml");
    let defaults = MatchRules {
        keywords: vec!["merger".into()],
        ..MatchRules::default()
    };
    let loader = RulesLoader::open_or_init(&path, defaults).unwrap();
    assert!(path.exists());
    assert_eq!(loader.current().keywords, vec!["merger"]);
}

#[test]
fn watch_starts_on_rules_directory() {
    let (_dir, path) = temp_rules(VALID_RULES_YAML);
    let mut loader = RulesLoader::open(&path).unwrap();
    loader.watch().unwrap();
    assert!(loader.is_watching());
    assert_eq!(loader.current().keywords, vec!["merger", "split"]);
}
