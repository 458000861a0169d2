// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::tempdir;

fn write_fleet(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

const BASIC_FLEET: &str = r#"
name: newsroom
defaults:
  model: claude-sonnet-4
agents:
  writer:
    description: writes things
    schedules:
      tick:
        type: interval
        interval: 30m
        prompt: write
  editor:
    description: edits things
    model: claude-opus-4
    max_concurrent: 3
"#;

#[test]
fn loads_a_basic_fleet() {
    let dir = tempdir().unwrap();
    let path = write_fleet(dir.path(), "fleet.yaml", BASIC_FLEET);
    let config = load_config_from(&path).unwrap();

    assert_eq!(config.fleet_name.as_deref(), Some("newsroom"));
    assert_eq!(config.agent_names().collect::<Vec<_>>(), vec!["writer", "editor"]);
    assert_eq!(config.state_dir, config.config_dir.join("state"));

    let writer = config.agent("writer").unwrap();
    // Fleet default applied
    assert_eq!(writer.def.model.as_deref(), Some("claude-sonnet-4"));
    assert_eq!(writer.max_concurrent(), 1);
    // Working dir defaults to config dir
    assert_eq!(writer.working_dir, config.config_dir);

    let editor = config.agent("editor").unwrap();
    // Explicit value wins over default
    assert_eq!(editor.def.model.as_deref(), Some("claude-opus-4"));
    assert_eq!(editor.max_concurrent(), 3);
}

#[test]
fn settings_parse_with_defaults() {
    let dir = tempdir().unwrap();
    let path = write_fleet(dir.path(), "fleet.yaml", "agents: {}");
    let config = load_config_from(&path).unwrap();
    assert_eq!(config.settings.check_interval, Duration::from_secs(1));
    assert_eq!(config.settings.stop_timeout, Duration::from_secs(30));
    assert_eq!(config.settings.cancel_timeout, Duration::from_secs(10));
    assert_eq!(config.settings.reply_min_interval, Duration::from_millis(1000));
}

#[test]
fn loads_agent_from_referenced_file() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("agents")).unwrap();
    fs::write(
        dir.path().join("agents/writer.yaml"),
        "description: from a file\nworking_dir: work\n",
    )
    .unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  writer:\n    file: agents/writer.yaml\n",
    );

    let config = load_config_from(&path).unwrap();
    let writer = config.agent("writer").unwrap();
    assert_eq!(writer.def.description, "from a file");
    assert_eq!(writer.working_dir, config.config_dir.join("work"));
}

#[test]
fn interpolates_environment_variables() {
    let dir = tempdir().unwrap();
    std::env::set_var("DROVER_TEST_MODEL", "claude-haiku-4");
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  writer:\n    model: ${DROVER_TEST_MODEL}\n",
    );
    let config = load_config_from(&path).unwrap();
    assert_eq!(
        config.agent("writer").unwrap().def.model.as_deref(),
        Some("claude-haiku-4")
    );
}

#[test]
fn undefined_variable_fails_the_load() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  writer:\n    model: ${DROVER_TEST_SURELY_UNSET}\n",
    );
    match load_config_from(&path) {
        Err(ConfigError::UndefinedVar { name, .. }) => {
            assert_eq!(name, "DROVER_TEST_SURELY_UNSET");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn rejects_unsafe_agent_name() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  \"../evil\":\n    description: nope\n",
    );
    match load_config_from(&path) {
        Err(ConfigError::Validation { entries }) => {
            assert!(entries[0].path.contains("../evil"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn accepts_single_letter_agent_name() {
    let dir = tempdir().unwrap();
    let path = write_fleet(dir.path(), "fleet.yaml", "agents:\n  a:\n    description: ok\n");
    assert!(load_config_from(&path).is_ok());
}

#[test]
fn rejects_interval_schedule_without_interval() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  w:\n    schedules:\n      tick:\n        type: interval\n",
    );
    match load_config_from(&path) {
        Err(ConfigError::Validation { entries }) => {
            assert!(entries[0].path.ends_with("tick.interval"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn rejects_bad_cron_expression() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  w:\n    schedules:\n      nightly:\n        type: cron\n        expression: \"not a cron\"\n",
    );
    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::Validation { .. })
    ));
}

#[test]
fn accepts_five_field_cron() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  w:\n    schedules:\n      nightly:\n        type: cron\n        expression: \"0 3 * * *\"\n",
    );
    assert!(load_config_from(&path).is_ok());
}

#[test]
fn rejects_metadata_file_escaping_working_dir() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.yaml",
        "agents:\n  w:\n    metadata_file: ../outside.json\n",
    );
    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::Validation { .. })
    ));
}

#[test]
fn finds_fleet_file_upward() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a/b/c");
    fs::create_dir_all(&nested).unwrap();
    let path = write_fleet(dir.path(), "fleet.yaml", "agents: {}");

    let found = find_fleet_file(&nested).unwrap();
    assert_eq!(found, path);
}

#[test]
fn find_returns_none_without_fleet_file() {
    let dir = tempdir().unwrap();
    assert!(find_fleet_file(dir.path()).is_none());
}

#[test]
fn parses_toml_fleet_files() {
    let dir = tempdir().unwrap();
    let path = write_fleet(
        dir.path(),
        "fleet.toml",
        "[agents.writer]\ndescription = \"toml agent\"\n",
    );
    let config = load_config_from(&path).unwrap();
    assert_eq!(config.agent("writer").unwrap().def.description, "toml agent");
}

#[test]
fn parse_errors_carry_the_path() {
    let dir = tempdir().unwrap();
    let path = write_fleet(dir.path(), "fleet.yaml", "agents: [not, a, map]");
    match load_config_from(&path) {
        Err(ConfigError::Parse { path: p, .. }) => assert!(p.ends_with("fleet.yaml")),
        other => panic!("unexpected: {other:?}"),
    }
}
