use super::*;
use clap::CommandFactory;
use serde_json::json;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn values_parse_as_json_or_fall_back_to_strings() {
    assert_eq!(parse_value("0.5"), json!(0.5));
    assert_eq!(parse_value("{\"a\": true}"), json!({ "a": true }));
    assert_eq!(parse_value("\"Notes\""), json!("Notes"));
    assert_eq!(parse_value("Notes"), json!("Notes"));
}

#[test]
fn global_options_follow_subcommands() {
    let cli = Cli::try_parse_from([
        "panel", "back", "Gallery", "--jingle", "--url", "studio:4455", "-vv",
    ])
    .expect("parse");
    assert_eq!(cli.url, "studio:4455");
    assert_eq!(cli.verbose, 2);
    match cli.command {
        Command::Back {
            scene,
            jingle,
            broadcaster,
        } => {
            assert_eq!(scene, "Gallery");
            assert!(jingle);
            assert!(!broadcaster);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn watch_requires_a_name() {
    assert!(Cli::try_parse_from(["panel", "watch"]).is_err());
}

#[test]
fn panel_failures_print_as_status_lines() {
    let err = anyhow::Error::from(SyncError::value("scene", "no scene to come back to"));
    assert_eq!(
        status_line(&err).as_deref(),
        Some("[value] invalid value for scene: no scene to come back to")
    );

    let err = anyhow::Error::from(SyncError::Remote(
        shared::error::RemoteCallError::Disconnected,
    ))
    .context("get scene");
    assert_eq!(
        status_line(&err).as_deref(),
        Some("[remote] connection to the mixing server is closed")
    );

    assert_eq!(status_line(&anyhow::anyhow!("bad config file")), None);
}

#[test]
fn indicator_takes_only_known_lights() {
    let cli = Cli::try_parse_from(["panel", "indicator", "warning"]).expect("parse");
    assert!(matches!(cli.command, Command::Indicator { light } if light == "warning"));
    assert!(Cli::try_parse_from(["panel", "indicator", "live"]).is_err());
}

#[test]
fn preset_check_is_a_flag() {
    let cli = Cli::try_parse_from(["panel", "preset", "2", "--check"]).expect("parse");
    assert!(matches!(cli.command, Command::Preset { id, check: true } if id == "2"));
}
