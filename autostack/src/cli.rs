use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

use crate::commands;

/// Styles for CLI
fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightCyan))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  #[clap(flatten)]
  pub verbose: Verbosity,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Synthesize the Terraform stacks of every unit
  ///
  /// Writes `stacks/<id>/cdk.tf.json` for each stack and a `manifest.json`
  /// below the output directory
  Synth(commands::synth::SynthInput),

  /// Print the bootstrap script of a unit
  ///
  /// Requires the same settings as `synth`
  Userdata(commands::userdata::UserDataInput),

  /// List the stacks and the key of their remote state
  List(commands::list::ListInput),
}

#[cfg(test)]
mod tests {
  use std::{fs, process::Command};

  use assert_cmd::prelude::*;
  use rstest::*;

  const SETTINGS: [(&str, &str); 4] = [
    ("DOMAIN", "example.com"),
    ("AWS_ACCOUNT_NUMBER", "123456789012"),
    ("VALHEIM_PASSWORD", "hunter2"),
    ("S3_BACKEND", "tf-state"),
  ];

  fn autostack() -> Command {
    let bin_under_test = escargot::CargoBuild::new()
      .bin("autostack")
      .current_release()
      .current_target()
      .run()
      .unwrap();

    let mut cmd = bin_under_test.command();
    cmd.env_clear();
    cmd
  }

  fn configured() -> Command {
    let mut cmd = autostack();
    cmd.envs(SETTINGS);
    cmd
  }

  #[rstest]
  #[case("DOMAIN")]
  #[case("AWS_ACCOUNT_NUMBER")]
  #[case("VALHEIM_PASSWORD")]
  #[case("S3_BACKEND")]
  fn it_fails_without_required_setting(#[case] missing: &str) {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = autostack();
    cmd.envs(SETTINGS.iter().filter(|(name, _)| *name != missing).copied());
    cmd.arg("synth").arg("--output").arg(dir.path());

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(missing));
    assert!(!dir.path().join("manifest.json").exists());
  }

  #[test]
  fn it_requires_every_setting_for_userdata() {
    let mut cmd = autostack();
    cmd.envs(SETTINGS.iter().filter(|(name, _)| *name != "S3_BACKEND").copied());
    cmd.arg("userdata").arg("--unit").arg("game-server");

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("S3_BACKEND"));
  }

  #[test]
  fn it_treats_empty_settings_as_missing() {
    let mut cmd = configured();
    cmd.env("DOMAIN", "").arg("userdata").arg("--unit").arg("control-plane");

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No DOMAIN specified"));
  }

  #[test]
  fn it_synthesizes_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = configured();
    cmd
      .env("PRIVATE_IPS", r#"["203.0.113.7"]"#)
      .arg("synth")
      .arg("--output")
      .arg(dir.path());

    cmd.assert().success();

    for id in ["K3sMaster", "ValheimGameServer", "ValheimAWSResources"] {
      assert!(dir.path().join("stacks").join(id).join("cdk.tf.json").is_file(), "{id} missing");
    }
    let game_server = fs::read_to_string(dir.path().join("stacks/ValheimGameServer/cdk.tf.json")).unwrap();
    assert!(game_server.contains("203.0.113.7/32"));
    assert!(!game_server.contains("hunter2"), "password must only appear base64 encoded");
  }

  #[test]
  fn it_rejects_malformed_private_ips() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = configured();
    cmd
      .env("PRIVATE_IPS", "10.0.0.1")
      .arg("synth")
      .arg("--output")
      .arg(dir.path());

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PRIVATE_IPS"));
  }

  #[rstest]
  #[case("control-plane", "--tls-san k3s.example.com")]
  #[case("game-server", "INSTANCE_NAME=ValheimGameServer")]
  fn it_prints_userdata(#[case] unit: &str, #[case] expected: &str) {
    let mut cmd = configured();
    cmd.arg("userdata").arg("--unit").arg(unit);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("#!/bin/bash\n"));
    assert!(stdout.contains(expected));
  }

  #[test]
  fn it_prints_base64_userdata() {
    let mut cmd = configured();
    cmd.arg("userdata").arg("--unit").arg("control-plane").arg("--base64");

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    // "#!/bin/bash\n" encoded
    assert!(String::from_utf8(output.stdout).unwrap().starts_with("IyEvYmluL2Jhc2gK"));
  }

  #[test]
  fn it_lists_stacks() {
    let mut cmd = autostack();
    cmd.arg("list");

    cmd.assert().success().stdout(
      "K3sMaster\tK3sMaster/TemplateAutoScalingStack\n\
       ValheimGameServer\tValheimGameServer/TemplateAutoScalingStack\n\
       ValheimAWSResources\tValheimGameServer/ValheimAWSResources\n",
    );
  }
}
