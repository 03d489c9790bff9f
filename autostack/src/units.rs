//! The two deployed compute units and the composition of the full plan

use clap::ValueEnum;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::{
  bootstrap::{self, Renderer, Script},
  config::Settings,
  stack::{compute, storage, OpenPort, Protocol, StackConfig},
  terraform::{provider::REGION, App},
  Result,
};

pub const CONTROL_PLANE: &str = "K3sMaster";
pub const GAME_SERVER: &str = "ValheimGameServer";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Unit {
  /// k3s control-plane node, also serving the dashboards
  ControlPlane,
  /// Valheim game server
  GameServer,
}

impl Unit {
  /// Id of the stack the unit is declared in
  pub fn id(&self) -> &'static str {
    match self {
      Unit::ControlPlane => CONTROL_PLANE,
      Unit::GameServer => GAME_SERVER,
    }
  }

  /// Bootstrap script run on first boot of the unit's instances
  pub fn script(&self, settings: &Settings) -> Script {
    match self {
      Unit::ControlPlane => bootstrap::control_plane_script(&settings.subdomain("k3s"), &settings.subdomain("grafana")),
      Unit::GameServer => bootstrap::game_server_script(
        &settings.game_data_path(),
        GAME_SERVER,
        &settings.game_password,
        &settings.subdomain("valheim"),
        REGION,
      ),
    }
  }
}

/// Lets the game server claim the static IP on boot
fn association_policy() -> JsonValue {
  json!({
    "Version": "2012-10-17",
    "Statement": [
      {
        "Effect": "Allow",
        "Action": [
          "ec2:DescribeAddresses",
          "ec2:DescribeInstances",
          "ec2:AssociateAddress"
        ],
        "Resource": "*"
      }
    ]
  })
}

fn game_data_policy(bucket: &str) -> JsonValue {
  json!({
    "Version": "2012-10-17",
    "Statement": [
      {
        "Effect": "Allow",
        "Action": [
          "s3:ListBucket",
          "s3:GetObject",
          "s3:PutObject",
          "s3:DeleteObject"
        ],
        "Resource": [
          format!("arn:aws:s3:::{bucket}"),
          format!("arn:aws:s3:::{bucket}/*")
        ]
      }
    ]
  })
}

pub fn control_plane_config(settings: &Settings, renderer: &Renderer) -> Result<StackConfig> {
  StackConfig::builder("t4g.medium", "ami-0da41a36dad7ce8f4")
    .domains([settings.subdomain("k3s"), settings.subdomain("grafana")])
    .user_data(Unit::ControlPlane.script(settings).render(renderer)?)
    .build()
}

pub fn game_server_config(settings: &Settings, renderer: &Renderer) -> Result<StackConfig> {
  let bucket = settings.game_bucket();

  StackConfig::builder("t3.large", "ami-0f76a278bc3380848")
    .ebs_volume_size(20)
    .domains([settings.subdomain("valheim")])
    .open_port(
      OpenPort::new(32456, 32458, Protocol::Udp).with_description("Allow valheim server traffic on ports 32456-32458"),
    )
    .open_port(
      OpenPort::new(2456, 2458, Protocol::Udp).with_description("Allow valheim server traffic on ports 2456-2458"),
    )
    .inline_policy("AllowAssociation", association_policy())
    .inline_policy("AllowValheimS3Access", game_data_policy(&bucket))
    .user_data(Unit::GameServer.script(settings).render(renderer)?)
    .build()
}

/// Stack ids paired with the key of their remote state
pub fn state_keys() -> Vec<(&'static str, String)> {
  vec![
    (CONTROL_PLANE, compute::state_key(CONTROL_PLANE)),
    (GAME_SERVER, compute::state_key(GAME_SERVER)),
    (storage::STORAGE_STACK, storage::state_key()),
  ]
}

/// Declare every stack of the plan
pub fn compose(settings: &Settings) -> Result<App> {
  let renderer = Renderer::new()?;
  let mut app = App::new();

  let control_plane = control_plane_config(settings, &renderer)?;
  app.add_stack(compute::synthesize(CONTROL_PLANE, &control_plane, settings)?)?;

  let game_server = game_server_config(settings, &renderer)?;
  app.add_stack(compute::synthesize(GAME_SERVER, &game_server, settings)?)?;

  app.add_stack(storage::synthesize(settings)?)?;
  info!("Composed {} stacks", app.stacks().len());

  Ok(app)
}

#[cfg(test)]
mod tests {
  use base64::{engine::general_purpose, Engine as _};
  use rstest::*;
  use serde_json::json;

  use super::*;
  use crate::{
    config::tests::{input, settings},
    stack::UserData,
  };

  fn inline(config: &StackConfig) -> &str {
    match &config.user_data {
      UserData::Inline(script) => script.as_str(),
      other => panic!("expected inline user data, got {other:?}"),
    }
  }

  #[test]
  fn it_configures_the_control_plane() {
    let config = control_plane_config(&settings(), &Renderer::new().unwrap()).unwrap();

    assert_eq!(config.instance_type, "t4g.medium");
    assert_eq!(config.ami, "ami-0da41a36dad7ce8f4");
    assert_eq!(config.domains, vec!["k3s.example.com", "grafana.example.com"]);
    assert!(config.open_ports.is_empty());
    assert!(config.inline_policies.is_empty());
    assert_eq!(config.volume_size(), 10);

    let script = inline(&config);
    assert!(script.contains("--tls-san k3s.example.com"));
    assert!(script.contains(r#"- host: "grafana.example.com""#));
  }

  #[test]
  fn it_configures_the_game_server() {
    let config = game_server_config(&settings(), &Renderer::new().unwrap()).unwrap();

    assert_eq!(config.instance_type, "t3.large");
    assert_eq!(config.ami, "ami-0f76a278bc3380848");
    assert_eq!(config.volume_size(), 20);
    assert_eq!(config.domains, vec!["valheim.example.com"]);

    let ports: Vec<(u16, u16, Protocol)> = config
      .open_ports
      .iter()
      .map(|p| (p.from_port, p.to_port, p.protocol))
      .collect();
    assert_eq!(ports, vec![(32456, 32458, Protocol::Udp), (2456, 2458, Protocol::Udp)]);

    let names: Vec<&str> = config.inline_policies.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["AllowAssociation", "AllowValheimS3Access"]);
    assert_eq!(
      config.inline_policies[1].document["Statement"][0]["Resource"],
      json!(["arn:aws:s3:::valheim-123456789012", "arn:aws:s3:::valheim-123456789012/*"])
    );

    let script = inline(&config);
    assert!(script.contains("S3_PATH=s3://valheim-123456789012/valheim-data/"));
    assert!(script.contains("INSTANCE_NAME=ValheimGameServer"));
    assert!(script.contains("AWS_REGION=eu-north-1"));
  }

  #[test]
  fn it_composes_every_stack() {
    let app = compose(&settings()).unwrap();
    let ids: Vec<&str> = app.stacks().iter().map(|s| s.id()).collect();

    assert_eq!(ids, vec!["K3sMaster", "ValheimGameServer", "ValheimAWSResources"]);

    let records = app.stack("K3sMaster").unwrap().resources("aws_route53_record");
    assert_eq!(records.len(), 2);
    let game_server = app.stack("ValheimGameServer").unwrap();
    assert_eq!(game_server.resources("aws_route53_record").len(), 1);
    assert_eq!(game_server.resources("aws_autoscaling_schedule").len(), 2);

    let encoded = game_server.resource("aws_launch_template", "launch_template").unwrap()["user_data"]
      .as_str()
      .unwrap();
    let script = String::from_utf8(general_purpose::STANDARD.decode(encoded).unwrap()).unwrap();
    assert!(script.starts_with("#!/bin/bash\n"));
  }

  #[rstest]
  #[case(r#"["10.0.0.1/32"]"#)]
  #[case(r#"["10.0.0.1"]"#)]
  fn it_admits_private_ips_on_every_compute_stack(#[case] private_ips: &str) {
    let mut input = input();
    input.private_ips = Some(private_ips.to_string());
    let app = compose(&Settings::try_from(&input).unwrap()).unwrap();

    for id in [CONTROL_PLANE, GAME_SERVER] {
      let rule = app
        .stack(id)
        .unwrap()
        .resource("aws_security_group_rule", "ssh_sg_rule")
        .unwrap();
      assert_eq!(rule["cidr_blocks"], json!(["10.0.0.1/32"]), "{id}");
      assert!(rule.get("ipv6_cidr_blocks").is_none(), "{id}");
    }
  }

  #[test]
  fn it_lists_state_keys() {
    let keys = state_keys();

    assert_eq!(
      keys,
      vec![
        ("K3sMaster", "K3sMaster/TemplateAutoScalingStack".to_string()),
        ("ValheimGameServer", "ValheimGameServer/TemplateAutoScalingStack".to_string()),
        ("ValheimAWSResources", "ValheimGameServer/ValheimAWSResources".to_string()),
      ]
    );
  }
}
