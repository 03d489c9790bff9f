//! Bootstrap payloads executed on first boot of a unit's instances
//!
//! A script is an ordered list of [`Fragment`]s, each rendered from a template embedded
//! from `templates/`. Values interpolated into the templates go through the `shell` or
//! `yaml` helper so they are escaped for the syntax they land in

pub mod escape;

use handlebars::{handlebars_helper, no_escape, Handlebars};
use rust_embed::RustEmbed;
use serde::Serialize;
use tracing::debug;

use crate::Result;

const TEMPLATE_SUFFIX: &str = ".sh.hbs";
const SHEBANG: &str = "#!/bin/bash\n";

/// Embeds the contents of the `templates/` directory into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
pub struct Templates;

handlebars_helper!(shell: |value: str| escape::shell_word(value));
handlebars_helper!(yaml: |value: str| escape::yaml_scalar(value));

/// A named piece of a bootstrap script and the values it is rendered with
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "fragment", rename_all = "snake_case")]
pub enum Fragment {
  /// Refresh the package index and install the AWS CLI
  Packages,
  /// Format and mount the NVMe data volume under `/mnt/ebs`
  NvmeVolume,
  /// Install a k3s server whose certificate also covers `tls_san`
  K3sServer { tls_san: String },
  /// Install cert-manager and Grafana, exposing Grafana on `dashboard_domain`
  ControlPlaneCharts { dashboard_domain: String },
  /// Restore the game data from `s3_path` and install the game server chart
  GameServer { s3_path: String, password: String },
  /// Associate the static IP tagged `instance_name` with the booting instance
  SelfRegister { instance_name: String, region: String },
  /// Watch the game data directory and sync changes back to `s3_path`
  SyncWatcher { s3_path: String },
}

impl Fragment {
  /// Name of the template the fragment is rendered from
  pub fn name(&self) -> &'static str {
    match self {
      Fragment::Packages => "packages",
      Fragment::NvmeVolume => "nvme_volume",
      Fragment::K3sServer { .. } => "k3s_server",
      Fragment::ControlPlaneCharts { .. } => "control_plane_charts",
      Fragment::GameServer { .. } => "game_server",
      Fragment::SelfRegister { .. } => "self_register",
      Fragment::SyncWatcher { .. } => "sync_watcher",
    }
  }
}

/// Template registry used to render fragments
pub struct Renderer {
  registry: Handlebars<'static>,
}

impl Renderer {
  pub fn new() -> Result<Self> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(no_escape);
    registry.register_helper("shell", Box::new(shell));
    registry.register_helper("yaml", Box::new(yaml));

    for file in Templates::iter() {
      let Some(name) = file.strip_suffix(TEMPLATE_SUFFIX) else {
        continue;
      };
      if let Some(template) = Templates::get(&file) {
        registry.register_template_string(name, String::from_utf8_lossy(template.data.as_ref()))?;
        debug!("Registered bootstrap template {name}");
      }
    }

    Ok(Renderer { registry })
  }

  pub fn render(&self, fragment: &Fragment) -> Result<String> {
    Ok(self.registry.render(fragment.name(), fragment)?)
  }
}

/// An ordered bootstrap script
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
  fragments: Vec<Fragment>,
}

impl Script {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, fragment: Fragment) -> Self {
    self.fragments.push(fragment);
    self
  }

  pub fn fragments(&self) -> &[Fragment] {
    &self.fragments
  }

  /// Render the script by concatenating its fragments in order
  pub fn render(&self, renderer: &Renderer) -> Result<String> {
    let mut script = String::from(SHEBANG);
    for fragment in &self.fragments {
      script.push('\n');
      script.push_str(&renderer.render(fragment)?);
    }

    Ok(script)
  }
}

/// Script for the k3s control-plane node
pub fn control_plane_script(tls_san: &str, dashboard_domain: &str) -> Script {
  Script::new()
    .with(Fragment::Packages)
    .with(Fragment::NvmeVolume)
    .with(Fragment::K3sServer {
      tls_san: tls_san.to_owned(),
    })
    .with(Fragment::ControlPlaneCharts {
      dashboard_domain: dashboard_domain.to_owned(),
    })
}

/// Script for the game server node
pub fn game_server_script(s3_path: &str, instance_name: &str, password: &str, domain: &str, region: &str) -> Script {
  Script::new()
    .with(Fragment::Packages)
    .with(Fragment::NvmeVolume)
    .with(Fragment::K3sServer {
      tls_san: domain.to_owned(),
    })
    .with(Fragment::GameServer {
      s3_path: s3_path.to_owned(),
      password: password.to_owned(),
    })
    .with(Fragment::SelfRegister {
      instance_name: instance_name.to_owned(),
      region: region.to_owned(),
    })
    .with(Fragment::SyncWatcher {
      s3_path: s3_path.to_owned(),
    })
}

#[cfg(test)]
mod tests {
  use rstest::*;

  use super::*;

  const S3_PATH: &str = "s3://valheim-123456789012/valheim-data/";

  fn game_server(password: &str) -> Script {
    game_server_script(S3_PATH, "ValheimGameServer", password, "valheim.example.com", "eu-north-1")
  }

  #[test]
  fn it_registers_every_template() {
    let renderer = Renderer::new().unwrap();
    let mut names: Vec<String> = renderer.registry.get_templates().keys().cloned().collect();
    names.sort();

    assert_eq!(
      names,
      vec![
        "control_plane_charts",
        "game_server",
        "k3s_server",
        "nvme_volume",
        "packages",
        "self_register",
        "sync_watcher",
      ]
    );
  }

  #[rstest]
  #[case(Fragment::Packages, "sudo apt-get install -y awscli")]
  #[case(Fragment::NvmeVolume, "sudo mount $DEVICE /mnt/ebs")]
  #[case(
    Fragment::K3sServer { tls_san: "k3s.example.com".to_string() },
    "server --tls-san k3s.example.com --data-dir /mnt/ebs/k3s"
  )]
  #[case(
    Fragment::ControlPlaneCharts { dashboard_domain: "grafana.example.com".to_string() },
    r#"- host: "grafana.example.com""#
  )]
  #[case(
    Fragment::GameServer { s3_path: S3_PATH.to_string(), password: "hunter2".to_string() },
    r#"serverPass: "hunter2""#
  )]
  #[case(
    Fragment::SelfRegister { instance_name: "ValheimGameServer".to_string(), region: "eu-north-1".to_string() },
    "INSTANCE_NAME=ValheimGameServer"
  )]
  #[case(
    Fragment::SyncWatcher { s3_path: S3_PATH.to_string() },
    "S3_PATH=s3://valheim-123456789012/valheim-data/"
  )]
  fn it_renders_fragment(#[case] fragment: Fragment, #[case] expected: &str) {
    let renderer = Renderer::new().unwrap();
    let rendered = renderer.render(&fragment).unwrap();

    assert!(rendered.contains(expected), "{} missing {expected:?}:\n{rendered}", fragment.name());
    assert!(!rendered.contains("{{"));
  }

  #[test]
  fn it_renders_deterministically() {
    let renderer = Renderer::new().unwrap();
    let first = game_server("hunter2").render(&renderer).unwrap();
    let second = game_server("hunter2").render(&Renderer::new().unwrap()).unwrap();

    assert_eq!(first.as_bytes(), second.as_bytes());
  }

  #[test]
  fn it_preserves_fragment_order() {
    let renderer = Renderer::new().unwrap();
    let script = game_server("hunter2").render(&renderer).unwrap();

    assert!(script.starts_with("#!/bin/bash\n"));
    let markers = [
      "sudo apt-get update -y",
      "if [ -e /dev/nvme1n1 ]; then",
      "curl -sfL https://get.k3s.io",
      "sudo -i -u ec2-user bash << 'USER_CMDS'",
      "EIP_ALLOCATION_ID=$(aws ec2 describe-addresses",
      "inotifywait -m -r",
    ];
    let positions: Vec<usize> = markers.iter().map(|m| script.find(m).unwrap()).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
  }

  #[test]
  fn it_concatenates_fragments_in_order() {
    let renderer = Renderer::new().unwrap();
    let script = Script::new().with(Fragment::NvmeVolume).with(Fragment::Packages);
    let expected = format!(
      "#!/bin/bash\n\n{}\n{}",
      renderer.render(&Fragment::NvmeVolume).unwrap(),
      renderer.render(&Fragment::Packages).unwrap()
    );

    assert_eq!(script.render(&renderer).unwrap(), expected);
  }

  #[test]
  fn it_keeps_hostile_values_inside_their_quotes() {
    let renderer = Renderer::new().unwrap();
    let script = game_server("pw\"\nUSER_CMDS\nrm -rf /").render(&renderer).unwrap();

    let terminators = script.lines().filter(|line| *line == "USER_CMDS").count();
    assert_eq!(terminators, 1);
    assert!(!script.lines().any(|line| line == "rm -rf /"));
    assert!(script.contains(r#"serverPass: "pw\"\nUSER_CMDS\nrm -rf /""#));
  }

  #[test]
  fn it_builds_control_plane_script() {
    let script = control_plane_script("k3s.example.com", "grafana.example.com");
    let names: Vec<&str> = script.fragments().iter().map(Fragment::name).collect();

    assert_eq!(names, vec!["packages", "nvme_volume", "k3s_server", "control_plane_charts"]);
  }
}
