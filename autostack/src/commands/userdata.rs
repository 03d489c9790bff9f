use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use clap::Args;

use crate::{
  bootstrap::Renderer,
  config::{Settings, SettingsInput},
  units::Unit,
};

/// Settings are validated exactly as for `synth`, the state bucket included although no
/// script reads it, so any script printed here is the one a synthesized plan embeds
#[derive(Args, Debug)]
pub struct UserDataInput {
  #[command(flatten)]
  pub settings: SettingsInput,

  /// Unit whose bootstrap script is rendered
  #[arg(long, value_enum)]
  pub unit: Unit,

  /// Print the script base64 encoded, as embedded in the launch template
  #[arg(long)]
  pub base64: bool,
}

impl UserDataInput {
  pub fn render(&self) -> Result<String> {
    let settings = Settings::try_from(&self.settings)?;
    let script = self.unit.script(&settings).render(&Renderer::new()?)?;

    Ok(match self.base64 {
      true => general_purpose::STANDARD.encode(script),
      false => script,
    })
  }

  pub fn print(&self) -> Result<()> {
    let output = self.render()?;

    match self.base64 {
      true => println!("{output}"),
      false => print!("{output}"),
    }

    Ok(())
  }
}
