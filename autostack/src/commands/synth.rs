use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::{
  config::{Settings, SettingsInput},
  units,
};

#[derive(Args, Debug)]
pub struct SynthInput {
  #[command(flatten)]
  pub settings: SettingsInput,

  /// Directory the stacks and the manifest are written to
  #[arg(short, long, default_value = "stacks.out")]
  pub output: PathBuf,
}

impl SynthInput {
  /// Declare every stack and write the plan below the output directory
  pub fn synth(&self) -> Result<()> {
    let settings = Settings::try_from(&self.settings)?;
    let app = units::compose(&settings)?;
    let manifest = app.synth(&self.output)?;

    info!(
      "Wrote {} stacks to {}",
      manifest.stacks.len(),
      self.output.display()
    );

    Ok(())
  }
}
