use anyhow::Result;
use clap::Args;

use crate::units;

#[derive(Args, Debug)]
pub struct ListInput {}

impl ListInput {
  /// Print every stack id with the key its state is stored under
  pub fn list(&self) -> Result<()> {
    for (id, key) in units::state_keys() {
      println!("{id}\t{key}");
    }

    Ok(())
  }
}
