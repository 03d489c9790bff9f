use tracing::info;

use crate::{
  config::Settings,
  terraform::{
    aws::{self, tags},
    provider::{self, Binding},
    Output, Stack,
  },
  Result,
};

/// Id of the stack holding the game data bucket
pub const STORAGE_STACK: &str = "ValheimAWSResources";
/// Unit the storage belongs to; its state is kept next to that unit's
pub const OWNER: &str = "ValheimGameServer";

pub fn state_key() -> String {
  format!("{OWNER}/{STORAGE_STACK}")
}

/// Bucket persisting the game data between instances
///
/// The game server reaches it by name only, through the bucket path handed to its bootstrap script
pub fn synthesize(settings: &Settings) -> Result<Stack> {
  let mut stack = Stack::new(STORAGE_STACK);
  provider::bind(&mut stack, &Binding::new(state_key(), tags([("Name", OWNER)])), settings)?;

  let bucket = stack.add_resource(
    "valheim",
    &aws::S3Bucket {
      bucket: settings.game_bucket(),
    },
  )?;
  stack.add_output(
    "bucket_name",
    Output::new(bucket.attr("bucket")).with_description("Bucket holding the persisted game data"),
  )?;
  info!("Declared storage {}", settings.game_bucket());

  Ok(stack)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::config::tests::settings;

  #[test]
  fn it_declares_the_game_bucket() {
    let stack = synthesize(&settings()).unwrap();

    assert_eq!(stack.id(), "ValheimAWSResources");
    assert_eq!(
      stack.resource("aws_s3_bucket", "valheim"),
      Some(&json!({"bucket": "valheim-123456789012"}))
    );
    assert_eq!(stack.output("bucket_name").unwrap().value, "${aws_s3_bucket.valheim.bucket}");
  }

  #[test]
  fn it_shares_the_game_server_state_prefix() {
    let stack = synthesize(&settings()).unwrap();

    assert_eq!(
      stack.backend("s3").unwrap()["key"],
      "ValheimGameServer/ValheimAWSResources"
    );
    assert_eq!(
      stack.providers("aws")[0]["default_tags"][0]["tags"],
      json!({"Name": "ValheimGameServer", "Terraform": "true"})
    );
  }
}
