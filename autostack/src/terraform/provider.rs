//! AWS provider configuration and the S3 remote state backend of each stack

use serde::Serialize;

use super::{aws::Tags, RequiredProvider, Stack};
use crate::{config::Settings, Result};

/// Region every stack is deployed into
pub const REGION: &str = "eu-north-1";

const PROVIDER: &str = "aws";
const PROVIDER_SOURCE: &str = "hashicorp/aws";
const PROVIDER_VERSION: &str = "~> 5.0";

/// Where a stack keeps its state and which tags are applied to everything it creates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
  /// Object key of the state file within the state bucket
  pub key: String,
  /// Merged into the provider default tags
  pub tags: Tags,
}

impl Binding {
  pub fn new(key: impl Into<String>, tags: Tags) -> Self {
    Binding { key: key.into(), tags }
  }
}

#[derive(Debug, Serialize)]
struct DefaultTags {
  tags: Tags,
}

#[derive(Debug, Serialize)]
struct AwsProvider {
  region: String,
  default_tags: Vec<DefaultTags>,
}

#[derive(Debug, Serialize)]
struct S3Backend {
  bucket: String,
  key: String,
  region: String,
}

/// Configure the provider, its version constraint and the state backend of `stack`
pub fn bind(stack: &mut Stack, binding: &Binding, settings: &Settings) -> Result<()> {
  let mut tags = Tags::from([("Terraform".to_owned(), "true".to_owned())]);
  tags.extend(binding.tags.clone());

  stack.add_provider(
    PROVIDER,
    &AwsProvider {
      region: REGION.to_owned(),
      default_tags: vec![DefaultTags { tags }],
    },
  )?;
  stack.require_provider(
    PROVIDER,
    RequiredProvider {
      source: PROVIDER_SOURCE.to_owned(),
      version: PROVIDER_VERSION.to_owned(),
    },
  );
  stack.set_backend(
    "s3",
    &S3Backend {
      bucket: settings.state_bucket.clone(),
      key: binding.key.clone(),
      region: REGION.to_owned(),
    },
  )?;

  Ok(())
}
