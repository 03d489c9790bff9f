use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while composing or synthesizing the stacks
#[derive(Debug, Error)]
pub enum Error {
  /// A required setting was not provided through the CLI or the environment
  #[error("No {name} specified in the environment")]
  MissingConfiguration { name: &'static str },

  /// A setting was provided but could not be interpreted
  #[error("Invalid value for {name}: {reason}")]
  InvalidConfiguration { name: &'static str, reason: String },

  /// The stack configuration cannot produce a launch template
  #[error("Invalid stack configuration: {0}")]
  InvalidStackConfig(String),

  #[error("Unable to read user data from {path}: {source}")]
  UserDataFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Two blocks were declared with the same address within one stack
  #[error("Duplicate block {address}")]
  DuplicateBlock { address: String },

  /// Two stacks were added to the app under the same id
  #[error("Duplicate stack {id}")]
  DuplicateStack { id: String },

  /// Block names must be valid Terraform identifiers
  #[error("Invalid block name {name:?}")]
  InvalidBlockName { name: String },

  #[error("Bootstrap template error: {0}")]
  Template(#[from] handlebars::TemplateError),

  #[error("Bootstrap render error: {0}")]
  Render(#[from] handlebars::RenderError),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub fn missing(name: &'static str) -> Self {
    Self::MissingConfiguration { name }
  }

  pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidConfiguration {
      name,
      reason: reason.into(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
