//! Terraform JSON documents and the synthesis of the deployable plan
//!
//! Each logical unit is one [`Stack`], written to `stacks/<id>/cdk.tf.json` beside a
//! `manifest.json` listing every stack. All maps are ordered so that synthesizing the
//! same declarations twice produces byte-identical output

pub mod aws;
pub mod provider;

use std::{
  collections::{btree_map::Entry, BTreeMap},
  path::Path,
};

use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{utils, Error, Result};

/// File name of a synthesized stack document
pub const STACK_FILE: &str = "cdk.tf.json";
/// File name of the manifest listing all stacks
pub const MANIFEST_FILE: &str = "manifest.json";

/// A Terraform resource or data source type
pub trait Block: Serialize {
  /// Terraform type name (e.g. `aws_security_group`)
  const KIND: &'static str;
}

/// Wrap an expression in interpolation markers
pub fn interpolate(expr: &str) -> String {
  format!("${{{expr}}}")
}

/// Address of a declared block, used to reference its attributes from other blocks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
  address: String,
}

impl Reference {
  pub fn address(&self) -> &str {
    &self.address
  }

  /// Bare attribute expression, for use inside a larger expression
  pub fn expr(&self, attribute: &str) -> String {
    format!("{}.{attribute}", self.address)
  }

  /// Interpolated attribute reference (e.g. `${aws_vpc.selected.id}`)
  pub fn attr(&self, attribute: &str) -> String {
    interpolate(&self.expr(attribute))
  }
}

#[derive(Debug, Default, Serialize)]
pub struct TerraformSettings {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub required_providers: BTreeMap<String, RequiredProvider>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub backend: BTreeMap<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RequiredProvider {
  pub source: String,
  pub version: String,
}

/// Value exported by a stack once applied
#[derive(Clone, Debug, Serialize)]
pub struct Output {
  pub value: JsonValue,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  pub sensitive: bool,
}

impl Output {
  pub fn new(value: impl Into<JsonValue>) -> Self {
    Output {
      value: value.into(),
      description: None,
      sensitive: false,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// Continuous validation block; failed assertions are reported as warnings on plan/apply
#[derive(Clone, Debug, Serialize)]
pub struct Check {
  pub assert: Vec<Assertion>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Assertion {
  pub condition: String,
  pub error_message: String,
}

/// One deployable unit: a Terraform JSON configuration with its own state
#[derive(Debug, Serialize)]
pub struct Stack {
  #[serde(skip)]
  id: String,

  terraform: TerraformSettings,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  provider: BTreeMap<String, Vec<JsonValue>>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  data: BTreeMap<String, BTreeMap<String, JsonValue>>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  resource: BTreeMap<String, BTreeMap<String, JsonValue>>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  output: BTreeMap<String, Output>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  check: BTreeMap<String, Check>,
}

/// Terraform identifiers: a letter or underscore followed by letters, digits, underscores or dashes
fn validate_name(name: &str) -> Result<()> {
  let valid = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").is_ok_and(|re| re.is_match(name));
  match valid {
    true => Ok(()),
    false => Err(Error::InvalidBlockName { name: name.to_owned() }),
  }
}

/// Insert a block, refusing to overwrite an existing one
fn insert<T>(map: &mut BTreeMap<String, T>, name: &str, value: T, address: String) -> Result<()> {
  validate_name(name)?;
  match map.entry(name.to_owned()) {
    Entry::Vacant(e) => {
      e.insert(value);
      Ok(())
    }
    Entry::Occupied(_) => Err(Error::DuplicateBlock { address }),
  }
}

impl Stack {
  pub fn new(id: impl Into<String>) -> Self {
    Stack {
      id: id.into(),
      terraform: TerraformSettings::default(),
      provider: BTreeMap::new(),
      data: BTreeMap::new(),
      resource: BTreeMap::new(),
      output: BTreeMap::new(),
      check: BTreeMap::new(),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Declare a managed resource
  pub fn add_resource<B: Block>(&mut self, name: &str, block: &B) -> Result<Reference> {
    validate_name(name)?;
    let address = format!("{}.{name}", B::KIND);
    let value = serde_json::to_value(block)?;
    let blocks = self.resource.entry(B::KIND.to_owned()).or_default();
    insert(blocks, name, value, address.clone())?;
    debug!("{}: declared {address}", self.id);

    Ok(Reference { address })
  }

  /// Declare a data source, resolved by the provisioning engine at plan time
  pub fn add_data<B: Block>(&mut self, name: &str, block: &B) -> Result<Reference> {
    validate_name(name)?;
    let address = format!("data.{}.{name}", B::KIND);
    let value = serde_json::to_value(block)?;
    let blocks = self.data.entry(B::KIND.to_owned()).or_default();
    insert(blocks, name, value, address.clone())?;
    debug!("{}: declared {address}", self.id);

    Ok(Reference { address })
  }

  pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
    insert(&mut self.output, name, output, format!("output.{name}"))
  }

  pub fn add_check(&mut self, name: &str, check: Check) -> Result<()> {
    insert(&mut self.check, name, check, format!("check.{name}"))
  }

  /// Add a provider configuration; a provider may be configured more than once (aliases)
  pub fn add_provider<P: Serialize>(&mut self, name: &str, config: &P) -> Result<()> {
    let value = serde_json::to_value(config)?;
    self.provider.entry(name.to_owned()).or_default().push(value);
    Ok(())
  }

  pub fn require_provider(&mut self, name: &str, provider: RequiredProvider) {
    self.terraform.required_providers.insert(name.to_owned(), provider);
  }

  /// Set where the state of this stack is persisted
  pub fn set_backend<B: Serialize>(&mut self, kind: &str, config: &B) -> Result<()> {
    let value = serde_json::to_value(config)?;
    self.terraform.backend.clear();
    self.terraform.backend.insert(kind.to_owned(), value);
    Ok(())
  }

  pub fn backend(&self, kind: &str) -> Option<&JsonValue> {
    self.terraform.backend.get(kind)
  }

  pub fn providers(&self, name: &str) -> &[JsonValue] {
    self.provider.get(name).map(Vec::as_slice).unwrap_or_default()
  }

  /// All resources of one type, ordered by name
  pub fn resources(&self, kind: &str) -> Vec<(&str, &JsonValue)> {
    self
      .resource
      .get(kind)
      .map(|blocks| blocks.iter().map(|(name, value)| (name.as_str(), value)).collect())
      .unwrap_or_default()
  }

  pub fn resource(&self, kind: &str, name: &str) -> Option<&JsonValue> {
    self.resource.get(kind).and_then(|blocks| blocks.get(name))
  }

  pub fn data_source(&self, kind: &str, name: &str) -> Option<&JsonValue> {
    self.data.get(kind).and_then(|blocks| blocks.get(name))
  }

  pub fn output(&self, name: &str) -> Option<&Output> {
    self.output.get(name)
  }

  pub fn check(&self, name: &str) -> Option<&Check> {
    self.check.get(name)
  }

  /// Pretty printed Terraform JSON document
  pub fn to_json(&self) -> Result<String> {
    let mut json = serde_json::to_string_pretty(self)?;
    json.push('\n');
    Ok(json)
  }
}

/// Entry of a synthesized stack within the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackManifest {
  pub name: String,
  pub synthesized_stack_path: String,
  pub working_directory: String,
}

/// Index of every stack written by a synthesis pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Manifest {
  pub version: String,
  pub stacks: BTreeMap<String, StackManifest>,
}

/// The collection of stacks synthesized together
#[derive(Debug, Default)]
pub struct App {
  stacks: Vec<Stack>,
}

impl App {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
    if self.stacks.iter().any(|s| s.id == stack.id) {
      return Err(Error::DuplicateStack { id: stack.id });
    }
    self.stacks.push(stack);
    Ok(())
  }

  pub fn stacks(&self) -> &[Stack] {
    &self.stacks
  }

  pub fn stack(&self, id: &str) -> Option<&Stack> {
    self.stacks.iter().find(|s| s.id == id)
  }

  pub fn manifest(&self) -> Manifest {
    let stacks = self
      .stacks
      .iter()
      .map(|stack| {
        let dir = format!("stacks/{}", stack.id);
        let entry = StackManifest {
          name: stack.id.clone(),
          synthesized_stack_path: format!("{dir}/{STACK_FILE}"),
          working_directory: dir,
        };
        (stack.id.clone(), entry)
      })
      .collect();

    Manifest {
      version: env!("CARGO_PKG_VERSION").to_owned(),
      stacks,
    }
  }

  /// Write every stack and the manifest below `outdir`
  ///
  /// All documents are serialized before anything is written
  pub fn synth<P: AsRef<Path>>(&self, outdir: P) -> Result<Manifest> {
    let outdir = outdir.as_ref();
    let manifest = self.manifest();

    let documents = self
      .stacks
      .iter()
      .map(|stack| Ok((stack.id.as_str(), stack.to_json()?)))
      .collect::<Result<Vec<_>>>()?;
    let mut index = serde_json::to_string_pretty(&manifest)?;
    index.push('\n');

    for (id, document) in documents {
      let path = outdir.join(&manifest.stacks[id].synthesized_stack_path);
      utils::write_file(document.as_bytes(), &path, None)?;
      info!("Synthesized {id} to {}", path.display());
    }
    utils::write_file(index.as_bytes(), outdir.join(MANIFEST_FILE), None)?;

    Ok(manifest)
  }
}
