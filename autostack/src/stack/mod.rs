//! Declarations of the deployable units
//!
//! A [`StackConfig`] describes one autoscaled compute unit; [`compute::synthesize`] turns it
//! into a stack. [`storage::synthesize`] declares the persisted game data bucket

pub mod compute;
pub mod storage;

use std::{fmt, fs, path::PathBuf};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Disk size in GiB used when the configuration does not set one
pub const DEFAULT_VOLUME_SIZE: u32 = 10;
/// Disk type used when the configuration does not set one
pub const DEFAULT_VOLUME_TYPE: &str = "gp3";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
  Tcp,
  Udp,
  Icmp,
  All,
}

impl Protocol {
  /// Protocol as understood by security group rules
  pub fn as_str(&self) -> &'static str {
    match self {
      Protocol::Tcp => "tcp",
      Protocol::Udp => "udp",
      Protocol::Icmp => "icmp",
      Protocol::All => "-1",
    }
  }

  /// Form usable within a block name
  fn ident(&self) -> &'static str {
    match self {
      Protocol::All => "all",
      other => other.as_str(),
    }
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.ident().to_uppercase())
  }
}

/// Inbound port range opened to the world
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenPort {
  pub from_port: u16,
  pub to_port: u16,
  pub protocol: Protocol,
  pub description: Option<String>,
}

impl OpenPort {
  pub fn new(from_port: u16, to_port: u16, protocol: Protocol) -> Self {
    OpenPort {
      from_port,
      to_port,
      protocol,
      description: None,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Description of the rule, derived from the range when not set
  pub fn description(&self) -> String {
    match &self.description {
      Some(description) => description.clone(),
      None => format!("Allow {} traffic on ports {}-{}", self.protocol, self.from_port, self.to_port),
    }
  }

  /// Name of the security group rule block
  pub fn rule_name(&self) -> String {
    format!("rule_{}_{}_{}", self.from_port, self.to_port, self.protocol.ident())
  }
}

/// Inline IAM policy attached to the role of a unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlinePolicy {
  pub name: String,
  pub document: JsonValue,
}

impl InlinePolicy {
  pub fn new(name: impl Into<String>, document: JsonValue) -> Self {
    InlinePolicy {
      name: name.into(),
      document,
    }
  }
}

/// Recurring change of the group capacity; recurrence is a cron expression in UTC
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledCapacity {
  pub name: String,
  pub recurrence: String,
  pub min_size: u32,
  pub max_size: u32,
  pub desired_capacity: u32,
}

impl ScheduledCapacity {
  /// Scale to nothing at midnight and back to one instance at 6 AM
  pub fn nightly() -> Vec<Self> {
    vec![
      ScheduledCapacity {
        name: "scale-down-at-night".to_owned(),
        recurrence: "0 0 * * *".to_owned(),
        min_size: 0,
        max_size: 0,
        desired_capacity: 0,
      },
      ScheduledCapacity {
        name: "scale-up-in-morning".to_owned(),
        recurrence: "0 6 * * *".to_owned(),
        min_size: 1,
        max_size: 3,
        desired_capacity: 1,
      },
    ]
  }

  /// Name of the schedule block
  pub fn block_name(&self) -> String {
    self.name.replace('-', "_")
  }
}

/// Source of the bootstrap payload
#[derive(Clone, PartialEq, Eq)]
pub enum UserData {
  /// Read from disk when the stack is synthesized
  File(PathBuf),
  Inline(String),
}

impl UserData {
  /// Plain text payload
  pub fn resolve(&self) -> Result<String> {
    match self {
      UserData::File(path) => {
        debug!("Reading user data from {}", path.display());
        fs::read_to_string(path).map_err(|source| Error::UserDataFile {
          path: path.clone(),
          source,
        })
      }
      UserData::Inline(script) => Ok(script.clone()),
    }
  }
}

impl fmt::Debug for UserData {
  // Inline scripts carry secrets
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UserData::File(path) => f.debug_tuple("File").field(path).finish(),
      UserData::Inline(script) => write!(f, "Inline(<{} bytes>)", script.len()),
    }
  }
}

/// Configuration of one autoscaled compute unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
  pub instance_type: String,
  pub ami: String,
  pub ebs_volume_size: Option<u32>,
  pub ebs_volume_type: Option<String>,
  /// Fully qualified names pointed at the static IP of the unit, in record order
  pub domains: Vec<String>,
  pub inline_policies: Vec<InlinePolicy>,
  pub user_data: UserData,
  pub open_ports: Vec<OpenPort>,
  pub schedules: Vec<ScheduledCapacity>,
}

impl StackConfig {
  pub fn builder(instance_type: impl Into<String>, ami: impl Into<String>) -> StackConfigBuilder {
    StackConfigBuilder {
      instance_type: instance_type.into(),
      ami: ami.into(),
      ebs_volume_size: None,
      ebs_volume_type: None,
      domains: Vec::new(),
      inline_policies: Vec::new(),
      user_data_path: None,
      user_data: None,
      open_ports: Vec::new(),
      schedules: ScheduledCapacity::nightly(),
    }
  }

  pub fn volume_size(&self) -> u32 {
    self.ebs_volume_size.unwrap_or(DEFAULT_VOLUME_SIZE)
  }

  pub fn volume_type(&self) -> &str {
    self.ebs_volume_type.as_deref().unwrap_or(DEFAULT_VOLUME_TYPE)
  }
}

#[derive(Debug)]
pub struct StackConfigBuilder {
  instance_type: String,
  ami: String,
  ebs_volume_size: Option<u32>,
  ebs_volume_type: Option<String>,
  domains: Vec<String>,
  inline_policies: Vec<InlinePolicy>,
  user_data_path: Option<PathBuf>,
  user_data: Option<String>,
  open_ports: Vec<OpenPort>,
  schedules: Vec<ScheduledCapacity>,
}

impl StackConfigBuilder {
  pub fn ebs_volume_size(mut self, size: u32) -> Self {
    self.ebs_volume_size = Some(size);
    self
  }

  pub fn ebs_volume_type(mut self, volume_type: impl Into<String>) -> Self {
    self.ebs_volume_type = Some(volume_type.into());
    self
  }

  pub fn domains<I, S>(mut self, domains: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.domains = domains.into_iter().map(Into::into).collect();
    self
  }

  pub fn inline_policy(mut self, name: impl Into<String>, document: JsonValue) -> Self {
    self.inline_policies.push(InlinePolicy::new(name, document));
    self
  }

  pub fn open_port(mut self, port: OpenPort) -> Self {
    self.open_ports.push(port);
    self
  }

  /// Read the bootstrap payload from a file; takes precedence over [`Self::user_data`]
  pub fn user_data_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.user_data_path = Some(path.into());
    self
  }

  pub fn user_data(mut self, script: impl Into<String>) -> Self {
    self.user_data = Some(script.into());
    self
  }

  /// Replace the default nightly schedules; an empty list disables scheduling
  pub fn schedules(mut self, schedules: Vec<ScheduledCapacity>) -> Self {
    self.schedules = schedules;
    self
  }

  pub fn build(self) -> Result<StackConfig> {
    let user_data = match (self.user_data_path, self.user_data) {
      (Some(path), inline) => {
        if inline.is_some() {
          warn!("Both a user data file and an inline script are set; using {}", path.display());
        }
        UserData::File(path)
      }
      (None, Some(script)) => UserData::Inline(script),
      (None, None) => return Err(Error::InvalidStackConfig("no user data".to_owned())),
    };

    Ok(StackConfig {
      instance_type: self.instance_type,
      ami: self.ami,
      ebs_volume_size: self.ebs_volume_size,
      ebs_volume_type: self.ebs_volume_type,
      domains: self.domains,
      inline_policies: self.inline_policies,
      user_data,
      open_ports: self.open_ports,
      schedules: self.schedules,
    })
  }
}
