use std::{fmt, net::IpAddr};

use clap::Args;
use ipnet::IpNet;
use tracing::debug;

use crate::{Error, Result};

pub const DOMAIN_ENV: &str = "DOMAIN";
pub const ACCOUNT_NUMBER_ENV: &str = "AWS_ACCOUNT_NUMBER";
pub const GAME_PASSWORD_ENV: &str = "VALHEIM_PASSWORD";
pub const STATE_BUCKET_ENV: &str = "S3_BACKEND";
pub const PRIVATE_IPS_ENV: &str = "PRIVATE_IPS";

/// Raw settings as collected from the command line or the environment
///
/// Nothing is validated here; see [`Settings`] for the checked form
#[derive(Args, Clone, Debug, Default)]
pub struct SettingsInput {
  /// Base DNS domain; unit records are created as subdomains of it
  #[arg(long, env = DOMAIN_ENV)]
  pub domain: Option<String>,

  /// AWS account number, used to name the game data bucket
  #[arg(long, env = ACCOUNT_NUMBER_ENV)]
  pub account_number: Option<String>,

  /// Password for the game server
  #[arg(long, env = GAME_PASSWORD_ENV, hide_env_values = true)]
  pub game_password: Option<String>,

  /// Bucket holding the remote state of every stack
  #[arg(long, env = STATE_BUCKET_ENV)]
  pub state_bucket: Option<String>,

  /// JSON array of CIDRs or IP addresses allowed administrative access
  ///
  /// Example: '["203.0.113.7/32", "198.51.100.4"]'
  #[arg(long, env = PRIVATE_IPS_ENV)]
  pub private_ips: Option<String>,
}

/// Validated settings shared by every stack
///
/// Built once at the process boundary and passed down explicitly
#[derive(Clone, PartialEq)]
pub struct Settings {
  /// Base DNS domain (e.g. `example.com`)
  pub domain: String,
  /// AWS account number
  pub account_number: String,
  /// Password for the game server
  pub game_password: String,
  /// Bucket holding the remote state
  pub state_bucket: String,
  /// Sources allowed administrative ingress
  pub admin_cidrs: Vec<IpNet>,
}

/// Returns the value if it was set to something other than blanks
fn required(value: &Option<String>, name: &'static str) -> Result<String> {
  match value.as_deref().map(str::trim) {
    Some(v) if !v.is_empty() => Ok(v.to_owned()),
    _ => Err(Error::missing(name)),
  }
}

/// Parse the allow-list of administrative sources
///
/// The value is a JSON array of strings; each entry is either a CIDR or a bare
/// IP address, which is widened to a host network (/32 or /128). A CIDR with host
/// bits set is rejected rather than silently widened
pub fn parse_private_ips(raw: Option<&str>) -> Result<Vec<IpNet>> {
  let raw = match raw.map(str::trim) {
    Some(raw) if !raw.is_empty() => raw,
    _ => return Ok(Vec::new()),
  };

  let entries: Vec<String> =
    serde_json::from_str(raw).map_err(|e| Error::invalid(PRIVATE_IPS_ENV, format!("expected a JSON array: {e}")))?;

  entries
    .iter()
    .map(|entry| {
      let entry = entry.trim();
      let net = entry
        .parse::<IpNet>()
        .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
        .map_err(|_| Error::invalid(PRIVATE_IPS_ENV, format!("{entry:?} is not a CIDR or IP address")))?;
      if net != net.trunc() {
        return Err(Error::invalid(
          PRIVATE_IPS_ENV,
          format!("{entry:?} has host bits set, did you mean {}?", net.trunc()),
        ));
      }
      Ok(net)
    })
    .collect()
}

impl TryFrom<&SettingsInput> for Settings {
  type Error = Error;

  fn try_from(input: &SettingsInput) -> Result<Self> {
    let settings = Settings {
      domain: required(&input.domain, DOMAIN_ENV)?,
      account_number: required(&input.account_number, ACCOUNT_NUMBER_ENV)?,
      game_password: required(&input.game_password, GAME_PASSWORD_ENV)?,
      state_bucket: required(&input.state_bucket, STATE_BUCKET_ENV)?,
      admin_cidrs: parse_private_ips(input.private_ips.as_deref())?,
    };
    debug!("Settings: {settings:#?}");

    Ok(settings)
  }
}

impl Settings {
  /// Fully qualified name for a subdomain of the base domain
  pub fn subdomain(&self, name: &str) -> String {
    format!("{name}.{}", self.domain)
  }

  /// Name of the bucket holding persisted game data
  pub fn game_bucket(&self) -> String {
    format!("valheim-{}", self.account_number)
  }

  /// S3 URI of the game data prefix synchronised by the game server
  pub fn game_data_path(&self) -> String {
    format!("s3://{}/valheim-data/", self.game_bucket())
  }

  /// Hosted zone name (with trailing dot) records are created in
  pub fn hosted_zone(&self) -> String {
    format!("{}.", self.domain)
  }
}

impl fmt::Debug for Settings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Settings")
      .field("domain", &self.domain)
      .field("account_number", &self.account_number)
      .field("game_password", &"<redacted>")
      .field("state_bucket", &self.state_bucket)
      .field("admin_cidrs", &self.admin_cidrs)
      .finish()
  }
}
