//! Typed blocks of the AWS provider used by the stacks
//!
//! Field names follow the provider schema so the structs serialize directly into
//! Terraform JSON. Only the arguments the stacks set are modelled

use std::collections::BTreeMap;

use serde::Serialize;

use super::Block;

pub type Tags = BTreeMap<String, String>;

/// Build a tag map from key/value pairs
pub fn tags<const N: usize>(pairs: [(&str, &str); N]) -> Tags {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Name/values filter shared by the describe-style data sources
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Filter {
  pub name: String,
  pub values: Vec<String>,
}

impl Filter {
  pub fn new(name: &str, values: &[&str]) -> Self {
    Filter {
      name: name.to_owned(),
      values: values.iter().map(|v| v.to_string()).collect(),
    }
  }
}

/// `data "aws_vpc"`
#[derive(Debug, Serialize)]
pub struct DataVpc {
  pub tags: Tags,
}

impl Block for DataVpc {
  const KIND: &'static str = "aws_vpc";
}

/// `data "aws_subnets"`
#[derive(Debug, Serialize)]
pub struct DataSubnets {
  pub filter: Vec<Filter>,
}

impl Block for DataSubnets {
  const KIND: &'static str = "aws_subnets";
}

/// `data "aws_instances"`
#[derive(Debug, Serialize)]
pub struct DataInstances {
  pub filter: Vec<Filter>,

  /// Defaults to `running` on the provider side
  pub instance_state_names: Vec<String>,
}

impl Block for DataInstances {
  const KIND: &'static str = "aws_instances";
}

/// `data "aws_route53_zone"`
#[derive(Debug, Serialize)]
pub struct DataRoute53Zone {
  /// Zone name, with trailing dot
  pub name: String,
}

impl Block for DataRoute53Zone {
  const KIND: &'static str = "aws_route53_zone";
}

#[derive(Debug, Serialize)]
pub struct SecurityGroup {
  pub name: String,
  pub description: String,
  pub vpc_id: String,
  pub tags: Tags,
}

impl Block for SecurityGroup {
  const KIND: &'static str = "aws_security_group";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
  Ingress,
  Egress,
}

#[derive(Debug, Serialize)]
pub struct SecurityGroupRule {
  pub description: String,

  #[serde(rename = "type")]
  pub rule_type: RuleType,

  pub from_port: u16,
  pub to_port: u16,

  /// `tcp`, `udp`, `icmp` or `-1` for all protocols
  pub protocol: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub cidr_blocks: Option<Vec<String>>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub ipv6_cidr_blocks: Option<Vec<String>>,

  /// Whether the security group itself is the source
  #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
  pub self_source: Option<bool>,

  pub security_group_id: String,
}

impl Block for SecurityGroupRule {
  const KIND: &'static str = "aws_security_group_rule";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlinePolicy {
  pub name: String,

  /// JSON encoded policy document
  pub policy: String,
}

#[derive(Debug, Serialize)]
pub struct IamRole {
  pub name: String,

  /// JSON encoded trust policy
  pub assume_role_policy: String,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub inline_policy: Vec<InlinePolicy>,
}

impl Block for IamRole {
  const KIND: &'static str = "aws_iam_role";
}

#[derive(Debug, Serialize)]
pub struct IamRolePolicyAttachment {
  pub policy_arn: String,
  pub role: String,
}

impl Block for IamRolePolicyAttachment {
  const KIND: &'static str = "aws_iam_role_policy_attachment";
}

#[derive(Debug, Serialize)]
pub struct IamInstanceProfile {
  pub name: String,
  pub role: String,
}

impl Block for IamInstanceProfile {
  const KIND: &'static str = "aws_iam_instance_profile";
}

#[derive(Debug, Serialize)]
pub struct Ebs {
  /// Size in GiB
  pub volume_size: u32,
  pub volume_type: String,
  /// The provider takes the string form of the boolean
  pub delete_on_termination: String,
}

#[derive(Debug, Serialize)]
pub struct BlockDeviceMapping {
  pub device_name: String,
  pub ebs: Ebs,
}

#[derive(Debug, Serialize)]
pub struct NetworkInterface {
  pub security_groups: Vec<String>,
  pub associate_public_ip_address: String,
}

#[derive(Debug, Serialize)]
pub struct IamInstanceProfileSpecification {
  pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TagSpecification {
  pub resource_type: String,
  pub tags: Tags,
}

#[derive(Debug, Serialize)]
pub struct LaunchTemplate {
  pub name: String,
  pub image_id: String,
  pub instance_type: String,
  pub key_name: String,
  pub block_device_mappings: Vec<BlockDeviceMapping>,
  pub network_interfaces: Vec<NetworkInterface>,
  pub iam_instance_profile: IamInstanceProfileSpecification,

  /// Base64 encoded bootstrap payload
  pub user_data: String,

  pub tag_specifications: Vec<TagSpecification>,
}

impl Block for LaunchTemplate {
  const KIND: &'static str = "aws_launch_template";
}

#[derive(Debug, Serialize)]
pub struct InstanceRefreshPreferences {
  pub min_healthy_percentage: u8,
}

#[derive(Debug, Serialize)]
pub struct InstanceRefresh {
  pub strategy: String,
  pub preferences: InstanceRefreshPreferences,

  /// Changes to these properties start a refresh, in addition to launch template changes
  pub triggers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AsgTag {
  pub key: String,
  pub value: String,
  pub propagate_at_launch: bool,
}

#[derive(Debug, Serialize)]
pub struct LaunchTemplateSpecification {
  pub launch_template_id: String,
  pub version: String,
}

#[derive(Debug, Serialize)]
pub struct LaunchTemplateOverride {
  pub instance_type: String,
  pub weighted_capacity: String,
}

#[derive(Debug, Serialize)]
pub struct MixedLaunchTemplate {
  pub launch_template_specification: LaunchTemplateSpecification,

  #[serde(rename = "override")]
  pub overrides: Vec<LaunchTemplateOverride>,
}

#[derive(Debug, Serialize)]
pub struct InstancesDistribution {
  pub on_demand_base_capacity: u32,
  pub on_demand_percentage_above_base_capacity: u32,
  pub spot_allocation_strategy: String,
}

#[derive(Debug, Serialize)]
pub struct MixedInstancesPolicy {
  pub launch_template: MixedLaunchTemplate,
  pub instances_distribution: InstancesDistribution,
}

#[derive(Debug, Serialize)]
pub struct AutoscalingGroup {
  pub name: String,
  pub desired_capacity: u32,
  pub min_size: u32,
  pub max_size: u32,

  /// Subnet ids the group spans
  pub vpc_zone_identifier: String,

  pub instance_refresh: InstanceRefresh,
  pub tag: Vec<AsgTag>,
  pub mixed_instances_policy: MixedInstancesPolicy,
}

impl Block for AutoscalingGroup {
  const KIND: &'static str = "aws_autoscaling_group";
}

#[derive(Debug, Serialize)]
pub struct AutoscalingPolicy {
  pub name: String,
  pub autoscaling_group_name: String,
  pub scaling_adjustment: i32,
  pub adjustment_type: String,
}

impl Block for AutoscalingPolicy {
  const KIND: &'static str = "aws_autoscaling_policy";
}

#[derive(Debug, Serialize)]
pub struct AutoscalingSchedule {
  pub scheduled_action_name: String,
  pub autoscaling_group_name: String,
  pub desired_capacity: u32,
  pub min_size: u32,
  pub max_size: u32,

  /// Cron expression
  pub recurrence: String,

  pub time_zone: String,
}

impl Block for AutoscalingSchedule {
  const KIND: &'static str = "aws_autoscaling_schedule";
}

#[derive(Debug, Serialize)]
pub struct Eip {
  pub domain: String,
}

impl Block for Eip {
  const KIND: &'static str = "aws_eip";
}

#[derive(Debug, Serialize)]
pub struct EipAssociation {
  /// Either 0 or 1, depending on whether a candidate instance exists
  pub count: String,
  pub allocation_id: String,
  pub instance_id: String,
}

impl Block for EipAssociation {
  const KIND: &'static str = "aws_eip_association";
}

#[derive(Debug, Serialize)]
pub struct Route53Record {
  pub zone_id: String,
  pub name: String,

  #[serde(rename = "type")]
  pub record_type: String,

  pub ttl: u32,
  pub records: Vec<String>,
}

impl Block for Route53Record {
  const KIND: &'static str = "aws_route53_record";
}

#[derive(Debug, Serialize)]
pub struct S3Bucket {
  pub bucket: String,
}

impl Block for S3Bucket {
  const KIND: &'static str = "aws_s3_bucket";
}
