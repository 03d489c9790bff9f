//! An autoscaled group of spot instances, its access rules and optional DNS records
//!
//! Instances of the group are discovered by their `Name` tag. When domains are configured a
//! single static IP is associated with one discovered instance and every domain points at it

use base64::{engine::general_purpose, Engine as _};
use ipnet::IpNet;
use serde_json::json;
use tracing::{debug, info};

use super::StackConfig;
use crate::{
  config::Settings,
  terraform::{
    aws::{self, tags, Filter, RuleType},
    provider::{self, Binding},
    Assertion, Check, Output, Reference, Stack,
  },
  Result,
};

const ANYWHERE: &str = "0.0.0.0/0";
const KEY_NAME: &str = "aws_servers";
const DEVICE_NAME: &str = "/dev/sdh";
const SSM_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";
const ADMIN_PORT_RANGE: (u16, u16) = (0, 15000);
const SCHEDULE_TIME_ZONE: &str = "Etc/UTC";
const RECORD_TTL: u32 = 60;

/// Remote state key of a compute unit
pub fn state_key(id: &str) -> String {
  format!("{id}/TemplateAutoScalingStack")
}

/// Build the stack of the compute unit `id`
pub fn synthesize(id: &str, config: &StackConfig, settings: &Settings) -> Result<Stack> {
  let mut group = ComputeGroup {
    id,
    config,
    settings,
    stack: Stack::new(id),
  };
  group.declare()?;
  info!("Declared compute group {id}");

  Ok(group.stack)
}

struct ComputeGroup<'a> {
  id: &'a str,
  config: &'a StackConfig,
  settings: &'a Settings,
  stack: Stack,
}

impl ComputeGroup<'_> {
  fn declare(&mut self) -> Result<()> {
    // Fail on a missing payload before declaring anything
    let user_data = general_purpose::STANDARD.encode(self.config.user_data.resolve()?);

    let binding = Binding::new(state_key(self.id), tags([("Name", self.id)]));
    provider::bind(&mut self.stack, &binding, self.settings)?;

    let vpc = self.stack.add_data(
      "selected",
      &aws::DataVpc {
        tags: tags([("Name", "vpc")]),
      },
    )?;

    let security_group = self.security_group(&vpc)?;
    let profile = self.iam()?;
    let template = self.launch_template(&security_group, &profile, user_data)?;
    let asg = self.autoscaling_group(&vpc, &template)?;
    self.scaling_policies(&asg)?;
    self.schedules(&asg)?;

    let instances = self.discovery()?;
    if !self.config.domains.is_empty() {
      self.records(&instances)?;
    }

    Ok(())
  }

  fn security_group(&mut self, vpc: &Reference) -> Result<Reference> {
    let sg = self.stack.add_resource(
      "sec_group",
      &aws::SecurityGroup {
        name: self.id.to_owned(),
        description: "Allow SSH from a specific IP".to_owned(),
        vpc_id: vpc.attr("id"),
        tags: tags([("Name", self.id)]),
      },
    )?;

    self.stack.add_resource(
      "eggress",
      &aws::SecurityGroupRule {
        description: "egress".to_owned(),
        rule_type: RuleType::Egress,
        from_port: 0,
        to_port: 0,
        protocol: "-1".to_owned(),
        cidr_blocks: Some(vec![ANYWHERE.to_owned()]),
        ipv6_cidr_blocks: None,
        self_source: None,
        security_group_id: sg.attr("id"),
      },
    )?;

    let admin = &self.settings.admin_cidrs;
    if admin.is_empty() {
      debug!("{}: no administrative sources configured, skipping admin ingress", self.id);
    } else {
      let (v4, v6): (Vec<&IpNet>, Vec<&IpNet>) = admin.iter().partition(|net| matches!(net, IpNet::V4(_)));
      let cidrs = |nets: Vec<&IpNet>| match nets.is_empty() {
        true => None,
        false => Some(nets.iter().map(ToString::to_string).collect::<Vec<_>>()),
      };

      self.stack.add_resource(
        "ssh_sg_rule",
        &aws::SecurityGroupRule {
          description: "admin".to_owned(),
          rule_type: RuleType::Ingress,
          from_port: ADMIN_PORT_RANGE.0,
          to_port: ADMIN_PORT_RANGE.1,
          protocol: "tcp".to_owned(),
          cidr_blocks: cidrs(v4),
          ipv6_cidr_blocks: cidrs(v6),
          self_source: None,
          security_group_id: sg.attr("id"),
        },
      )?;
    }

    self.stack.add_resource(
      "self_rule",
      &aws::SecurityGroupRule {
        description: "self".to_owned(),
        rule_type: RuleType::Ingress,
        from_port: 0,
        to_port: 0,
        protocol: "-1".to_owned(),
        cidr_blocks: None,
        ipv6_cidr_blocks: None,
        self_source: Some(true),
        security_group_id: sg.attr("id"),
      },
    )?;

    for port in &self.config.open_ports {
      self.stack.add_resource(
        &port.rule_name(),
        &aws::SecurityGroupRule {
          description: port.description(),
          rule_type: RuleType::Ingress,
          from_port: port.from_port,
          to_port: port.to_port,
          protocol: port.protocol.as_str().to_owned(),
          cidr_blocks: Some(vec![ANYWHERE.to_owned()]),
          ipv6_cidr_blocks: None,
          self_source: None,
          security_group_id: sg.attr("id"),
        },
      )?;
    }

    Ok(sg)
  }

  /// Role assumed by the instances and the profile passing it to them
  fn iam(&mut self) -> Result<Reference> {
    let assume_role_policy = json!({
      "Version": "2012-10-17",
      "Statement": [
        {
          "Effect": "Allow",
          "Principal": {
            "Service": "ec2.amazonaws.com",
          },
          "Action": "sts:AssumeRole",
        },
      ],
    });
    let inline_policy = self
      .config
      .inline_policies
      .iter()
      .map(|policy| {
        Ok(aws::InlinePolicy {
          name: policy.name.clone(),
          policy: serde_json::to_string(&policy.document)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let role = self.stack.add_resource(
      "ssmRole",
      &aws::IamRole {
        name: format!("{}ec2-ssm-role", self.id),
        assume_role_policy: serde_json::to_string(&assume_role_policy)?,
        inline_policy,
      },
    )?;

    self.stack.add_resource(
      "ssmRolePolicyAttachment",
      &aws::IamRolePolicyAttachment {
        policy_arn: SSM_POLICY_ARN.to_owned(),
        role: role.attr("name"),
      },
    )?;

    self.stack.add_resource(
      "instanceProfile",
      &aws::IamInstanceProfile {
        name: format!("{}-ec2-ssm-instance-profile", self.id),
        role: role.attr("name"),
      },
    )
  }

  fn launch_template(
    &mut self,
    security_group: &Reference,
    profile: &Reference,
    user_data: String,
  ) -> Result<Reference> {
    self.stack.add_resource(
      "launch_template",
      &aws::LaunchTemplate {
        name: format!("{}-launch-template", self.id),
        image_id: self.config.ami.clone(),
        instance_type: self.config.instance_type.clone(),
        key_name: KEY_NAME.to_owned(),
        block_device_mappings: vec![aws::BlockDeviceMapping {
          device_name: DEVICE_NAME.to_owned(),
          ebs: aws::Ebs {
            volume_size: self.config.volume_size(),
            volume_type: self.config.volume_type().to_owned(),
            delete_on_termination: "true".to_owned(),
          },
        }],
        network_interfaces: vec![aws::NetworkInterface {
          security_groups: vec![security_group.attr("id")],
          associate_public_ip_address: "true".to_owned(),
        }],
        iam_instance_profile: aws::IamInstanceProfileSpecification {
          name: profile.attr("name"),
        },
        user_data,
        tag_specifications: vec![aws::TagSpecification {
          resource_type: "instance".to_owned(),
          tags: tags([("Name", self.id)]),
        }],
      },
    )
  }

  fn autoscaling_group(&mut self, vpc: &Reference, template: &Reference) -> Result<Reference> {
    let subnets = self.stack.add_data(
      "public_subnets",
      &aws::DataSubnets {
        filter: vec![
          Filter {
            name: "vpc-id".to_owned(),
            values: vec![vpc.attr("id")],
          },
          Filter::new("tag:Name", &["*public*"]),
        ],
      },
    )?;

    self.stack.add_resource(
      "autoscalingGroup",
      &aws::AutoscalingGroup {
        name: format!("{}-scaling-group", self.id),
        desired_capacity: 1,
        min_size: 0,
        max_size: 2,
        vpc_zone_identifier: subnets.attr("ids"),
        instance_refresh: aws::InstanceRefresh {
          strategy: "Rolling".to_owned(),
          preferences: aws::InstanceRefreshPreferences {
            min_healthy_percentage: 50,
          },
          triggers: vec!["tag".to_owned()],
        },
        tag: vec![
          aws::AsgTag {
            key: "Name".to_owned(),
            value: self.id.to_owned(),
            propagate_at_launch: true,
          },
          // Changes with every new template version, which starts an instance refresh
          aws::AsgTag {
            key: "latestTemplate".to_owned(),
            value: template.attr("latest_version"),
            propagate_at_launch: true,
          },
        ],
        mixed_instances_policy: aws::MixedInstancesPolicy {
          launch_template: aws::MixedLaunchTemplate {
            launch_template_specification: aws::LaunchTemplateSpecification {
              launch_template_id: template.attr("id"),
              version: "$Latest".to_owned(),
            },
            overrides: vec![aws::LaunchTemplateOverride {
              instance_type: self.config.instance_type.clone(),
              weighted_capacity: "1".to_owned(),
            }],
          },
          instances_distribution: aws::InstancesDistribution {
            on_demand_base_capacity: 0,
            on_demand_percentage_above_base_capacity: 0,
            spot_allocation_strategy: "lowest-price".to_owned(),
          },
        },
      },
    )
  }

  fn scaling_policies(&mut self, asg: &Reference) -> Result<()> {
    for (name, adjustment) in [("scale_up_policy", 1), ("scale_down_policy", -1)] {
      self.stack.add_resource(
        name,
        &aws::AutoscalingPolicy {
          name: name.to_owned(),
          autoscaling_group_name: asg.attr("name"),
          scaling_adjustment: adjustment,
          adjustment_type: "ChangeInCapacity".to_owned(),
        },
      )?;
    }

    Ok(())
  }

  fn schedules(&mut self, asg: &Reference) -> Result<()> {
    for schedule in &self.config.schedules {
      self.stack.add_resource(
        &schedule.block_name(),
        &aws::AutoscalingSchedule {
          scheduled_action_name: schedule.name.clone(),
          autoscaling_group_name: asg.attr("name"),
          desired_capacity: schedule.desired_capacity,
          min_size: schedule.min_size,
          max_size: schedule.max_size,
          recurrence: schedule.recurrence.clone(),
          time_zone: SCHEDULE_TIME_ZONE.to_owned(),
        },
      )?;
    }

    Ok(())
  }

  /// Running instances of the group, looked up by their propagated `Name` tag
  fn discovery(&mut self) -> Result<Reference> {
    let instances = self.stack.add_data(
      "asg_instances",
      &aws::DataInstances {
        filter: vec![Filter::new("tag:Name", &[self.id])],
        instance_state_names: vec!["running".to_owned()],
      },
    )?;

    self.stack.add_output(
      "asg_instance_ips",
      Output::new(instances.attr("public_ips")).with_description("Public IPs of instances in the autoscaling group"),
    )?;

    Ok(instances)
  }

  /// Static IP bound to one discovered instance and the records pointing at it
  ///
  /// The candidate is the lowest instance id, so repeated plans agree on it while the
  /// membership of the group is unchanged
  fn records(&mut self, instances: &Reference) -> Result<()> {
    let zone = self.stack.add_data(
      "hosted_zone",
      &aws::DataRoute53Zone {
        name: self.settings.hosted_zone(),
      },
    )?;

    let eip = self.stack.add_resource(
      "eip",
      &aws::Eip {
        domain: "vpc".to_owned(),
      },
    )?;

    let ids = instances.expr("ids");
    self.stack.add_resource(
      "eip_assoc",
      &aws::EipAssociation {
        count: format!("${{length({ids}) > 0 ? 1 : 0}}"),
        allocation_id: eip.attr("allocation_id"),
        instance_id: format!("${{sort({ids})[0]}}"),
      },
    )?;

    self.stack.add_check(
      "single_eip_candidate",
      Check {
        assert: vec![Assertion {
          condition: format!("${{length({ids}) <= 1}}"),
          error_message: format!(
            "More than one running instance of {} was found; the static IP is associated with the lowest instance id",
            self.id
          ),
        }],
      },
    )?;

    for (i, domain) in self.config.domains.iter().enumerate() {
      let record = self.stack.add_resource(
        &format!("ASGPublicIPs_{i}"),
        &aws::Route53Record {
          zone_id: zone.attr("zone_id"),
          name: domain.clone(),
          record_type: "A".to_owned(),
          ttl: RECORD_TTL,
          records: vec![eip.attr("public_ip")],
        },
      )?;
      self.stack.add_output(&format!("A_Record_{i}"), Output::new(record.attr("fqdn")))?;
      debug!("{}: A record {domain}", self.id);
    }

    Ok(())
  }
}
