//! CPU alarms for the node groups, when detailed monitoring is on

use super::compute;
use crate::bootstrap::NodeRole;
use crate::composer::{Adapter, AdapterContext};
use crate::template::{Fragment, reference};
use serde_json::json;
use stackflow_cloud::Result;

const CPU_ALARM_THRESHOLD: u32 = 90;

#[derive(Debug, Default)]
pub struct MonitoringAdapter;

impl Adapter for MonitoringAdapter {
    fn name(&self) -> &str {
        "monitoring"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        if !ctx.spec.monitoring_enabled(ctx.config) {
            return Ok(Fragment::new());
        }

        let mut fragment = Fragment::new();
        for role in [NodeRole::Master, NodeRole::Worker] {
            let name = match role {
                NodeRole::Master => "MasterCPUAlarm",
                NodeRole::Worker => "WorkerCPUAlarm",
            };
            fragment = fragment.resource(
                name,
                json!({
                    "Type": "AWS::CloudWatch::Alarm",
                    "Properties": {
                        "AlarmDescription": format!("{} {} CPU utilization", ctx.spec.id, role),
                        "Namespace": "AWS/EC2",
                        "MetricName": "CPUUtilization",
                        "Statistic": "Average",
                        "Period": 300,
                        "EvaluationPeriods": 2,
                        "Threshold": CPU_ALARM_THRESHOLD,
                        "ComparisonOperator": "GreaterThanThreshold",
                        "Dimensions": [{
                            "Name": "AutoScalingGroupName",
                            "Value": reference(compute::autoscaling_group(role)),
                        }],
                    }
                }),
            );
        }
        Ok(fragment)
    }
}
