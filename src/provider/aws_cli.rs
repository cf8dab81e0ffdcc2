use std::ffi::OsStr;
use std::process::{Command, Output};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::provider::{
    IpPermission, ProviderError, RemoteRule, SecurityGroupApi, DUPLICATE_PERMISSION_CODE,
};

/// Security-group API backed by the `aws` command-line client.
///
/// Every call runs `aws ec2 <operation> ... --output json` and decodes stdout.
#[derive(Debug, Clone)]
pub struct AwsCliProvider {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<GroupSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupSummary {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateSecurityGroup {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroupRules {
    #[serde(default)]
    security_group_rules: Vec<RemoteRule>,
}

impl AwsCliProvider {
    /// Client using `region` and `profile`, or the CLI defaults when unset.
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            region,
            profile,
        }
    }

    /// Uses another client executable instead of `aws` from `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command<I, S>(&self, operation: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.arg("ec2").arg(operation);
        if let Some(region) = &self.region {
            cmd.arg("--region").arg(region);
        }
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.args(args).arg("--output").arg("json");
        cmd
    }

    fn run<T: DeserializeOwned>(
        &self,
        operation: &str,
        mut cmd: Command,
    ) -> Result<T, ProviderError> {
        debug!("Running {} ec2 {}", self.program, operation);
        let output = cmd.output().map_err(|source| ProviderError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        decode_output(operation, &output)
    }

    fn send_permissions(
        &self,
        operation: &str,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        let payload =
            serde_json::to_string(permissions).map_err(|source| ProviderError::Decode {
                operation: operation.to_string(),
                source,
            })?;
        let cmd = self.command(
            operation,
            ["--group-id", group_id, "--ip-permissions", payload.as_str()],
        );
        let _: serde_json::Value = self.run(operation, cmd)?;
        Ok(())
    }
}

/// Maps a finished client process to a decoded response or a typed error.
fn decode_output<T: DeserializeOwned>(
    operation: &str,
    output: &Output,
) -> Result<T, ProviderError> {
    if !output.status.success() {
        return Err(classify_failure(
            operation,
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let body = if stdout.trim().is_empty() {
        "null"
    } else {
        stdout.as_ref()
    };
    serde_json::from_str(body).map_err(|source| ProviderError::Decode {
        operation: operation.to_string(),
        source,
    })
}

fn classify_failure(operation: &str, code: Option<i32>, stderr: &str) -> ProviderError {
    let message = stderr.trim().to_string();
    if message.contains(DUPLICATE_PERMISSION_CODE) {
        ProviderError::DuplicatePermission {
            operation: operation.to_string(),
            message,
        }
    } else {
        ProviderError::CallFailed {
            operation: operation.to_string(),
            code,
            message,
        }
    }
}

impl SecurityGroupApi for AwsCliProvider {
    fn find_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>, ProviderError> {
        let operation = "describe-security-groups";
        let cmd = self.command(
            operation,
            [
                "--filters".to_string(),
                format!("Name=vpc-id,Values={vpc_id}"),
                format!("Name=group-name,Values={name}"),
            ],
        );
        let resp: DescribeSecurityGroups = self.run(operation, cmd)?;
        Ok(resp.security_groups.into_iter().next().map(|g| g.group_id))
    }

    fn create_group(
        &mut self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String, ProviderError> {
        let operation = "create-security-group";
        let cmd = self.command(
            operation,
            [
                "--group-name".to_string(),
                name.to_string(),
                "--description".to_string(),
                description.to_string(),
                "--vpc-id".to_string(),
                vpc_id.to_string(),
                "--tag-specifications".to_string(),
                format!("ResourceType=security-group,Tags=[{{Key=Name,Value={name}}}]"),
            ],
        );
        let resp: CreateSecurityGroup = self.run(operation, cmd)?;
        Ok(resp.group_id)
    }

    fn list_rules(&self, group_id: &str) -> Result<Vec<RemoteRule>, ProviderError> {
        let operation = "describe-security-group-rules";
        let cmd = self.command(
            operation,
            ["--filters".to_string(), format!("Name=group-id,Values={group_id}")],
        );
        let resp: DescribeSecurityGroupRules = self.run(operation, cmd)?;
        Ok(resp.security_group_rules)
    }

    fn authorize_ingress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        self.send_permissions("authorize-security-group-ingress", group_id, permissions)
    }

    fn authorize_egress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        self.send_permissions("authorize-security-group-egress", group_id, permissions)
    }
}
