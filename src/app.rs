use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{load_config_file, ConfigError, ConfigFile, SyncConfig};
use crate::export::{
    export_plan, export_script, render_plan, render_script, ExportError, ExportFormat,
    GeneratedScript, ScriptError,
};
use crate::parse::ParseError;
use crate::plan::{apply_plan, build_plan, ApplyReport, Plan, PlanError};
use crate::prompt::{PromptError, Prompter, TerminalPrompter};
use crate::provider::aws_cli::AwsCliProvider;
use crate::provider::SecurityGroupApi;
use crate::sheet::{read_workbook, SheetError};

/// Error type for `secgroup_sync` operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Prompt error
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Spreadsheet error
    #[error(transparent)]
    Sheet(#[from] SheetError),
    /// Plan error
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// Script error
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Export error
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

impl SyncError {
    /// Process exit code: 2 for a missing header row, 3 for an invalid network, else 1.
    pub fn exit_code(&self) -> i32 {
        let parse = match self {
            SyncError::Plan(PlanError::Parse(e)) | SyncError::Script(ScriptError::Parse(e)) => e,
            _ => return 1,
        };
        match parse {
            ParseError::Header(_) => 2,
            ParseError::InvalidNetwork { .. } => 3,
        }
    }
}

/// Spreadsheet-to-security-group CLI arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sync spreadsheet firewall rules into a cloud security group",
    long_about = "This program reads firewall rules from a spreadsheet (xlsx, ods, csv), \
                  compares them with the rules of a VPC security group and adds the \
                  missing ones after confirmation, or generates an equivalent shell script."
)]
pub struct Args {
    /// Action to run
    #[command(subcommand)]
    pub command: Command,

    /// Only print warnings and errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan the missing rules, ask for confirmation, then apply them
    Apply {
        /// Target settings
        #[command(flatten)]
        target: TargetArgs,

        /// Print the plan and stop
        #[arg(long)]
        dry_run: bool,

        /// Apply without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,

        /// Also save the plan (json, text)
        #[arg(long, short = 'e')]
        export: Option<ExportFormat>,

        /// Specify the plan output filename
        #[arg(long, short = 'o', requires = "export")]
        output: Option<String>,
    },
    /// Generate a standalone shell script using the aws client
    Script {
        /// Target settings
        #[command(flatten)]
        target: TargetArgs,

        /// Script filename [default: deploy_sg.sh]
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

/// Settings shared by every subcommand. Values given here override the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Path to a settings file (YAML or JSON)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Spreadsheet with the rules
    #[arg(long, short = 's')]
    pub source: Option<PathBuf>,

    /// VPC holding the security group
    #[arg(long)]
    pub vpc_id: Option<String>,

    /// Security group name
    #[arg(long)]
    pub group_name: Option<String>,

    /// Description used if the group has to be created
    #[arg(long)]
    pub group_description: Option<String>,

    /// Cloud region (client default if unset)
    #[arg(long)]
    pub region: Option<String>,

    /// Credentials profile (client default if unset)
    #[arg(long)]
    pub profile: Option<String>,
}

impl TargetArgs {
    /// Command-line values as a partial configuration.
    pub fn overrides(&self) -> ConfigFile {
        ConfigFile {
            vpc_id: self.vpc_id.clone(),
            group_name: self.group_name.clone(),
            group_description: self.group_description.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            source_table: self.source.clone(),
        }
    }

    /// Config file contents, if any, overridden by command-line values.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded.
    pub fn load(&self) -> Result<ConfigFile, ConfigError> {
        let base = match &self.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Ok(base.merge(self.overrides()))
    }
}

/// Script filename used when none is given.
pub const DEFAULT_SCRIPT_FILE: &str = "deploy_sg.sh";

/// The script filename: `output` if given, else asked for in an interactive run, else
/// [`DEFAULT_SCRIPT_FILE`].
///
/// # Errors
/// Returns the prompt error.
pub fn script_output<P>(
    output: Option<PathBuf>,
    interactive: bool,
    prompter: &mut P,
) -> Result<PathBuf, PromptError>
where
    P: Prompter + ?Sized,
{
    if let Some(output) = output {
        return Ok(output);
    }
    if !interactive {
        return Ok(PathBuf::from(DEFAULT_SCRIPT_FILE));
    }
    let answer = prompter.input("Output script filename", Some(DEFAULT_SCRIPT_FILE))?;
    let answer = answer.trim();
    Ok(PathBuf::from(if answer.is_empty() {
        DEFAULT_SCRIPT_FILE
    } else {
        answer
    }))
}

/// Options of the `apply` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Stop after printing the plan
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Save the plan in this format
    pub export: Option<ExportFormat>,
    /// Plan filename
    pub output: Option<String>,
}

/// How an `apply` run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Group exists and already holds every rule
    NothingToDo(Plan),
    /// Plan printed, nothing applied
    DryRun(Plan),
    /// Confirmation refused
    Aborted(Plan),
    /// Plan applied
    Applied(ApplyReport),
}

/// Plans, confirms and applies the rules of `config` against `api`.
///
/// No mutating call is made before the plan is shown and confirmed.
///
/// # Errors
/// Returns an error if the spreadsheet cannot be read or parsed, a remote call fails, or
/// the plan cannot be exported.
pub fn run_apply<A, P>(
    config: &SyncConfig,
    options: &ApplyOptions,
    api: &mut A,
    prompter: &mut P,
) -> Result<SyncOutcome, SyncError>
where
    A: SecurityGroupApi + ?Sized,
    P: Prompter + ?Sized,
{
    let workbook = read_workbook(&config.source_table)?;
    info!(
        "Loaded {} sheet(s) from {}",
        workbook.sheets.len(),
        config.source_table.display()
    );

    let plan = build_plan(&config.group_spec(), &workbook, api)?;
    println!("{}", render_plan(&plan));
    if let Some(format) = options.export {
        export_plan(&plan, format, options.output.as_deref())?;
    }

    if plan.is_empty() {
        return Ok(SyncOutcome::NothingToDo(plan));
    }
    if options.dry_run {
        info!("Dry run: no changes made.");
        return Ok(SyncOutcome::DryRun(plan));
    }
    let confirmed =
        options.yes || prompter.confirm("Proceed? Type 'yes' to apply, anything else to abort")?;
    if !confirmed {
        println!("Aborted. No changes made.");
        return Ok(SyncOutcome::Aborted(plan));
    }

    let report = apply_plan(&plan, api)?;
    info!("Done.");
    Ok(SyncOutcome::Applied(report))
}

/// Writes the deployment script for `config` to `output`.
///
/// # Errors
/// Returns an error if the spreadsheet cannot be read or parsed, or the script cannot be
/// written.
pub fn run_script(config: &SyncConfig, output: &Path) -> Result<GeneratedScript, SyncError> {
    let workbook = read_workbook(&config.source_table)?;
    let script = render_script(config, &workbook)?;
    export_script(&script, output)?;
    info!(
        "Prepared {} ingress and {} egress rule line(s).",
        script.ingress, script.egress
    );
    Ok(script)
}

/// Runs the subcommand given in `args` against the `aws` client and the terminal.
///
/// # Errors
/// Returns the first error of the subcommand.
pub fn run(args: Args) -> Result<(), SyncError> {
    let mut prompter = TerminalPrompter;
    match args.command {
        Command::Apply {
            target,
            dry_run,
            yes,
            export,
            output,
        } => {
            let config = target.load()?.resolve(&mut prompter)?;
            let mut api = AwsCliProvider::new(config.region.clone(), config.profile.clone());
            let options = ApplyOptions {
                dry_run,
                yes,
                export,
                output,
            };
            run_apply(&config, &options, &mut api, &mut prompter)?;
        }
        Command::Script { target, output } => {
            let file = target.load()?;
            let interactive = file.needs_prompt();
            let config = file.resolve(&mut prompter)?;
            let output = script_output(output, interactive, &mut prompter)?;
            run_script(&config, &output)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderError;
    use crate::ranges::RangeError;

    #[test]
    fn test_exit_codes() {
        let header = SyncError::Plan(PlanError::Parse(ParseError::Header(
            HeaderError::NotFound {
                sheet: "s".into(),
                seen: Vec::new(),
            },
        )));
        assert_eq!(header.exit_code(), 2);

        let network = SyncError::Script(ScriptError::Parse(ParseError::InvalidNetwork {
            sheet: "s".into(),
            row: 2,
            source: RangeError::InvalidNetwork {
                value: "10.0.0.0/99".into(),
            },
        }));
        assert_eq!(network.exit_code(), 3);

        let missing = SyncError::Config(ConfigError::Missing { field: "vpc_id" });
        assert_eq!(missing.exit_code(), 1);
    }

    #[test]
    fn test_cli_parsing() {
        let args = Args::try_parse_from([
            "secgroup_sync",
            "apply",
            "-s",
            "rules.xlsx",
            "--vpc-id",
            "vpc-1",
            "--group-name",
            "web",
            "--dry-run",
            "--export",
            "json",
            "-q",
        ])
        .unwrap();
        assert!(args.quiet);
        match args.command {
            Command::Apply {
                target,
                dry_run,
                yes,
                export,
                output,
            } => {
                assert!(dry_run);
                assert!(!yes);
                assert_eq!(export, Some(ExportFormat::Json));
                assert_eq!(output, None);
                let overrides = target.overrides();
                assert_eq!(overrides.vpc_id.as_deref(), Some("vpc-1"));
                assert_eq!(overrides.source_table, Some(PathBuf::from("rules.xlsx")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_script_default_output() {
        let args = Args::try_parse_from(["secgroup_sync", "script"]).unwrap();
        match args.command {
            Command::Script { output, target } => {
                assert_eq!(output, None);
                assert_eq!(target.overrides(), ConfigFile::default());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    struct Answer(&'static str, usize);

    impl Prompter for Answer {
        fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String, PromptError> {
            assert_eq!((prompt, default), ("Output script filename", Some("deploy_sg.sh")));
            self.1 += 1;
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_script_output_prompt() {
        let mut given = Answer("never.sh", 0);
        let path = script_output(Some(PathBuf::from("x.sh")), true, &mut given).unwrap();
        assert_eq!((path, given.1), (PathBuf::from("x.sh"), 0));

        let mut silent = Answer("never.sh", 0);
        let path = script_output(None, false, &mut silent).unwrap();
        assert_eq!((path, silent.1), (PathBuf::from(DEFAULT_SCRIPT_FILE), 0));

        let mut asked = Answer("edge.sh", 0);
        let path = script_output(None, true, &mut asked).unwrap();
        assert_eq!((path, asked.1), (PathBuf::from("edge.sh"), 1));

        let mut blank = Answer("  ", 0);
        let path = script_output(None, true, &mut blank).unwrap();
        assert_eq!(path, PathBuf::from(DEFAULT_SCRIPT_FILE));
    }

    #[test]
    fn test_output_requires_export() {
        assert!(Args::try_parse_from(["secgroup_sync", "apply", "-o", "plan.json"]).is_err());
    }
}
