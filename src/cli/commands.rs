//! Command implementations
//!
//! Resolves configuration, selects tests, builds the subscribed sinks and
//! hands everything to the suite driver.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Args, Command, OutputArgs, ReporterArgs, RunArgs, SelectionArgs};
use crate::config::{ConfigFile, EnvConfig, HarnessConfig};
use crate::executor::{Executor, SuiteDriver, TestRunner};
use crate::library::TestLibrary;
use crate::models::{CompileInfo, EventKind, Mask, SuiteTotals, TestPair};
use crate::report::{
    ColorPolicy, ConsoleReport, Destination, JUnitReport, JsonReport, OpenMode, Report, Sink,
    Subscription, TeamCityReport,
};
use crate::selection::{expand, select, ParamTable};

/// Settings after merging the config file, environment, profile and flags
#[derive(Clone, Debug)]
pub struct Resolved {
    pub harness: HarnessConfig,
    pub selection: SelectionArgs,
}

/// Execute a parsed command line against `library`
pub async fn run<L: TestLibrary + 'static>(library: Arc<L>, args: Args) -> Result<()> {
    let env = EnvConfig::load();
    if env.has_any() {
        debug!("Environment overrides: {:?}", env);
    }
    let config_path = args.config.clone().or_else(|| env.config_file.clone());
    let file = match &config_path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };
    let harness = file.harness.clone().with_env(&env);

    match args.command {
        Command::List(selection) => {
            let resolved = resolve(&file, harness, selection, None)?;
            for pair in collect_pairs(library.as_ref(), &resolved.selection)? {
                println!("{}", library.test_name(pair.index));
            }
            Ok(())
        }
        Command::Run(run_args) => {
            let resolved = resolve(&file, harness, run_args.selection.clone(), run_args.jobs)?;
            let pairs = collect_pairs(library.as_ref(), &resolved.selection)?;

            if run_args.list {
                for pair in &pairs {
                    println!("{}", library.test_name(pair.index));
                }
                return Ok(());
            }

            let totals = run_suite(library, &run_args, &resolved, pairs).await?;
            info!("{}", totals);
            Ok(())
        }
    }
}

/// Apply a named profile and command-line overrides on top of the file settings
pub fn resolve(
    file: &ConfigFile,
    mut harness: HarnessConfig,
    mut selection: SelectionArgs,
    jobs: Option<usize>,
) -> Result<Resolved> {
    if let Some(name) = &selection.profile {
        let profile = file
            .profile(name)
            .with_context(|| format!("Unknown profile '{name}'"))?;
        debug!("Using profile '{}'", profile.name);

        if selection.tests.is_empty() && selection.regex.is_none() {
            selection.tests = profile.tests.clone();
            selection.regex = profile.regex.clone();
            selection.exclude |= profile.exclude;
        }
        if selection.params.is_none() {
            selection.params = profile.params.clone();
        }
        if let Some(jobs) = profile.jobs {
            harness.jobs = jobs;
        }
    }

    if let Some(jobs) = jobs {
        harness.jobs = jobs;
    }
    harness.validate()?;

    Ok(Resolved { harness, selection })
}

/// Resolve names, regex, exclusion and parameters into execution pairs
fn collect_pairs<L: TestLibrary + ?Sized>(
    library: &L,
    selection: &SelectionArgs,
) -> Result<Vec<TestPair>> {
    let names: Vec<String> = (0..library.test_count())
        .map(|i| library.test_name(i))
        .collect();
    let indices = select(
        &names,
        &selection.tests,
        selection.exclude,
        selection.regex.as_deref(),
    )?;

    let table = match &selection.params {
        Some(source) => ParamTable::load(source)?,
        None => ParamTable::new(),
    };

    let pairs = expand(library, indices, &table).collect::<Result<Vec<_>, _>>()?;
    debug!("Expanded selection into {} runs", pairs.len());
    Ok(pairs)
}

async fn run_suite<L: TestLibrary + 'static>(
    library: Arc<L>,
    args: &RunArgs,
    resolved: &Resolved,
    pairs: Vec<TestPair>,
) -> Result<SuiteTotals> {
    let harness = &resolved.harness;
    let mut sinks = build_sinks(&args.output, &args.reporters, harness, library.compile_info())?;

    let capture = args.capture || harness.capture;
    let runner = TestRunner::new(library).with_capture(capture, capture);
    let driver = SuiteDriver::new(runner, Executor::from_jobs(harness.jobs));

    info!("Running {} test(s) with {} job(s)", pairs.len(), harness.jobs.max(1));
    let totals = driver.run_suite(pairs, &mut sinks).await?;
    Ok(totals)
}

/// Build every requested sink with its mask. Nothing is opened here.
pub fn build_sinks(
    output: &OutputArgs,
    reporters: &ReporterArgs,
    harness: &HarnessConfig,
    compile_info: CompileInfo,
) -> Result<Vec<Subscription<Sink>>> {
    let console_mask = match output.event_flags() {
        Some(flags) => Mask::new(flags),
        None => harness.event_mask()?,
    };
    let suite = reporters.suite.clone().unwrap_or_else(|| harness.suite.clone());
    let mut sinks = Vec::new();

    if !output.quiet {
        let mode = parse_mode(&output.out_mode)?;
        let color = if output.no_color {
            ColorPolicy::Never
        } else {
            match &output.color {
                Some(name) => ColorPolicy::from_str(name)
                    .with_context(|| format!("Unknown color policy '{name}'"))?,
                None => harness.color_policy()?,
            }
        };
        let console = ConsoleReport::new(Destination::parse(&output.out, mode))
            .with_color(color)
            .brief(output.brief || harness.brief)
            .with_timing(output.timing)
            .with_compile_info(compile_info.clone());
        sinks.push(Subscription::new(Sink::from(console), console_mask)?);
    }

    if let Some(path) = &reporters.xml {
        let mode = parse_mode(&reporters.xml_mode)?;
        let junit = JUnitReport::new(Destination::parse(path, mode), suite.clone())
            .with_compile_info(compile_info.clone());
        sinks.push(Subscription::new(Sink::from(junit), Mask::problems())?);
    }

    if let Some(path) = &reporters.teamcity {
        let mask = if output.skip {
            Mask::problems().with(EventKind::Skipped)
        } else {
            Mask::problems()
        };
        let teamcity = TeamCityReport::new(Destination::parse(path, OpenMode::Truncate), suite)
            .with_compile_info(compile_info.clone());
        sinks.push(Subscription::new(Sink::from(teamcity), mask)?);
    }

    if let Some(path) = &reporters.json {
        let indent = reporters.json_indent.or(harness.json_indent);
        let json = JsonReport::new(Destination::parse(path, OpenMode::Truncate))
            .with_indent(indent)
            .with_compile_info(compile_info);
        sinks.push(Subscription::new(Sink::from(json), console_mask)?);
    }

    debug!(
        "Subscribed sinks: {:?}",
        sinks.iter().map(|s| s.report.name()).collect::<Vec<_>>()
    );
    Ok(sinks)
}

fn parse_mode(mode: &str) -> Result<OpenMode> {
    OpenMode::from_str(mode).with_context(|| format!("Unknown file mode '{mode}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionProfile;
    use crate::library::TestSuite;
    use clap::Parser;
    use serde_json::json;
    use tempfile::tempdir;

    fn library() -> TestSuite {
        let mut suite = TestSuite::new();
        suite.test("math/add", |ctx, args| {
            ctx.equal(&args.len(), &2);
            Ok(None)
        })
        .arity(2)
        .pack(vec![json!(1), json!(2)])
        .pack(vec![json!(3), json!(4)]);
        suite.test("net/connect", |ctx, _| {
            ctx.skip("offline");
            Ok(None)
        });
        suite.test("net/listen", |ctx, _| {
            ctx.require(false);
            Ok(None)
        });
        suite
    }

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["unitrun", "run"];
        full.extend_from_slice(argv);
        match Args::parse_from(full).command {
            Command::Run(args) => args,
            Command::List(_) => unreachable!(),
        }
    }

    #[test]
    fn test_collect_pairs_expands_packs() {
        let selection = SelectionArgs {
            regex: Some("math".to_string()),
            ..SelectionArgs::default()
        };
        let pairs = collect_pairs(&library(), &selection).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.index == 0));
    }

    #[test]
    fn test_collect_pairs_unknown_name() {
        let selection = SelectionArgs {
            tests: vec!["missing".to_string()],
            ..SelectionArgs::default()
        };
        let err = collect_pairs(&library(), &selection).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_resolve_profile() {
        let mut file = ConfigFile::default();
        let mut profile = SelectionProfile::new("network").with_regex("net/");
        profile.jobs = Some(3);
        file.profiles.push(profile);

        let selection = SelectionArgs {
            profile: Some("network".to_string()),
            ..SelectionArgs::default()
        };
        let resolved = resolve(&file, HarnessConfig::default(), selection, None).unwrap();
        assert_eq!(resolved.selection.regex.as_deref(), Some("net/"));
        assert_eq!(resolved.harness.jobs, 3);

        let pairs = collect_pairs(&library(), &resolved.selection).unwrap();
        let indices: Vec<_> = pairs.iter().map(|p| p.index).collect();
        assert_eq!(indices, [1, 2]);
    }

    #[test]
    fn test_resolve_cli_wins() {
        let mut file = ConfigFile::default();
        file.profiles.push(SelectionProfile::new("network").with_regex("net/"));

        let selection = SelectionArgs {
            tests: vec!["math/add".to_string()],
            profile: Some("network".to_string()),
            ..SelectionArgs::default()
        };
        let resolved = resolve(&file, HarnessConfig::default(), selection, Some(2)).unwrap();
        assert_eq!(resolved.selection.regex, None);
        assert_eq!(resolved.harness.jobs, 2);

        let selection = SelectionArgs {
            profile: Some("absent".to_string()),
            ..SelectionArgs::default()
        };
        assert!(resolve(&file, HarnessConfig::default(), selection, None).is_err());
    }

    #[test]
    fn test_build_sinks_masks() {
        let dir = tempdir().unwrap();
        let xml = dir.path().join("out.xml");
        let tc = dir.path().join("tc.log");
        let args = run_args(&[
            "-fs",
            "-k",
            "--xml",
            xml.to_str().unwrap(),
            "--teamcity",
            tc.to_str().unwrap(),
        ]);

        let sinks = build_sinks(
            &args.output,
            &args.reporters,
            &HarnessConfig::default(),
            CompileInfo::default(),
        )
        .unwrap();
        let names: Vec<_> = sinks.iter().map(|s| s.report.name()).collect();
        assert_eq!(names, ["console", "junit", "teamcity"]);
        assert_eq!(
            sinks[0].mask,
            Mask::from_kinds(&[EventKind::Failure, EventKind::Success, EventKind::Skipped])
        );
        assert_eq!(sinks[1].mask, Mask::problems());
        assert!(sinks[2].mask.contains(EventKind::Skipped));
        assert!(!sinks[2].mask.contains(EventKind::Success));
    }

    #[test]
    fn test_build_sinks_quiet_default_mask() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("out.json");
        let args = run_args(&["-q", "--json", json_path.to_str().unwrap()]);

        let sinks = build_sinks(
            &args.output,
            &args.reporters,
            &HarnessConfig::default(),
            CompileInfo::default(),
        )
        .unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].report.name(), "json");
        assert_eq!(sinks[0].mask, Mask::problems());
    }

    #[test]
    fn test_build_sinks_rejects_bad_mode() {
        let args = run_args(&["--out-mode", "x"]);
        assert!(build_sinks(
            &args.output,
            &args.reporters,
            &HarnessConfig::default(),
            CompileInfo::default(),
        )
        .is_err());
    }

    #[test]
    fn test_list_opens_no_reports() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("unitrun.yaml");
        std::fs::write(&config_path, "profiles:\n  - name: net\n    regex: net/\n").unwrap();
        let xml_path = dir.path().join("out.xml");

        let args = Args::parse_from([
            "unitrun",
            "--config",
            config_path.to_str().unwrap(),
            "run",
            "--list",
            "--profile",
            "net",
            "--xml",
            xml_path.to_str().unwrap(),
        ]);
        tokio_test::block_on(run(Arc::new(library()), args)).unwrap();
        assert!(!xml_path.exists());

        let args = Args::parse_from([
            "unitrun",
            "--config",
            config_path.to_str().unwrap(),
            "list",
            "--profile",
            "missing",
        ]);
        assert!(tokio_test::block_on(run(Arc::new(library()), args)).is_err());
    }

    #[tokio::test]
    async fn test_run_writes_reports() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("out.json");
        let xml_path = dir.path().join("out.xml");
        let args = Args::parse_from([
            "unitrun",
            "--config",
            dir.path().join("none.yaml").to_str().unwrap(),
            "run",
            "-q",
            "-j",
            "2",
            "--json",
            json_path.to_str().unwrap(),
            "--xml",
            xml_path.to_str().unwrap(),
        ]);
        // missing config file is an error
        assert!(run(Arc::new(library()), args).await.is_err());

        let config_path = dir.path().join("unitrun.yaml");
        std::fs::write(&config_path, "harness:\n  suite: nightly\n").unwrap();
        let args = Args::parse_from([
            "unitrun",
            "--config",
            config_path.to_str().unwrap(),
            "run",
            "-q",
            "-j",
            "2",
            "--json",
            json_path.to_str().unwrap(),
            "--xml",
            xml_path.to_str().unwrap(),
        ]);
        run(Arc::new(library()), args).await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(doc["tests"].as_array().unwrap().len(), 4);

        let xml = std::fs::read_to_string(&xml_path).unwrap();
        assert!(xml.contains(r#"name="nightly""#));
        assert!(xml.contains(r#"tests="4""#));
    }

    #[tokio::test]
    async fn test_unknown_test_leaves_existing_reports_untouched() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("unitrun.yaml");
        std::fs::write(&config_path, "harness:\n  suite: nightly\n").unwrap();
        let out_path = dir.path().join("console.txt");
        let xml_path = dir.path().join("junit.xml");
        std::fs::write(&out_path, "previous console log\n").unwrap();
        std::fs::write(&xml_path, "<testsuites/>\n").unwrap();

        let args = Args::parse_from([
            "unitrun",
            "--config",
            config_path.to_str().unwrap(),
            "run",
            "missing",
            "--out",
            out_path.to_str().unwrap(),
            "--xml",
            xml_path.to_str().unwrap(),
            "--xml-mode",
            "w",
        ]);
        let err = run(Arc::new(library()), args).await.unwrap_err();
        assert!(err.to_string().contains("missing"));

        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "previous console log\n");
        assert_eq!(std::fs::read_to_string(&xml_path).unwrap(), "<testsuites/>\n");
    }
}
