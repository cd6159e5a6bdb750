// SPDX-License-Identifier: AGPL-3.0

//! scry: symbolic security analysis of recorded contract executions

use anyhow::{Context, Result};
use colored::Colorize;
use scry_analysis::{
    DetectionModulePluginBuilder, EntryPoint, Issue, IssueConfirmationPluginBuilder, ModuleContext,
    ModuleLoader, Severity,
};
use scry_config::Config;
use scry_plugin::{InstructionCoveragePluginBuilder, PluginLoader};
use scry_sevm::{replay, ExecutionTrace, Sevm, SevmOptions};
use scry_solver::{ExternalSolver, SolverBridge, Z3Solver};
use std::fs;
use std::sync::Arc;
use std::time::Instant;

mod report;

use report::{Exitcode, MainResult};

fn main() {
    let exitcode = match _main() {
        Ok(result) => result.exitcode,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            Exitcode::Error as i32
        }
    };
    std::process::exit(exitcode)
}

/// Command line first, then the config file underneath it
fn load_config() -> Result<Config> {
    let (cli, matches) = Config::from_command_line()?;
    let mut config = match cli.resolve_config_path() {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    config.merge(cli, &matches);
    Ok(config)
}

fn _main() -> Result<MainResult> {
    let start_time = Instant::now();
    let config = load_config()?;
    scry_logs::init(config.verbose, config.json_logs);

    let trace_path = config
        .trace
        .clone()
        .context("no execution trace given (pass a path or set `trace` in the config file)")?;
    let trace = ExecutionTrace::from_file(&trace_path)?;

    let solver = make_solver(&config)?;
    tracing::info!(solver = solver.name(), "solver ready");

    let module_loader = ModuleLoader::with_default_modules(ModuleContext::new(solver.clone()));
    let white_list = config.parse_modules()?;
    let mut modules = module_loader.get_detection_modules(EntryPoint::Callback, Some(white_list.as_slice()))?;
    modules.extend(module_loader.get_detection_modules(EntryPoint::Post, Some(white_list.as_slice()))?);
    tracing::info!(
        modules = ?modules.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
        "detection modules selected"
    );

    let plugin_loader = PluginLoader::new();
    plugin_loader.load(Arc::new(InstructionCoveragePluginBuilder::new()));
    plugin_loader.load(Arc::new(DetectionModulePluginBuilder::new(modules)));
    plugin_loader.load(Arc::new(IssueConfirmationPluginBuilder::new(solver)));
    for name in config.parse_disabled_plugins()? {
        plugin_loader.disable(&name)?;
    }

    let mut sevm = Sevm::new(SevmOptions {
        workers: config.get_workers(),
        max_depth: config.max_depth,
    });
    let with_plugins = config.parse_with_plugins()?;
    let instrumented = plugin_loader.instrument(&mut sevm, with_plugins.as_deref());
    tracing::info!(plugins = ?instrumented, "executor instrumented");

    print_banner(&trace);
    let summary = replay(&sevm, &trace)?;
    let issues = module_loader.issues();

    let result = MainResult::new(
        issues,
        summary.completed_paths,
        summary.pruned_paths,
        start_time.elapsed(),
    );
    print_issues(&result.issues);
    print_summary(&result);

    if let Some(path) = &config.json_output {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!(path = %path.display(), "findings written");
    }

    Ok(result)
}

fn make_solver(config: &Config) -> Result<Arc<dyn SolverBridge>> {
    let timeout_ms = config.solver_timeout_ms()?;
    if !config.uses_external_solver() {
        return Ok(Arc::new(Z3Solver::new(timeout_ms)));
    }

    let mut solver = ExternalSolver::new(config.resolved_solver_command()?, timeout_ms);
    if let Some(directory) = &config.dump_smt_directory {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create {:?}", directory))?;
        solver = solver.with_dump_directory(directory.clone());
    }
    Ok(Arc::new(solver))
}

fn print_banner(trace: &ExecutionTrace) {
    println!(
        "\n{} {} ({} transaction{})",
        "Analyzing".cyan().bold(),
        trace.contract.bold(),
        trace.transactions.len(),
        if trace.transactions.len() == 1 { "" } else { "s" }
    );
}

fn print_issues(issues: &[Issue]) {
    for issue in issues {
        let severity = match issue.severity() {
            Severity::High => issue.severity().to_string().red().bold(),
            Severity::Medium => issue.severity().to_string().yellow().bold(),
            Severity::Low => issue.severity().to_string().normal(),
        };
        println!(
            "\n{} {} (SWC-{})",
            format!("[{}]", severity).bold(),
            issue.title().bold(),
            issue.swc_id()
        );
        println!("  {}::{} at {:#06x}", issue.contract(), issue.function(), issue.address());
        for line in issue.description().lines() {
            println!("  {}", line);
        }
        if let Some(sequence) = issue.transaction_sequence() {
            for step in &sequence.steps {
                println!(
                    "  {} {} caller={} value={} calldata={}",
                    "tx".dimmed(),
                    step.transaction_id,
                    step.caller.as_deref().unwrap_or("*"),
                    step.call_value.as_deref().unwrap_or("*"),
                    step.calldata.as_deref().unwrap_or("*"),
                );
            }
        }
    }
}

fn print_summary(result: &MainResult) {
    let found = if result.has_issues() {
        format!("{} issue(s)", result.issues.len()).red()
    } else {
        "no issues".green()
    };
    let by_severity = result
        .count_by_severity()
        .iter()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "\n{} {}{}, {} paths completed, {} pruned ({}ms)",
        "Summary:".yellow().bold(),
        found,
        if by_severity.is_empty() { String::new() } else { format!(" ({})", by_severity) },
        result.completed_paths,
        result.pruned_paths,
        result.duration.as_millis()
    );
}
