use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::detector::{Finding, Severity};
use crate::flow::FlowConfig;
use crate::output::{self, OutputFormat};
use crate::runner::{ClassifierKind, Options, ScanHooks, Scanner};

fn print_banner() {
    const BANNER: &str = r#"
                 __                        _       __    __
    ____  _____ / /_  ___  _      _______(_)___ _/ /_  / /_
   / __ \/ ___// __ \/ _ \| | /| / / ___/ / __ `/ __ \/ __/
  / /_/ / /   / /_/ /  __/| |/ |/ / /  / / /_/ / / / / /_
 / .___/_/   /_.___/\___/ |__/|__/_/  /_/\__, /_/ /_/\__/
/_/                                     /____/
       web reconnaissance and vulnerability probing
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<12}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity);
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.dimmed(),
    }
}

fn finding_line(f: &Finding) -> String {
    format!(
        "{} {} {} {}",
        severity_label(f.severity),
        f.kind.bold(),
        f.endpoint,
        format!(":: {}", f.evidence).dimmed()
    )
}

#[derive(Clone, Debug)]
struct RunConfig {
    options: Options,
    output: Option<String>,
    output_format: OutputFormat,
    no_color: bool,
    quiet: bool,
    verbose: u8,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let target = args
        .url
        .or(cfg.target)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "a target URL is required (--url or `target` in the config)".to_string())?;

    let defaults = Options::default();

    let classifier_raw = args
        .classifier
        .or(cfg.classifier)
        .unwrap_or_else(|| "keyword".to_string());
    let classifier = ClassifierKind::parse(&classifier_raw)
        .ok_or_else(|| format!("invalid classifier '{classifier_raw}', expected keyword or none"))?;

    let guess_prefixes = match args.guess_prefixes.as_deref() {
        Some(raw) => crate::utils::parse_csv_list(raw),
        None => cfg.guess_prefixes.unwrap_or(defaults.guess_prefixes),
    };

    let history_index = args
        .history_index
        .or(cfg.history_index)
        .or(defaults.history_index)
        .filter(|i| !i.trim().is_empty());

    let flow = FlowConfig {
        max_steps: args
            .flow_steps
            .or(cfg.flow_steps)
            .unwrap_or(defaults.flow.max_steps),
        rewards: cfg.flow_rewards.unwrap_or(defaults.flow.rewards),
    };

    let options = Options {
        target,
        rate: args.rate.or(cfg.rate).unwrap_or(defaults.rate),
        workers: args.workers.or(cfg.workers).unwrap_or(defaults.workers),
        timeout_seconds: args
            .timeout
            .or(cfg.timeout)
            .unwrap_or(defaults.timeout_seconds),
        proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
        follow_redirects: args
            .follow_redirects
            .or(cfg.follow_redirects)
            .unwrap_or(defaults.follow_redirects),
        history_index,
        history_limit: args
            .history_limit
            .or(cfg.history_limit)
            .unwrap_or(defaults.history_limit),
        skip_history: args.skip_history || cfg.skip_history.unwrap_or(false),
        skip_flow: args.skip_flow || cfg.skip_flow.unwrap_or(false),
        skip_context: args.skip_context || cfg.skip_context.unwrap_or(false),
        skip_method_audit: args.skip_method_audit || cfg.skip_method_audit.unwrap_or(false),
        top_words: args
            .top_words
            .or(cfg.top_words)
            .unwrap_or(defaults.top_words),
        guess_prefixes,
        flow,
        size_deviation: args
            .size_deviation
            .or(cfg.size_deviation)
            .unwrap_or(defaults.size_deviation),
        fuzz_params: args
            .fuzz_params
            .or(cfg.fuzz_params)
            .unwrap_or(defaults.fuzz_params),
        min_secret_entropy: args
            .min_secret_entropy
            .or(cfg.min_secret_entropy)
            .unwrap_or(defaults.min_secret_entropy),
        hamming_threshold: args
            .hamming_threshold
            .or(cfg.hamming_threshold)
            .unwrap_or(defaults.hamming_threshold),
        jaccard_threshold: args
            .jaccard_threshold
            .or(cfg.jaccard_threshold)
            .unwrap_or(defaults.jaccard_threshold),
        circuit_threshold: args
            .circuit_threshold
            .or(cfg.circuit_threshold)
            .unwrap_or(defaults.circuit_threshold),
        circuit_cooldown_seconds: args
            .circuit_cooldown
            .or(cfg.circuit_cooldown)
            .unwrap_or(defaults.circuit_cooldown_seconds),
        classifier,
    };

    let output = args.output.or(cfg.output).filter(|o| !o.trim().is_empty());
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Text),
    };

    Ok(RunConfig {
        options,
        output,
        output_format,
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
        quiet: args.quiet,
        verbose: args.verbose,
    })
}

fn init_tracing(verbose: u8, no_color: bool) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    init_tracing(run.verbose, run.no_color);
    print_banner();

    let opts = &run.options;
    format_kv_line("Target", &opts.target);
    format_kv_line("Rate", &format!("{} req/s", opts.rate));
    format_kv_line("Workers", &opts.workers.to_string());
    format_kv_line("Timeout", &format!("{}s", opts.timeout_seconds));
    format_kv_line("Proxy", opts.proxy.as_deref().unwrap_or("none"));
    format_kv_line(
        "History",
        if opts.skip_history {
            "skipped"
        } else {
            opts.history_index.as_deref().unwrap_or("none")
        },
    );
    format_kv_line("Flow", &format!("{} steps, skip={}", opts.flow.max_steps, format_bool(opts.skip_flow)));
    format_kv_line("Output", run.output.as_deref().unwrap_or("stdout"));
    println!();

    let scanner = Scanner::new(run.options.clone()).map_err(|e| e.to_string())?;

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(":: {spinner} Duration: [{elapsed_precise}] :: {msg}")
            .map_err(|e| format!("failed to build progress bar style: {e}"))?,
    );

    let log_pb = pb.clone();
    let finding_pb = pb.clone();
    let quiet = run.quiet;
    let hooks = ScanHooks::default()
        .on_log(move |line| log_pb.set_message(crate::utils::truncate_chars(line, 80)))
        .on_finding(move |f| {
            if !quiet {
                finding_pb.println(finding_line(f));
            }
        });

    let report = scanner.with_hooks(hooks).run().await;
    pb.finish_and_clear();

    println!();
    println!(
        ":: {} :: {} findings ({}) across {} URLs in {:.1}s ::",
        report.phase.as_str().to_uppercase(),
        report.findings.len(),
        output::severity_summary(&report),
        report.urls_visited,
        report.elapsed_seconds
    );

    match run.output.as_deref() {
        Some(outfile_path) => {
            let rendered = output::render(&report, run.output_format);
            let mut outfile = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(outfile_path)
                .await
                .map_err(|e| format!("failed to open output file: {e}"))?;
            outfile
                .write_all(&rendered)
                .await
                .map_err(|_| "failed to write output file".to_string())?;
        }
        None if run.output_format == OutputFormat::Json => {
            println!("{}", String::from_utf8_lossy(&output::render_json(&report)));
        }
        None => {}
    }

    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", e);
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    if args.init_config {
        let path = match args.config.as_deref() {
            Some(p) => config::expand_tilde(p),
            None => config::default_config_path()
                .ok_or_else(|| "cannot determine home directory for config".to_string())?,
        };
        config::ensure_default_config_file(&path)?;
        println!("config written to {}", path.display());
        return Ok(());
    }

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_apply_without_config() {
        let args = CliArgs::parse_from(["probewright", "-u", "http://example.com/"]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.options.rate, 20);
        assert_eq!(run.options.workers, 10);
        assert!(run.options.follow_redirects);
        assert_eq!(run.options.guess_prefixes, vec!["/", "/api/"]);
        assert_eq!(run.output_format, OutputFormat::Text);
    }

    #[test]
    fn cli_wins_over_config() {
        let args = CliArgs::parse_from(["probewright", "-u", "http://example.com/", "-r", "7"]);
        let cfg = ConfigFile {
            rate: Some(3),
            workers: Some(2),
            ..Default::default()
        };
        let run = build_run_config(args, cfg).unwrap();
        assert_eq!(run.options.rate, 7);
        assert_eq!(run.options.workers, 2);
    }

    #[test]
    fn target_can_come_from_config() {
        let args = CliArgs::parse_from(["probewright"]);
        let cfg = ConfigFile {
            target: Some("https://shop.test/".to_string()),
            ..Default::default()
        };
        let run = build_run_config(args, cfg).unwrap();
        assert_eq!(run.options.target, "https://shop.test/");
    }

    #[test]
    fn missing_target_is_an_error() {
        let args = CliArgs::parse_from(["probewright"]);
        assert!(build_run_config(args, ConfigFile::default()).is_err());
    }

    #[test]
    fn output_format_is_inferred_from_extension() {
        let args = CliArgs::parse_from(["probewright", "-u", "http://example.com/", "-o", "r.json"]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.output_format, OutputFormat::Json);
    }

    #[test]
    fn skip_flags_and_prefixes_parse() {
        let args = CliArgs::parse_from([
            "probewright",
            "-u",
            "http://example.com/",
            "--skip-history",
            "--skip-flow",
            "--guess-prefixes",
            "/v2/, /internal/",
            "--classifier",
            "none",
            "--follow-redirects",
            "false",
        ]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert!(run.options.skip_history);
        assert!(run.options.skip_flow);
        assert_eq!(run.options.guess_prefixes, vec!["/v2/", "/internal/"]);
        assert_eq!(run.options.classifier, ClassifierKind::Passthrough);
        assert!(!run.options.follow_redirects);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = CliArgs::parse_from(["probewright", "-u", "http://example.com/", "-w", "0"]);
        assert!(build_run_config(args, ConfigFile::default()).is_err());
        let args = CliArgs::parse_from(["probewright", "-u", "ftp://example.com/"]);
        assert!(build_run_config(args, ConfigFile::default()).is_err());
    }
}
