//! vme-analysis command line entry point
//!
//! Inspects, upgrades and replays analysis files without a DAQ attached.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vme_analysis::{
    config::{AnalysisFile, AnalysisSettings, RunInfo, VmeConfig},
    pipeline::{Analysis, NodeKind},
    VmeConfigLookup,
};

#[derive(Parser, Debug)]
#[command(name = "vme-analysis", version, about = "VME DAQ analysis tools")]
struct Cli {
    /// Settings file to use instead of the one in the config directory
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load an analysis file and print a summary
    Info {
        file: PathBuf,
        #[arg(long)]
        vme_config: Option<PathBuf>,
    },
    /// Convert an analysis file to the current format
    Upgrade {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        vme_config: Option<PathBuf>,
    },
    /// Feed raw words through an analysis and print histogram summaries
    Replay {
        file: PathBuf,
        #[arg(long)]
        vme_config: PathBuf,
        /// Text file with one event per line of whitespace separated hex words
        #[arg(long)]
        words: PathBuf,
        #[arg(long, default_value_t = 0)]
        event: usize,
        #[arg(long, default_value_t = 0)]
        module: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => AnalysisSettings::load(path)?,
        None => AnalysisSettings::load_or_default(),
    };
    let _guard = init_logging(&settings);

    match cli.command {
        Command::Info { file, vme_config } => info(&file, vme_config.as_deref(), settings),
        Command::Upgrade {
            file,
            output,
            vme_config,
        } => upgrade(&file, &output, vme_config.as_deref()),
        Command::Replay {
            file,
            vme_config,
            words,
            event,
            module,
        } => replay(&file, &vme_config, &words, event, module, settings),
    }
}

fn init_logging(settings: &AnalysisSettings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

    let (file_layer, guard) = match &settings.log_directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vme-analysis.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_vme(path: Option<&Path>) -> anyhow::Result<Option<VmeConfig>> {
    path.map(|p| VmeConfig::load(p).with_context(|| format!("loading VME config {}", p.display())))
        .transpose()
}

fn load(path: &Path, vme: Option<&VmeConfig>) -> anyhow::Result<AnalysisFile> {
    let file = AnalysisFile::load(path, vme.map(|v| v as &dyn VmeConfigLookup))?;
    for diagnostic in &file.report.diagnostics {
        tracing::warn!("{}", diagnostic);
    }
    Ok(file)
}

fn info(path: &Path, vme_path: Option<&Path>, settings: AnalysisSettings) -> anyhow::Result<()> {
    let vme = load_vme(vme_path)?;
    let mut file = load(path, vme.as_ref())?;
    file.analysis.set_settings(settings);
    let analysis = &mut file.analysis;

    println!("{}", path.display());
    println!(
        "  format version: {}{}",
        file.report.original_version,
        if file.report.was_migrated() { " (migrated)" } else { "" }
    );

    let (mut sources, mut operators, mut conditions, mut sinks) = (0, 0, 0, 0);
    for (_, node) in analysis.nodes() {
        match node.kind {
            NodeKind::Source(_) => sources += 1,
            NodeKind::Operator(_) => operators += 1,
            NodeKind::Condition(_) => conditions += 1,
            NodeKind::Sink(_) => sinks += 1,
        }
    }
    println!(
        "  objects: {} sources, {} operators, {} conditions, {} sinks",
        sources, operators, conditions, sinks
    );
    println!(
        "  pipes: {}, condition links: {}, directories: {}",
        analysis.pipe_count(),
        analysis.condition_links().count(),
        analysis.directories().len()
    );

    if let Err(e) = analysis.update_ranks() {
        println!("  ranks: {}", e);
    }
    let missing = analysis.missing_required_inputs();
    if !missing.is_empty() {
        println!("  {} required inputs unconnected", missing.len());
    }
    if !file.report.is_clean() {
        println!("  {} load diagnostics", file.report.diagnostics.len());
    }
    Ok(())
}

fn upgrade(path: &Path, output: &Path, vme_path: Option<&Path>) -> anyhow::Result<()> {
    let vme = load_vme(vme_path)?;
    let file = load(path, vme.as_ref())?;
    if !file.report.is_clean() {
        tracing::warn!(
            "{} objects could not be loaded and are not written",
            file.report.diagnostics.len()
        );
    }
    file.save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{}: version {} -> {}",
        output.display(),
        file.report.original_version,
        vme_analysis::serialize::CURRENT_VERSION
    );
    Ok(())
}

fn parse_words(line: &str) -> anyhow::Result<Vec<u32>> {
    line.split_whitespace()
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u32::from_str_radix(digits, 16).with_context(|| format!("invalid word '{token}'"))
        })
        .collect()
}

fn replay(
    path: &Path,
    vme_path: &Path,
    words_path: &Path,
    event: usize,
    module: usize,
    settings: AnalysisSettings,
) -> anyhow::Result<()> {
    let vme = load_vme(Some(vme_path))?.context("a VME config is required for replay")?;
    if vme.module_id(event, module).is_none() {
        bail!("VME config has no module {} in event {}", module, event);
    }

    let mode = settings.begin_run_mode;
    let mut file = load(path, Some(&vme))?;
    let analysis = &mut file.analysis;
    analysis.set_settings(settings);

    let content = std::fs::read_to_string(words_path)
        .with_context(|| format!("reading {}", words_path.display()))?;

    let run_id = words_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string());
    analysis.begin_run(RunInfo::new(run_id, true), &vme, mode)?;

    let mut events = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let words = parse_words(line).with_context(|| format!("line {}", line_no + 1))?;
        analysis.begin_event(event)?;
        analysis.process_module_data(event, module, &words)?;
        analysis.end_event(event)?;
        events += 1;
    }
    analysis.end_run()?;

    println!("{} events replayed", events);
    print_sink_summary(analysis);
    Ok(())
}

fn print_sink_summary(analysis: &Analysis) {
    for (_, node) in analysis.nodes() {
        let Some(sink) = node.kind.as_sink() else {
            continue;
        };
        if let Some(h1) = sink.as_histo1d() {
            let (entries, underflow, overflow) = (0..h1.histo_count())
                .filter_map(|i| h1.histo(i))
                .fold((0, 0, 0), |(e, u, o), h| {
                    (e + h.stats.entry_count, u + h.stats.underflow, o + h.stats.overflow)
                });
            println!(
                "  {:<32} {} histograms, {} entries, {} underflow, {} overflow",
                node.name(),
                h1.histo_count(),
                entries,
                underflow,
                overflow
            );
        } else if let Some(h2) = sink.as_histo2d() {
            let entries = h2.histo().map_or(0, |h| h.stats.entry_count);
            println!("  {:<32} 2D, {} entries", node.name(), entries);
        } else if let Some(rate) = sink.as_rate_monitor() {
            println!(
                "  {:<32} {} rate histories",
                node.name(),
                rate.histories().len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words() {
        assert_eq!(
            parse_words("0x0001 ff  0XA0").unwrap(),
            vec![0x0001, 0xff, 0xa0]
        );
        assert!(parse_words("zz").is_err());
        assert!(parse_words("").unwrap().is_empty());
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "vme-analysis",
            "replay",
            "run.analysis",
            "--vme-config",
            "setup.json",
            "--words",
            "words.txt",
            "--module",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::Replay { module, event, .. } => {
                assert_eq!(module, 2);
                assert_eq!(event, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
