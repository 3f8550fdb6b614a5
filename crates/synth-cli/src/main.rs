//! `window-synth`: generate, inspect and verify synthetic window-detection datasets.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use synth_core::validate::write_previews;
use synth_core::{
    verify_dataset, ClassMap, DatasetGenerator, GenerationConfig, NegativeMode, Partition,
    PartitionSelection,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Synthetic detection-dataset compositor")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite foregrounds onto backgrounds and write images, labels and data.yaml.
    Generate(GenerateArgs),
    /// Print the class map a foreground root would produce.
    Classes {
        /// Foreground root with one folder per class.
        root: PathBuf,
    },
    /// Re-read an emitted dataset and check every image/label pair.
    Verify {
        /// Dataset root (contains images/ and labels/).
        dataset: PathBuf,
    },
    /// Draw labels onto images for a visual spot check.
    Preview {
        dataset: PathBuf,
        #[arg(long, value_enum, default_value_t = PartitionArg::Train)]
        partition: PartitionArg,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Output directory; defaults to <dataset>/previews/<partition>.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    /// JSON config file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backgrounds: Option<PathBuf>,
    /// Foreground root for the train partition (and test, unless --foregrounds-test).
    #[arg(long)]
    foregrounds: Option<PathBuf>,
    #[arg(long)]
    foregrounds_test: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    threads: Option<usize>,
    /// Regenerate only the test partition, reusing classes.json and split.json.
    #[arg(long, default_value_t = false)]
    test_only: bool,
    #[arg(long, value_enum)]
    negative_mode: Option<NegativeModeArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionArg {
    Train,
    Test,
}

impl From<PartitionArg> for Partition {
    fn from(arg: PartitionArg) -> Self {
        match arg {
            PartitionArg::Train => Partition::Train,
            PartitionArg::Test => Partition::Test,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum NegativeModeArg {
    Plain,
    DistractorOnly,
}

impl From<NegativeModeArg> for NegativeMode {
    fn from(arg: NegativeModeArg) -> Self {
        match arg {
            NegativeModeArg::Plain => NegativeMode::Plain,
            NegativeModeArg::DistractorOnly => NegativeMode::DistractorOnly,
        }
    }
}

impl GenerateArgs {
    fn into_config(self) -> Result<GenerationConfig> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => GenerationConfig::default(),
        };
        if let Some(dir) = self.backgrounds {
            config.background_dir = dir;
        }
        if let Some(dir) = self.foregrounds {
            config.foreground_root_train = dir;
        }
        if let Some(dir) = self.foregrounds_test {
            config.foreground_root_test = Some(dir);
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if self.test_only {
            config.partitions = PartitionSelection::TestOnly;
        }
        if let Some(mode) = self.negative_mode {
            config.negatives.mode = mode.into();
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Generate(args) => {
            let config = args.into_config()?;
            log::debug!("Config: {}", serde_json::to_string(&config)?);
            let summary = DatasetGenerator::new(config).run()?;
            println!("{summary}");
            let totals = summary.totals();
            if totals.defects > 0 {
                bail!("{} samples violated the label invariant", totals.defects);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Classes { root } => {
            let classes = ClassMap::build(&root)?;
            for (id, name) in classes.iter() {
                println!("{id}\t{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { dataset } => {
            let report = verify_dataset(&dataset)?;
            println!("{report}");
            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Preview {
            dataset,
            partition,
            limit,
            out,
        } => {
            let partition = Partition::from(partition);
            let out = out.unwrap_or_else(|| dataset.join("previews").join(partition.as_str()));
            let written = write_previews(&dataset, partition, limit, &out)?;
            println!("{written} previews written to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "window-synth",
            "generate",
            "--backgrounds",
            "walls",
            "--seed",
            "42",
            "--test-only",
            "--negative-mode",
            "plain",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.background_dir, PathBuf::from("walls"));
        assert_eq!(config.seed, 42);
        assert_eq!(config.partitions, PartitionSelection::TestOnly);
        assert_eq!(config.negatives.mode, NegativeMode::Plain);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
