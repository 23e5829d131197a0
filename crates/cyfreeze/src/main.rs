use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{error, info};

use cyfreeze::{
    config::Config,
    graph::{self, BuildContext},
    manifest::{MANIFEST_FILE_NAME, Manifest},
    packer,
    tracer::Tracer,
};

#[derive(Parser, Debug)]
#[command(name = "cyfreeze")]
#[command(about = "Freeze Cython-transpiled Python into native libraries and executables", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Project config file, `cyfreeze.toml` in the current directory by default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of all build outputs
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,

    /// Host interpreter
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every node listed in a manifest
    Build {
        /// Build manifest
        #[arg(short, long, default_value = MANIFEST_FILE_NAME)]
        manifest: PathBuf,
        /// Remove generated sources and objects after each node
        #[arg(long)]
        clean: bool,
    },

    /// Remove generated sources and object files left by a previous build
    Clean {
        /// Build manifest
        #[arg(short, long, default_value = MANIFEST_FILE_NAME)]
        manifest: PathBuf,
    },

    /// Print the files a script loads from the host installation
    Trace {
        /// Script run under the host interpreter
        script: PathBuf,
    },

    /// Trace a script and pack its dependencies into a runtime bundle
    Bundle {
        /// Script run under the host interpreter
        script: PathBuf,
        /// Directory receiving the archive and the native modules
        out_dir: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(build_dir) = &cli.build_dir {
        config.build_dir.clone_from(build_dir);
    }
    if let Some(python) = &cli.python {
        config.python.clone_from(python);
    }
    Ok(config)
}

fn build(config: &Config, manifest_path: &Path, clean: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let mut nodes = manifest.nodes()?;
    let host = config.host_layout()?;
    let mut ctx = BuildContext::from_config(config, &host);

    graph::process_all(&mut nodes, &mut ctx, clean || manifest.clean)?;
    info!(
        "Built {} node(s) into {}",
        nodes.len(),
        ctx.dirs.output.display()
    );
    Ok(())
}

fn clean(config: &Config, manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let mut removed = 0;
    for node in manifest.nodes()? {
        for path in node.generated_files() {
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
    }

    let temp = config.build_dirs().temp;
    if temp.is_dir() {
        fs::remove_dir_all(&temp)
            .with_context(|| format!("Failed to remove {}", temp.display()))?;
    }
    info!("Removed {removed} generated source(s) and {}", temp.display());
    Ok(())
}

fn trace(config: &Config, script: &Path) -> Result<()> {
    let host = config.host_layout()?;
    let dependencies = Tracer::new(&host, config.trace_timeout()).trace(script)?;

    let mut stdout = io::stdout().lock();
    for path in &dependencies {
        writeln!(stdout, "{}", path.display())?;
    }
    Ok(())
}

fn bundle(config: &Config, script: &Path, out_dir: &Path) -> Result<()> {
    let host = config.host_layout()?;
    let dependencies = Tracer::new(&host, config.trace_timeout()).trace(script)?;
    let bundle = packer::pack(&dependencies, &host, out_dir)?;
    info!(
        "Bundled {} with {} native module(s)",
        bundle.archive.display(),
        bundle.native.len()
    );
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Build { manifest, clean } => build(&config, manifest, *clean),
        Command::Clean { manifest } => clean(&config, manifest),
        Command::Trace { script } => trace(&config, script),
        Command::Bundle { script, out_dir } => bundle(&config, script, out_dir),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_defaults_to_manifest_in_cwd() {
        let cli = Cli::parse_from(["cyfreeze", "-vv", "build"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Build { ref manifest, clean: false } if manifest == Path::new(MANIFEST_FILE_NAME)
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["cyfreeze", "bundle", "app.py", "dist", "--python", "/opt/py/bin/python3"]);
        assert_eq!(cli.python.as_deref(), Some(Path::new("/opt/py/bin/python3")));
        assert!(matches!(cli.command, Command::Bundle { .. }));
    }
}
