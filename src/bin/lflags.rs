// src/bin/lflags.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use layered_flags::{
    ConfigMap, FlagsError, FlagsOptions, Overrides,
    cli::{Cli, OutputFormat, parse_override},
    core::declarations,
    state,
};

/// Entry point of `lflags`: sets up logging, resolves, and reports errors centrally.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        // Usage errors and `--help` of the declared parameters are rendered by clap.
        if let Some(FlagsError::Parse(clap_error)) = e.downcast_ref::<FlagsError>() {
            clap_error.exit();
        }
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let specs = declarations::load_declarations(&cli.params).with_context(|| {
        format!(
            "Failed to load declarations from '{}'",
            cli.params.display()
        )
    })?;

    let program_name = cli
        .params
        .file_stem()
        .map_or_else(|| "lflags".to_string(), |s| s.to_string_lossy().into_owned());
    let mut options = FlagsOptions::default().with_program_name(program_name);
    if !cli.markers.is_empty() {
        options = options.with_markers(cli.markers.iter().copied());
    }

    let shared = state::get_or_create(options);
    let mut flags = state::lock(&shared);
    for spec in specs {
        flags.declare(spec);
    }

    if cli.show_help {
        print!("{}", flags.render_help());
        return Ok(());
    }

    let overrides = if cli.overrides.is_empty() {
        None
    } else {
        let layer = cli
            .overrides
            .iter()
            .map(|pair| parse_override(pair))
            .collect::<Result<ConfigMap>>()?;
        Some(Overrides::Mapping(layer))
    };

    let resolved = flags.resolve(Some(cli.tokens), overrides)?;
    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&resolved.to_json())?);
        }
        OutputFormat::Lines => {
            for (name, value) in resolved.iter() {
                println!("{}={}", name, value);
            }
        }
    }
    Ok(())
}
