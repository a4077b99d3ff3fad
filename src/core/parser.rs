// src/core/parser.rs

use crate::models::{ConfigMap, FlagValue, ParamKind, ParamSpec};
use clap::builder::{BoolishValueParser, ValueParser};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::HashSet;

// --- COMMAND CONSTRUCTION ---

/// Builds a `clap` command that accepts exactly the declared parameters as `--name`
/// options. The command does not expect a binary name in front of the tokens.
///
/// Conflicting declarations are tolerated rather than rejected: a short flag already
/// taken by an earlier parameter, or a `-` alias that collides with another declared
/// name, is dropped with a warning. Declaring `help` (or `-h`) replaces clap's own
/// help flag.
pub fn build_command(program: &str, specs: &[ParamSpec]) -> Command {
    let names: HashSet<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
    let claims_help = specs
        .iter()
        .any(|spec| spec.name == "help" || spec.short == Some('h'));

    let mut command = Command::new(program.to_string())
        .no_binary_name(true)
        .disable_version_flag(true)
        .disable_help_flag(claims_help);

    let mut used_shorts = HashSet::new();
    for spec in specs {
        let mut arg = build_arg(spec);

        if let Some(short) = spec.short {
            if used_shorts.insert(short) {
                arg = arg.short(short);
            } else {
                log::warn!(
                    "Short flag '-{}' of '{}' is already taken; ignoring it.",
                    short,
                    spec.name
                );
            }
        }

        let dashed = spec.name.replace('_', "-");
        if dashed != spec.name && !names.contains(dashed.as_str()) {
            arg = arg.alias(dashed);
        }

        command = command.arg(arg);
    }
    command
}

fn build_arg(spec: &ParamSpec) -> Arg {
    let mut arg = Arg::new(spec.name.clone()).long(spec.name.clone());
    if let Some(help) = &spec.help {
        arg = arg.help(help.clone());
    }

    let Some(parser) = value_parser(spec.kind) else {
        // Switches take no value.
        return arg.action(ArgAction::SetTrue);
    };

    arg = arg.value_parser(parser);
    if matches!(spec.kind, ParamKind::Int | ParamKind::Float) {
        arg = arg.allow_negative_numbers(true);
    }
    if spec.many {
        arg.action(ArgAction::Append).num_args(1..)
    } else {
        arg.action(ArgAction::Set)
    }
}

fn value_parser(kind: ParamKind) -> Option<ValueParser> {
    match kind {
        ParamKind::Str => Some(ValueParser::string()),
        ParamKind::Int => Some(clap::value_parser!(i64).into()),
        ParamKind::Float => Some(clap::value_parser!(f64).into()),
        ParamKind::Bool => Some(BoolishValueParser::new().into()),
        ParamKind::Switch => None,
    }
}

// --- TOKEN PARSING ---

/// Parses `tokens` against `command` and returns only the values that were given on
/// the command line. Parameters left at clap's defaults are absent from the result, so
/// the caller's default namespace stays authoritative for them.
///
/// # Errors
/// Returns the `clap` error for unknown flags, missing values and unparsable values.
pub fn parse_tokens(
    command: Command,
    specs: &[ParamSpec],
    tokens: &[String],
) -> Result<ConfigMap, clap::Error> {
    let matches = command.try_get_matches_from(tokens.iter())?;

    let mut values = ConfigMap::new();
    for spec in specs {
        if matches.value_source(&spec.name) != Some(ValueSource::CommandLine) {
            continue;
        }
        if let Some(value) = command_line_value(&matches, spec) {
            log::trace!("Command line sets '{}' = {}", spec.name, value);
            values.insert(spec.name.clone(), value);
        }
    }
    Ok(values)
}

fn command_line_value(matches: &ArgMatches, spec: &ParamSpec) -> Option<FlagValue> {
    let id = spec.name.as_str();
    match spec.kind {
        ParamKind::Switch => Some(FlagValue::Bool(matches.get_flag(id))),
        ParamKind::Str => typed_value::<String>(matches, id, spec.many),
        ParamKind::Int => typed_value::<i64>(matches, id, spec.many),
        ParamKind::Float => typed_value::<f64>(matches, id, spec.many),
        ParamKind::Bool => typed_value::<bool>(matches, id, spec.many),
    }
}

fn typed_value<T>(matches: &ArgMatches, id: &str, many: bool) -> Option<FlagValue>
where
    T: Clone + Send + Sync + 'static + Into<FlagValue>,
{
    if many {
        matches
            .get_many::<T>(id)
            .map(|values| FlagValue::List(values.cloned().map(Into::into).collect()))
    } else {
        matches.get_one::<T>(id).cloned().map(Into::into)
    }
}

// MARK: --- UNIT TESTS ---
