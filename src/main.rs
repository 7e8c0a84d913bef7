use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use sqlscope::ast::{ParserDialect, SqlParser, Statement, StatementParser};
use sqlscope::collect::{
    CteCollector, ParameterCollector, SchemaCollector, TableReference, TableSchema,
    TableSourceCollector,
};
use sqlscope::config::EngineConfig;
use sqlscope::format::{DialectPreset, FormattedSql, SqlFormatter};
use sqlscope::transform::{ConditionMap, FixtureFile, JsonMapping, SqlParamInjector};

/// Scope-aware SQL analysis and rewriting
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Grammar used to read the input
    #[arg(long, global = true, default_value = "postgres")]
    dialect: ParserDialect,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-render SQL under a dialect preset
    Format {
        /// SQL file, or `-` for stdin
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Report tables, CTEs, columns and parameters
    Analyze {
        input: PathBuf,
        /// JSON object mapping table names to column lists, for wildcards
        #[arg(long)]
        columns: Option<PathBuf>,
    },
    /// Prepend fixture tables as CTEs
    InjectFixtures {
        input: PathBuf,
        /// JSON fixture file; omit for all-NULL scaffolding
        #[arg(long)]
        fixtures: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Append parameterized WHERE conditions
    InjectParams {
        input: PathBuf,
        /// JSON condition map, inline or `@file`
        #[arg(long)]
        conditions: String,
        #[arg(long)]
        allow_all_null: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Wrap the query into a nested JSON projection
    Json {
        input: PathBuf,
        /// JSON mapping file
        #[arg(long)]
        mapping: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output preset: named, postgres, mysql, sqlserver, sqlite
    #[arg(long)]
    preset: Option<DialectPreset>,
    /// One clause per line
    #[arg(long)]
    pretty: bool,
    /// Print `{ sql, params }` as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Analysis {
    tables: Vec<TableReference>,
    ctes: Vec<String>,
    columns: Vec<TableSchema>,
    parameters: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("SQLSCOPE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;
    let parser = SqlParser::new(cli.dialect);

    match cli.command {
        Command::Format { input, output } => {
            let statements = parse_input(&parser, &input)?;
            emit(&config, &output, &statements)
        }
        Command::Analyze { input, columns } => {
            let statements = parse_input(&parser, &input)?;
            let resolver: BTreeMap<String, Vec<String>> = match columns {
                Some(path) => serde_json::from_str(&read_input(&path)?)
                    .with_context(|| format!("parsing column map {}", path.display()))?,
                None => BTreeMap::new(),
            };
            let reports = statements
                .iter()
                .map(|stmt| analyze(stmt, &resolver))
                .collect::<Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }
        Command::InjectFixtures {
            input,
            fixtures,
            output,
        } => {
            let injector = config.fixture_injector();
            let file: Option<FixtureFile> = match &fixtures {
                Some(path) => Some(
                    serde_json::from_str(&read_input(path)?)
                        .with_context(|| format!("parsing fixtures {}", path.display()))?,
                ),
                None => None,
            };
            let statements = parse_input(&parser, &input)?
                .into_iter()
                .map(|stmt| -> Result<Statement> {
                    let schemas = SchemaCollector::new()
                        .collect(&stmt)
                        .context("collecting table columns")?;
                    Ok(match &file {
                        Some(file) => injector.inject(stmt, &file.clone().into_tables(&schemas))?,
                        None => injector.inject_null_scaffolding(stmt, &schemas)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            emit(&config, &output, &statements)
        }
        Command::InjectParams {
            input,
            conditions,
            allow_all_null,
            output,
        } => {
            let text = match conditions.strip_prefix('@') {
                Some(path) => read_input(Path::new(path))?,
                None => conditions,
            };
            let conditions: ConditionMap =
                serde_json::from_str(&text).context("parsing condition map")?;
            let injector = SqlParamInjector::new().allow_all_null(allow_all_null);
            let statements = parse_input(&parser, &input)?
                .into_iter()
                .map(|stmt| injector.inject(stmt, &conditions))
                .collect::<Result<Vec<_>, _>>()?;
            emit(&config, &output, &statements)
        }
        Command::Json {
            input,
            mapping,
            output,
        } => {
            let mapping: JsonMapping = serde_json::from_str(&read_input(&mapping)?)
                .with_context(|| format!("parsing mapping {}", mapping.display()))?;
            let builder = config.json_builder();
            let statements = parse_input(&parser, &input)?
                .into_iter()
                .map(|stmt| builder.build(stmt, &mapping))
                .collect::<Result<Vec<_>, _>>()?;
            emit(&config, &output, &statements)
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_input(parser: &SqlParser, path: &Path) -> Result<Vec<Statement>> {
    let sql = read_input(path)?;
    let statements = parser.parse_many(&sql)?;
    if statements.is_empty() {
        bail!("{} contains no statements", path.display());
    }
    Ok(statements)
}

fn analyze(stmt: &Statement, resolver: &BTreeMap<String, Vec<String>>) -> Result<Analysis> {
    Ok(Analysis {
        tables: TableSourceCollector::new(false).collect(stmt),
        ctes: CteCollector::names(stmt),
        columns: SchemaCollector::with_resolver(resolver).collect(stmt)?,
        parameters: ParameterCollector::names(stmt),
    })
}

fn emit(config: &EngineConfig, output: &OutputArgs, statements: &[Statement]) -> Result<()> {
    let mut options = config.format_options(output.preset);
    options.pretty |= output.pretty;
    let formatter = SqlFormatter::new(options);
    let rendered = statements
        .iter()
        .map(|stmt| formatter.format(stmt))
        .collect::<Result<Vec<FormattedSql>, _>>()?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }
    for out in rendered {
        println!("{};", out.sql);
        if !out.params.is_empty() {
            eprintln!("-- params: {}", serde_json::to_string(&out.params)?);
        }
    }
    Ok(())
}
