//! Tabula - a spreadsheet computation kernel on the command line.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use tabula_core::{Command, Model, ModelConfig, Placement, SheetId, Value};
use tracing_subscriber::EnvFilter;

const MAX_COMMANDS_FILE_BYTES: u64 = 16 * 1_048_576; // 16 MiB

fn print_usage() {
    eprintln!("Usage: tabula [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Workbook to open (.json)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <FILE>           Model configuration (TOML)");
    eprintln!("  --no-config               Ignore the user's config.toml");
    eprintln!("  --commands <FILE>         Apply a JSON array of commands");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula and print its value");
    eprintln!("  -o, --output <FILE>       Export the workbook as JSON");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Logging is controlled by TABULA_LOG (or RUST_LOG).");
}

struct Args {
    file: Option<PathBuf>,
    config: Option<PathBuf>,
    no_config: bool,
    commands: Option<PathBuf>,
    formula: Option<String>,
    output: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut parsed = Args {
        file: None,
        config: None,
        no_config: false,
        commands: None,
        formula: None,
        output: None,
    };

    let value = |i: usize, flag: &str| -> String {
        match args.get(i) {
            Some(v) => v.clone(),
            None => {
                eprintln!("Error: {flag} requires a value");
                std::process::exit(1);
            }
        }
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return None;
            }
            "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(value(i, "--config")));
            }
            "--no-config" => parsed.no_config = true,
            "--commands" => {
                i += 1;
                parsed.commands = Some(PathBuf::from(value(i, "--commands")));
            }
            "-c" | "--command" => {
                i += 1;
                parsed.formula = Some(value(i, "--command"));
            }
            "-o" | "--output" => {
                i += 1;
                parsed.output = Some(PathBuf::from(value(i, "--output")));
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                print_usage();
                std::process::exit(1);
            }
            _ => {
                if parsed.file.is_none() {
                    parsed.file = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: Unexpected argument: {}", args[i]);
                    print_usage();
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }
    Some(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TABULA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `--config`, else `config.toml` in the user's config dir, else defaults.
fn load_config(path: Option<&Path>) -> Result<ModelConfig> {
    if let Some(path) = path {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        return ModelConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    let Some(proj) = ProjectDirs::from("", "", "tabula") else {
        return Ok(ModelConfig::default());
    };
    let path = proj.config_dir().join("config.toml");
    ModelConfig::load(&path).with_context(|| format!("failed to load config {}", path.display()))
}

fn read_commands(path: &Path) -> Result<Vec<Command>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if meta.len() > MAX_COMMANDS_FILE_BYTES {
        bail!(
            "Refusing to read {}: commands file too large ({} bytes, max {})",
            path.display(),
            meta.len(),
            MAX_COMMANDS_FILE_BYTES
        );
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).with_context(|| format!("invalid commands in {}", path.display()))
}

/// Land every outstanding async result.
fn settle(model: &mut Model) {
    while model.getters().pending_async() > 0 {
        if model.wait_for_async() == 0 {
            break;
        }
    }
}

fn active_sheet(model: &Model) -> Result<SheetId> {
    match model.getters().active_sheet() {
        Some(sheet) => Ok(sheet.clone()),
        None => bail!("workbook has no active sheet"),
    }
}

/// Evaluate `formula` in a scratch column appended to the active sheet.
fn evaluate_formula(model: &mut Model, formula: &str) -> Result<Value> {
    let sheet = active_sheet(model)?;
    let (cols, _) = model.getters().dimensions(&sheet);
    if let Err(reason) = model.dispatch(Command::AddColumns {
        sheet_id: sheet.clone(),
        column: cols - 1,
        position: Placement::After,
        quantity: 1,
    }) {
        bail!("cannot evaluate formula: {reason}");
    }
    let formula = if formula.trim_start().starts_with('=') {
        formula.to_string()
    } else {
        format!("={}", formula)
    };
    if let Err(reason) = model.dispatch(Command::update_cell(&sheet, cols, 0, &formula)) {
        bail!("cannot evaluate formula: {reason}");
    }
    settle(model);
    Ok(model.getters().value(&sheet, cols, 0))
}

/// Tab-separated values of the used part of the active sheet.
fn render_active_sheet(model: &Model) -> Result<String> {
    let sheet_id = active_sheet(model)?;
    let getters = model.getters();
    let Some(sheet) = getters.sheet(&sheet_id) else {
        bail!("active sheet {sheet_id} is missing");
    };
    let Some(right) = sheet.cells.keys().map(|p| p.col).max() else {
        return Ok(String::new());
    };
    let bottom = sheet.cells.keys().map(|p| p.row).max().unwrap_or(0);

    let mut out = String::new();
    for row in 0..=bottom {
        let line: Vec<String> = (0..=right)
            .map(|col| getters.formatted(&sheet_id, col, row))
            .collect();
        out.push_str(line.join("\t").trim_end_matches('\t'));
        out.push('\n');
    }
    Ok(out)
}

fn run(args: Args) -> Result<i32> {
    let config = if args.no_config && args.config.is_none() {
        ModelConfig::default()
    } else {
        load_config(args.config.as_deref())?
    };
    let mut model = match &args.file {
        Some(path) => Model::load(path, config)
            .with_context(|| format!("failed to open {}", path.display()))?,
        None => Model::with_config(config),
    };

    if let Some(path) = &args.commands {
        let commands = read_commands(path)?;
        let total = commands.len();
        let mut refused = 0;
        for command in commands {
            if let Err(reason) = model.dispatch(command) {
                eprintln!("Warning: command refused: {reason}");
                refused += 1;
            }
        }
        tracing::info!(total, refused, "applied commands");
    }
    settle(&mut model);

    if let Some(path) = &args.output {
        model
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Exported to {}", path.display());
    }

    if let Some(formula) = &args.formula {
        let value = evaluate_formula(&mut model, formula)?;
        println!("{}", value.format());
        return Ok(if matches!(value, Value::Error(_)) { 1 } else { 0 });
    }

    if args.output.is_none() {
        print!("{}", render_active_sheet(&model)?);
    }
    Ok(0)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(args) = parse_args(&args) else {
        return;
    };
    init_logging();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
