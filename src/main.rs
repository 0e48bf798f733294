//! Purpose: `flatbatch` CLI entry point: encode, decode, and probe flat batches.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `to_exit_code`.
//! Invariants: Decoding maps the blob and reads it in place; payload bytes are never copied.
use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use memmap2::Mmap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use flatbatch::core::error::{Error, ErrorKind, to_exit_code};
use flatbatch::core::flat::{FlatBuffer, FlatOptions};
use flatbatch::core::kind::{Kind, Schema};
use flatbatch::core::proxy::TypeDataProxy;
use flatbatch::core::surface::RowData;
use flatbatch::core::type_data::StoreOptions;
use flatbatch::json::{JsonRow, parse_rows, row_to_json};

#[derive(Parser)]
#[command(
    name = "flatbatch",
    version,
    about = "Encode JSON rows into flat batches and probe typed column stores",
    long_about = None,
    after_help = r#"EXAMPLES
  $ flatbatch encode --schema schema.json --input rows.ndjson --output batch.bin
  $ flatbatch decode --schema schema.json batch.bin --row 0
  $ flatbatch probe --schema schema.json --input rows.ndjson --column id --value 42

SCHEMA
  {"columns": [{"name": "id", "type": "int", "nullable": false},
               {"name": "tags", "type": {"list": "string"}}]}"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Encode newline-delimited JSON rows into a serialized batch")]
    Encode {
        #[arg(long, help = "Schema JSON file", value_hint = ValueHint::FilePath)]
        schema: PathBuf,
        #[arg(long, help = "Rows as newline-delimited JSON objects", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long, help = "Destination for the serialized batch", value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[arg(long, help = "Optional options JSON file", value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },
    #[command(about = "Print rows of a serialized batch as JSON lines")]
    Decode {
        #[arg(long, help = "Schema JSON file the batch was encoded with", value_hint = ValueHint::FilePath)]
        schema: PathBuf,
        #[arg(help = "Serialized batch file", value_hint = ValueHint::FilePath)]
        blob: PathBuf,
        #[arg(long, help = "Print only this row")]
        row: Option<usize>,
    },
    #[command(about = "Fill one column's typed store and test a value against it")]
    Probe {
        #[arg(long, help = "Schema JSON file", value_hint = ValueHint::FilePath)]
        schema: PathBuf,
        #[arg(long, help = "Rows as newline-delimited JSON objects", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long, help = "Column to store")]
        column: String,
        #[arg(long, help = "Value to test, written as a literal of the column kind")]
        value: String,
        #[arg(long, help = "Optional options JSON file", value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    flat: FlatOptions,
    store: StoreOptions,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = match err.kind() {
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 2,
                    _ => 0,
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `flatbatch --help` for usage."));
            }
        },
    };

    let outcome = match cli.command {
        Command::Encode {
            schema,
            input,
            output,
            config,
        } => encode(&schema, &input, &output, config.as_deref()),
        Command::Decode { schema, blob, row } => decode(&schema, &blob, row),
        Command::Probe {
            schema,
            input,
            column,
            value,
            config,
        } => probe(&schema, &input, &column, &value, config.as_deref()),
    };
    outcome.map(|_| 0)
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .next()
        .unwrap_or("invalid arguments")
        .trim_start_matches("error: ")
        .to_string()
}

fn read_text(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read file")
            .with_path(path)
            .with_source(err)
    })
}

fn load_schema(path: &Path) -> Result<Arc<Schema>, Error> {
    let text = read_text(path)?;
    Schema::from_json(&text)
        .map(Arc::new)
        .map_err(|err| err.with_path(path))
}

fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = read_text(path)?;
    let config: Config = serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid options file")
            .with_path(path)
            .with_source(err)
    })?;
    config.store.validate().map_err(|err| err.with_path(path))?;
    Ok(config)
}

fn encode(schema: &Path, input: &Path, output: &Path, config: Option<&Path>) -> Result<(), Error> {
    let schema = load_schema(schema)?;
    let config = load_config(config)?;
    let rows = parse_rows(&read_text(input)?).map_err(|err| err.with_path(input))?;

    let mut flat = FlatBuffer::with_options(Arc::clone(&schema), config.flat)?;
    for (line, value) in rows.iter().enumerate() {
        let row = JsonRow::new(&schema, value).map_err(|err| err.with_row(line))?;
        flat.add(&row).map_err(|err| err.with_path(input))?;
    }
    let bytes = flat.to_bytes()?;
    fs::write(output, &bytes).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write batch")
            .with_path(output)
            .with_source(err)
    })?;
    info!(rows = flat.rows(), bytes = bytes.len(), "encoded batch");
    emit_json(json!({"rows": flat.rows(), "bytes": bytes.len()}));
    Ok(())
}

fn decode(schema: &Path, blob: &Path, row: Option<usize>) -> Result<(), Error> {
    let schema = load_schema(schema)?;
    let file = File::open(blob).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open batch")
            .with_path(blob)
            .with_source(err)
    })?;
    // The map is read-only and lives until every accessor is dropped.
    let map = unsafe {
        Mmap::map(&file).map_err(|err| Error::new(ErrorKind::Io).with_path(blob).with_source(err))?
    };
    let flat = FlatBuffer::from_bytes(Arc::clone(&schema), &map).map_err(|err| err.with_path(blob))?;
    debug!(rows = flat.rows(), "mapped batch");

    match row {
        Some(index) => emit_line(&row_to_json(&flat.crow(index)?, &schema)?)?,
        None => {
            for index in 0..flat.rows() {
                emit_line(&row_to_json(&flat.crow(index)?, &schema)?)?;
            }
        }
    }
    Ok(())
}

fn probe(schema: &Path, input: &Path, column: &str, value: &str, config: Option<&Path>) -> Result<(), Error> {
    let schema = load_schema(schema)?;
    let config = load_config(config)?;
    let rows = parse_rows(&read_text(input)?).map_err(|err| err.with_path(input))?;
    let index = schema.field(column)?;
    let target = &schema.columns()[index];

    let mut store = TypeDataProxy::for_column(target, rows.len(), &config.store)?;
    for (position, value) in rows.iter().enumerate() {
        let row = JsonRow::new(&schema, value).map_err(|err| err.with_row(position))?;
        store_value(&mut store, &row, index, position).map_err(|err| err.with_row(position))?;
    }
    store.seal();

    let probably = probe_value(&store, value)?;
    emit_json(json!({
        "column": column,
        "probably": probably,
        "bloom": store.has_bloom_filter(),
        "rows": rows.len(),
        "histogram": store.histogram(),
    }));
    Ok(())
}

fn store_value(store: &mut TypeDataProxy, row: &dyn RowData, column: usize, position: usize) -> Result<(), Error> {
    if row.is_null(column)? {
        return store.add_void(position);
    }
    let written = match store.kind() {
        Kind::Bool => store.add(position, row.read_bool(column)?),
        Kind::Byte => store.add(position, row.read_byte(column)?),
        Kind::Short => store.add(position, row.read_short(column)?),
        Kind::Int => store.add(position, row.read_int(column)?),
        Kind::Long => store.add(position, row.read_long(column)?),
        Kind::Float => store.add(position, row.read_float(column)?),
        Kind::Double => store.add(position, row.read_double(column)?),
        Kind::Int128 => store.add(position, row.read_int128(column)?),
        Kind::String => store.add_str(position, row.read_string(column)?),
    };
    written.map(|_| ())
}

fn probe_value(store: &TypeDataProxy, literal: &str) -> Result<bool, Error> {
    match store.kind() {
        Kind::Bool => store.probably(parse_literal::<bool>(literal, Kind::Bool)?),
        Kind::Byte => store.probably(parse_literal::<i8>(literal, Kind::Byte)?),
        Kind::Short => store.probably(parse_literal::<i16>(literal, Kind::Short)?),
        Kind::Int => store.probably(parse_literal::<i32>(literal, Kind::Int)?),
        Kind::Long => store.probably(parse_literal::<i64>(literal, Kind::Long)?),
        Kind::Float => store.probably(parse_literal::<f32>(literal, Kind::Float)?),
        Kind::Double => store.probably(parse_literal::<f64>(literal, Kind::Double)?),
        Kind::Int128 => store.probably(parse_literal::<i128>(literal, Kind::Int128)?),
        Kind::String => store.probably_str(literal),
    }
}

fn parse_literal<T: std::str::FromStr>(literal: &str, kind: Kind) -> Result<T, Error> {
    literal.parse::<T>().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("`{literal}` is not a valid {kind} value"))
            .with_hint("Pass --value as a literal of the column's kind.")
    })
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_line(value: &Value) -> Result<(), Error> {
    let line = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    println!("{line}");
    Ok(())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    let fallback = match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::OutOfRange => "index out of range",
        ErrorKind::TypeMismatch => "type mismatch",
        ErrorKind::NullValue => "value is null",
        ErrorKind::Unsupported => "unsupported operation",
        ErrorKind::Alloc => "allocation failed",
        ErrorKind::Corrupt => "corrupt data",
        ErrorKind::Io => "i/o error",
    };
    fallback.to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(row) = err.row() {
        lines.push(format!("row: {row}"));
    }
    if let Some(column) = err.column() {
        lines.push(format!("column: {column}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
