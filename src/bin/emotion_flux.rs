//! Emotion Flux CLI - Command-line interface for the emotion engine
//!
//! Commands:
//! - replay: Feed recorded feature records through an engine and print decisions
//! - validate: Check that a record stream parses
//! - doctor: Diagnose configuration and baseline health
//! - schema: Describe input and output records

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emotion_flux::{
    BaselineStore, Channel, ChannelRecord, EmotionEngine, EngineConfig, EngineError,
    FinalDecision, GatePolicy, JsonFileBaselineStore, ENGINE_VERSION, PRODUCER_NAME,
};

/// Emotion Flux - On-device fusion and stabilization engine for emotion signals
#[derive(Parser)]
#[command(name = "emotion-flux")]
#[command(author = "Synheart AI Inc")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Fuse behavior and webcam signals into stable emotion decisions", long_about = None)]
struct Cli {
    /// Log pipeline stages to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded feature records through an engine
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Gate policy (overrides the configuration file)
        #[arg(long)]
        policy: Option<PolicyArg>,

        /// Load a persisted baseline before replaying
        #[arg(long)]
        load_baseline: Option<PathBuf>,

        /// Save the calibrated baseline after replaying
        #[arg(long)]
        save_baseline: Option<PathBuf>,

        /// Emit one step per record, including suppressed ones
        #[arg(long)]
        all: bool,
    },

    /// Check that a record stream parses
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and baseline health
    Doctor {
        /// Check an engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a baseline file
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one decision per line)
    Ndjson,
    /// JSON array of decisions
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Confidence >= 0.5, 2 s cooldown, decisions during calibration
    Responsive,
    /// Three in a row, confidence >= 0.7, 5 s cooldown, silent calibration
    Conservative,
}

impl From<PolicyArg> for GatePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Responsive => GatePolicy::Responsive,
            PolicyArg::Conservative => GatePolicy::Conservative,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input records (tagged by channel)
    Input,
    /// Emitted decisions
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Install a stderr subscriber so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            policy,
            load_baseline,
            save_baseline,
            all,
        } => {
            let options = ReplayOptions {
                config: config.as_deref(),
                policy: policy.map(GatePolicy::from),
                load_baseline: load_baseline.as_deref(),
                save_baseline: save_baseline.as_deref(),
                all,
            };
            cmd_replay(&input, &output, input_format, output_format, &options)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            config,
            baseline,
            json,
        } => cmd_doctor(config.as_deref(), baseline.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

struct ReplayOptions<'a> {
    config: Option<&'a Path>,
    policy: Option<GatePolicy>,
    load_baseline: Option<&'a Path>,
    save_baseline: Option<&'a Path>,
    all: bool,
}

/// One replayed record and what the engine made of it
#[derive(Serialize)]
struct ReplayStep {
    index: usize,
    channel: Channel,
    decision: Option<FinalDecision>,
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    options: &ReplayOptions<'_>,
) -> Result<(), FluxCliError> {
    let input_data = read_input(input)?;
    let records = parse_records(&input_data, &input_format)?;
    if records.is_empty() {
        return Err(FluxCliError::NoRecords);
    }

    let config = load_config(options.config, options.policy)?;
    let mut engine = EmotionEngine::new(config);
    info!(session = %engine.session_id(), records = records.len(), "replay started");

    if let Some(baseline_path) = options.load_baseline {
        let store = JsonFileBaselineStore::new(baseline_path);
        match store.load()? {
            Some(baseline) => {
                if !engine.install_baseline(baseline) {
                    return Err(FluxCliError::Engine(EngineError::InvalidBaseline(
                        baseline_path.display().to_string(),
                    )));
                }
            }
            None => warn!(path = %baseline_path.display(), "baseline file not found, calibrating"),
        }
    }

    let mut steps: Vec<ReplayStep> = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let channel = record.channel();
        let decision = engine.process_record(record);
        if options.all || decision.is_some() {
            steps.push(ReplayStep {
                index,
                channel,
                decision,
            });
        }
    }

    if let Some(baseline_path) = options.save_baseline {
        match engine.baseline() {
            Some(baseline) => JsonFileBaselineStore::new(baseline_path).persist(baseline)?,
            None => warn!("calibration did not complete, no baseline saved"),
        }
    }

    let output_data = if options.all {
        format_output(&steps, &output_format)?
    } else {
        let decisions: Vec<FinalDecision> = steps.into_iter().filter_map(|s| s.decision).collect();
        format_output(&decisions, &output_format)?
    };

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", output_data)?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), FluxCliError> {
    let input_data = read_input(input)?;

    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    let mut total_records = 0;
    match input_format {
        InputFormat::Ndjson => {
            for (index, line) in non_empty_lines(&input_data) {
                total_records += 1;
                if let Err(e) = ChannelRecord::from_json(line) {
                    errors.push(ValidationErrorDetail {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
        InputFormat::Json => {
            let values: Vec<serde_json::Value> = serde_json::from_str(&input_data)?;
            total_records = values.len();
            for (index, value) in values.into_iter().enumerate() {
                if let Err(e) = serde_json::from_value::<ChannelRecord>(value) {
                    errors.push(ValidationErrorDetail {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let report = ValidationReport {
        total_records,
        valid_records: total_records - errors.len(),
        invalid_records: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(FluxCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, baseline: Option<&Path>, json: bool) -> Result<(), FluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Emotion Flux version {}", ENGINE_VERSION),
    });

    let config_check = match load_config(config, None) {
        Ok(config) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Gate policy {}, smoothing window {}, emit during calibration: {}",
                config.gate_policy.as_str(),
                config.smoothing_window,
                config.emit_during_calibration
            ),
        },
        Err(e) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: CliError::from(e).message,
        },
    };
    checks.push(config_check);

    if let Some(baseline_path) = baseline {
        let check = match JsonFileBaselineStore::new(baseline_path).load() {
            Ok(Some(b)) => DoctorCheck {
                name: "baseline".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Baseline valid (velocity {:.3}, acceleration {:.3}, hover {:.0} ms)",
                    b.normal_velocity, b.normal_acceleration, b.normal_hover_time
                ),
            },
            Ok(None) => DoctorCheck {
                name: "baseline".to_string(),
                status: CheckStatus::Warning,
                message: "Baseline file does not exist, engine will calibrate".to_string(),
            },
            Err(e) => DoctorCheck {
                name: "baseline".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        };
        checks.push(check);
    }

    // stdin is where replay reads by default
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Emotion Flux Doctor Report");
        println!("==========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), FluxCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input records are JSON objects tagged by \"channel\":");
                println!();
                println!("1. behavior - interaction features flushed by the tracker");
                println!("   - avgScrollSpeed, avgVelocity, avgAcceleration, hoverTime");
                println!("   - clickRate, idleTime, cartFluctuation, tabSwitches");
                println!("   - directionVariance (0-1), motionBurstFrequency (bursts/s)");
                println!();
                println!("2. webcam - facial heuristics with an upstream emotion hint");
                println!("   - emotion, confidence (admitted at >= 0.75)");
                println!("   - blinkRate, headMovement, browTension (0-1)");
                println!();
                println!("3. facial - loosely-typed analyzer output, converted to webcam");
                println!("   - motionIntensity stands in for headMovement");
                println!("   - eyebrowRaise stands in for browTension");
                println!("   - confidence defaults to 0.6");
                println!();
                println!("All records accept an optional timestamp in epoch milliseconds.");
                println!("snake_case field names are accepted as well.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Each emitted decision contains:");
                println!();
                println!("- emotion: calm, frustrated, impulsive, engaged, neutral, or a webcam hint label");
                println!("- confidence: smoothed confidence (0-1)");
                println!("- source: behavior | hybrid");
                println!();
                println!("With --all, each record yields {{ index, channel, decision }}");
                println!("where decision is null when the engine held it back.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, FluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn non_empty_lines(data: &str) -> impl Iterator<Item = (usize, &str)> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
}

fn parse_records(data: &str, format: &InputFormat) -> Result<Vec<ChannelRecord>, FluxCliError> {
    match format {
        InputFormat::Ndjson => non_empty_lines(data)
            .map(|(index, line)| {
                ChannelRecord::from_json(line)
                    .map_err(|e| FluxCliError::ParseError(format!("record {}: {}", index, e)))
            })
            .collect(),
        InputFormat::Json => Ok(serde_json::from_str(data)?),
    }
}

/// Config file (or defaults), then environment, then the explicit policy flag
fn load_config(path: Option<&Path>, policy: Option<GatePolicy>) -> Result<EngineConfig, FluxCliError> {
    let base = match path {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    let mut config = base.with_env_overrides()?;

    if let Some(policy) = policy {
        let preset = match policy {
            GatePolicy::Responsive => EngineConfig::responsive(),
            GatePolicy::Conservative => EngineConfig::conservative(),
        };
        config.gate_policy = preset.gate_policy;
        config.emit_during_calibration = preset.emit_during_calibration;
    }
    Ok(config)
}

fn format_output<T: Serialize>(items: &[T], format: &OutputFormat) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            if lines.is_empty() {
                Ok(String::new())
            } else {
                Ok(lines.join("\n") + "\n")
            }
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)?),
    }
}

fn get_input_json_schema() -> String {
    let number = serde_json::json!({ "type": "number" });
    let timestamp = serde_json::json!({ "type": "integer", "description": "epoch milliseconds" });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "emotion_flux.channel_record",
        "description": "Feature record tagged by channel",
        "type": "object",
        "required": ["channel"],
        "properties": {
            "channel": { "type": "string", "enum": ["behavior", "webcam", "facial"] },
            "timestamp": timestamp
        },
        "oneOf": [
            {
                "properties": {
                    "channel": { "const": "behavior" },
                    "avgScrollSpeed": number,
                    "avgVelocity": number,
                    "avgAcceleration": number,
                    "hoverTime": number,
                    "clickRate": number,
                    "idleTime": number,
                    "cartFluctuation": { "type": "integer", "minimum": 0 },
                    "tabSwitches": { "type": "integer", "minimum": 0 },
                    "directionVariance": { "type": "number", "minimum": 0, "maximum": 1 },
                    "motionBurstFrequency": { "type": "number", "minimum": 0 }
                }
            },
            {
                "required": ["confidence"],
                "properties": {
                    "channel": { "const": "webcam" },
                    "emotion": { "type": "string" },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                    "blinkRate": number,
                    "headMovement": number,
                    "browTension": number
                }
            },
            {
                "properties": {
                    "channel": { "const": "facial" },
                    "emotion": { "type": "string" },
                    "confidence": number,
                    "blinkRate": number,
                    "headMovement": number,
                    "motionIntensity": number,
                    "browTension": number,
                    "eyebrowRaise": number
                }
            }
        ]
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "emotion_flux.decision",
        "description": "Decision surfaced by the stability gate",
        "type": "object",
        "required": ["emotion", "confidence", "source"],
        "properties": {
            "emotion": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "source": { "type": "string", "enum": ["behavior", "hybrid"] }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<EngineError> for FluxCliError {
    fn from(e: EngineError) -> Self {
        FluxCliError::Engine(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Engine(EngineError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'emotion-flux doctor --config <file>' for details".to_string()),
            },
            FluxCliError::Engine(e @ (EngineError::InvalidBaseline(_) | EngineError::BaselineLoad(_))) => CliError {
                code: "BASELINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Delete the baseline file to recalibrate".to_string()),
            },
            FluxCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            FluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            FluxCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'emotion-flux validate' for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
