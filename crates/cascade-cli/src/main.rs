//! CLI for cascade — run a cellular-automaton transform over a binary file
//! and score the result with the NIST SP 800-22 battery.
//!
//! Exit codes: 0 every test passed, 1 one or more tests failed, 2 bad input
//! or configuration, 3 internal failure.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cascade_core::{
    BitField, CaConfig, CaNeighborhood, CaProcessor, CaRule, CancelToken, ConfigError,
    ConsoleSink, NullSink, ProgressSink, VectorTier,
};
use cascade_nist::{TestRegistry, TestRunner};

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "cascade — find structure that survives encryption")]
#[command(version = cascade_core::VERSION)]
struct Cli {
    /// Path to the binary file to analyze
    input_file: PathBuf,

    /// CA rule: 30, 82, 110, 150, or custom:<code> (1-D only)
    #[arg(long, default_value = "30")]
    rule: String,

    /// CA neighborhood
    #[arg(long, default_value = "1d", value_parser = ["1d", "von-neumann", "moore"])]
    neighborhood: String,

    /// Number of CA iterations before testing
    #[arg(long, default_value_t = 1)]
    iterations: u32,

    /// Grid width for 2-D neighborhoods (0 = auto square)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Worker threads (0 = hardware parallelism)
    #[arg(long, default_value_t = 0)]
    threads: u32,

    /// Significance level applied to every test
    #[arg(long, default_value_t = 0.01)]
    alpha: f64,

    /// Comma-separated test names from the registry, or "all"
    #[arg(long, default_value = "all")]
    tests: String,

    /// Write a machine-readable report (one JSON record per line)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Vector tier: auto, scalar, sse2, avx, avx2, avx512f, avx512vnni, neon
    #[arg(long, default_value = "auto")]
    tier: String,

    /// Suppress the progress display
    #[arg(long)]
    no_progress: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    ExitCode::from(run(&cli))
}

fn run(cli: &Cli) -> u8 {
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return 2;
        }
    };

    let bytes = match std::fs::read(&cli.input_file) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("cannot read {}: {err}", cli.input_file.display());
            return 2;
        }
    };
    if bytes.is_empty() {
        eprintln!("configuration error: {}", ConfigError::EmptyInput);
        return 2;
    }

    let registry = TestRegistry::canonical();
    let selection = match registry.build_selection(&cli.tests) {
        Ok(selection) => selection,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return 2;
        }
    };
    let runner = match TestRunner::new(cli.alpha) {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return 2;
        }
    };

    let field = BitField::from_bytes(&bytes);
    eprintln!(
        "cascade: {} ({} bytes, {} bits), {}, {} neighborhood, {} iterations",
        cli.input_file.display(),
        bytes.len(),
        field.len(),
        config.rule,
        config.neighborhood,
        cli.iterations,
    );

    let sink: Box<dyn ProgressSink> = if cli.no_progress {
        Box::new(NullSink)
    } else {
        Box::new(ConsoleSink::new())
    };
    let cancel = CancelToken::new();

    let processor = CaProcessor::new(field, config);
    eprintln!("cascade: vector tier {}", processor.tier());
    let processed = match processor.process(cli.iterations, &cancel, sink.as_ref()) {
        Ok(field) => field,
        Err(err) => {
            eprintln!("cellular automata failed: {err}");
            return 3;
        }
    };

    let results = match runner.run(&processed, &selection, &cancel, sink.as_ref()) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("test suite failed: {err}");
            return 3;
        }
    };

    for result in &results {
        println!("{}", report::format_line(result));
    }

    if let Some(path) = &cli.report {
        if let Err(err) = report::write_json_lines(path, &results) {
            eprintln!("cannot write report {}: {err}", path.display());
            return 3;
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    eprintln!(
        "cascade: {}/{} results passed at alpha={}",
        results.len() - failed,
        results.len(),
        runner.alpha(),
    );
    if failed > 0 { 1 } else { 0 }
}

/// Translate the flag surface into a processor configuration.
fn build_config(cli: &Cli) -> Result<CaConfig, ConfigError> {
    let rule = parse_rule(&cli.rule)?;
    let neighborhood = parse_neighborhood(&cli.neighborhood)?;
    if rule.code().is_none() && neighborhood != CaNeighborhood::OneDimensional {
        return Err(ConfigError::Invalid(
            "custom rule codes are defined for the 1d neighborhood only".to_string(),
        ));
    }
    Ok(CaConfig {
        rule,
        neighborhood,
        width: cli.width as usize,
        threads: cli.threads as usize,
        tier: parse_tier(&cli.tier)?,
    })
}

fn parse_rule(text: &str) -> Result<CaRule, ConfigError> {
    match text {
        "30" => Ok(CaRule::Rule30),
        "82" => Ok(CaRule::Rule82),
        "110" => Ok(CaRule::Rule110),
        "150" => Ok(CaRule::Rule150),
        _ => {
            if let Some(code) = text.strip_prefix("custom:") {
                let code: u8 = code
                    .parse()
                    .map_err(|_| ConfigError::UnknownRule(text.to_string()))?;
                return Ok(CaRule::from_code(code));
            }
            Err(ConfigError::UnknownRule(text.to_string()))
        }
    }
}

fn parse_neighborhood(text: &str) -> Result<CaNeighborhood, ConfigError> {
    match text {
        "1d" => Ok(CaNeighborhood::OneDimensional),
        "von-neumann" => Ok(CaNeighborhood::VonNeumann),
        "moore" => Ok(CaNeighborhood::Moore),
        _ => Err(ConfigError::UnknownNeighborhood(text.to_string())),
    }
}

fn parse_tier(text: &str) -> Result<VectorTier, ConfigError> {
    match text {
        "auto" => Ok(detect_tier()),
        "scalar" => Ok(VectorTier::Scalar),
        "sse2" => Ok(VectorTier::Sse2),
        "avx" => Ok(VectorTier::Avx),
        "avx2" => Ok(VectorTier::Avx2),
        "avx512f" => Ok(VectorTier::Avx512f),
        "avx512vnni" => Ok(VectorTier::Avx512Vnni),
        "neon" => Ok(VectorTier::Neon),
        _ => Err(ConfigError::Invalid(format!("unknown vector tier: {text}"))),
    }
}

/// Best vector tier for the running CPU. Detection lives here, on the front
/// end; the engine only ever consumes the token.
fn detect_tier() -> VectorTier {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vnni") {
            return VectorTier::Avx512Vnni;
        }
        if is_x86_feature_detected!("avx512f") {
            return VectorTier::Avx512f;
        }
        if is_x86_feature_detected!("avx2") {
            return VectorTier::Avx2;
        }
        if is_x86_feature_detected!("avx") {
            return VectorTier::Avx;
        }
        return VectorTier::Sse2;
    }
    #[cfg(target_arch = "aarch64")]
    {
        return VectorTier::Neon;
    }
    #[allow(unreachable_code)]
    VectorTier::Scalar
}
