//! `rf_bench` command-line front end.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rf_bench::config::BenchConfig;
use rf_bench::instrument::InstrumentClass;
use rf_bench::procedures::{run_harmonics, run_imd, run_trx_lo, TestReport};
use rf_bench::session::SessionManager;

#[derive(Parser)]
#[command(name = "rf_bench")]
#[command(author, version, about = "RF bench test automation", long_about = None)]
struct Cli {
    /// Configuration file (default: config/rf_bench.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured instruments
    Instruments {
        /// Only show this class
        #[arg(long, value_enum)]
        class: Option<ClassArg>,
    },
    /// Connect to an instrument and print its identity
    Identify {
        name: String,
    },
    /// Harmonics and close-in spurs of a transmitter
    Harmonics {
        /// Spectrum analyzer (default: first configured)
        #[arg(long)]
        sa: Option<String>,
        /// Generate the fundamental with this AWG
        #[arg(long)]
        awg: Option<String>,
        #[arg(long)]
        fundamental_mhz: Option<f64>,
        #[arg(long)]
        highest_harmonic: Option<u32>,
        /// Capture the analyzer screen over the full harmonic span
        #[arg(long)]
        capture: bool,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        test_id: Option<String>,
    },
    /// Two-tone intermodulation distortion
    Imd {
        #[arg(long)]
        sa: Option<String>,
        #[arg(long)]
        awg: Option<String>,
        #[arg(long)]
        f1_mhz: Option<f64>,
        #[arg(long)]
        f2_mhz: Option<f64>,
        #[arg(long)]
        span_khz: Option<f64>,
        #[arg(long)]
        max_order: Option<u32>,
    },
    /// Set up LO injection for a transceiver
    TrxLo {
        #[arg(long)]
        awg: Option<String>,
        #[arg(long)]
        operating_mhz: Option<f64>,
        #[arg(long)]
        usb: bool,
        #[arg(long)]
        lo_swap: bool,
        #[arg(long)]
        ptt: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassArg {
    SpectrumAnalyzer,
    WaveformGenerator,
    DigitalIo,
}

impl From<ClassArg> for InstrumentClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::SpectrumAnalyzer => InstrumentClass::SpectrumAnalyzer,
            ClassArg::WaveformGenerator => InstrumentClass::WaveformGenerator,
            ClassArg::DigitalIo => InstrumentClass::DigitalIo,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn pick(config: &BenchConfig, explicit: Option<String>, class: InstrumentClass) -> Result<String> {
    match explicit {
        Some(name) => Ok(name),
        None => config
            .first_of_class(class)
            .map(|d| d.name.clone())
            .ok_or_else(|| anyhow!("No {} configured", class)),
    }
}

async fn save_captures(report: &TestReport, dir: Option<&Path>) -> Result<()> {
    let Some(dir) = dir else {
        if !report.screen_captures.is_empty() {
            warn!("Screen captures taken but no results_dir configured");
        }
        return Ok(());
    };
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for capture in &report.screen_captures {
        let path = capture.save(dir).await?;
        info!(path = %path.display(), "Screen capture saved");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        BenchConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let manager = SessionManager::from_config(&config);
    let results_dir = config.application.results_dir.clone();

    match cli.command {
        Commands::Instruments { class } => {
            let listed: Vec<_> = manager
                .registry()
                .iter()
                .filter(|d| class.map_or(true, |c| d.class == InstrumentClass::from(c)))
                .collect();
            print_json(&listed)?;
        }
        Commands::Identify { name } => {
            let session = manager
                .load(&name)
                .await
                .with_context(|| format!("Failed to load {}", name))?;
            print_json(&session.handle().identify().await?)?;
        }
        Commands::Harmonics {
            sa,
            awg,
            fundamental_mhz,
            highest_harmonic,
            capture,
            project,
            test_id,
        } => {
            let params = &mut config.harmonics;
            if let Some(f) = fundamental_mhz {
                params.fundamental_hz = f * 1e6;
            }
            if let Some(h) = highest_harmonic {
                params.highest_harmonic = h;
            }
            params.full_span_capture |= capture;
            if let Some(p) = project {
                params.project_name = p;
            }
            if let Some(t) = test_id {
                params.test_id = t;
            }

            let sa_name = pick(&config, sa, InstrumentClass::SpectrumAnalyzer)?;
            let sa = manager.load(&sa_name).await?;
            let awg = match awg {
                Some(name) => Some(manager.load(&name).await?),
                None => None,
            };
            let report = run_harmonics(&sa, awg.as_deref(), &config.harmonics).await?;
            save_captures(&report, results_dir.as_deref()).await?;
            print_json(&report)?;
        }
        Commands::Imd {
            sa,
            awg,
            f1_mhz,
            f2_mhz,
            span_khz,
            max_order,
        } => {
            let params = &mut config.imd;
            if let Some(f) = f1_mhz {
                params.f1_hz = f * 1e6;
            }
            if let Some(f) = f2_mhz {
                params.f2_hz = f * 1e6;
            }
            if let Some(s) = span_khz {
                params.span_hz = s * 1e3;
            }
            if let Some(m) = max_order {
                params.max_order = m;
            }

            let sa = manager
                .load(&pick(&config, sa, InstrumentClass::SpectrumAnalyzer)?)
                .await?;
            let awg = manager
                .load(&pick(&config, awg, InstrumentClass::WaveformGenerator)?)
                .await?;
            let report = run_imd(&sa, &awg, &config.imd).await?;
            print_json(&report)?;
        }
        Commands::TrxLo {
            awg,
            operating_mhz,
            usb,
            lo_swap,
            ptt,
        } => {
            let params = &mut config.trx_lo;
            if let Some(f) = operating_mhz {
                params.operating_hz = f * 1e6;
            }
            params.usb |= usb;
            params.lo_swap |= lo_swap;
            params.ptt |= ptt;

            let awg = manager
                .load(&pick(&config, awg, InstrumentClass::WaveformGenerator)?)
                .await?;
            print_json(&run_trx_lo(&awg, &config.trx_lo).await?)?;
        }
    }

    Ok(())
}
