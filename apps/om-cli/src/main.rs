use clap::{Parser, Subcommand};
use om_app::{
    AppError, AppResult, RunMode, RunOptions, RunProgressEvent, RunRequest, RunStage,
    RunTimingSummary, project_service, query, run_service,
};
use om_results::RunReport;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "optim")]
#[command(about = "OptiM - linear and nonlinear beam optics", long_about = None)]
struct Cli {
    /// Print per-stage wall times to stderr
    #[arg(long, global = true)]
    timing: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate project file syntax, references and element parameters
    Validate {
        /// Path to the project YAML file
        project_path: PathBuf,
    },
    /// List beamlines in a project
    Beamlines {
        /// Path to the project YAML file
        project_path: PathBuf,
    },
    /// Run a computation
    #[command(subcommand)]
    Run(RunCommands),
    /// List cached runs for a project
    Runs {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Only list runs of this beamline
        beamline_id: Option<String>,
    },
    /// Show details of a cached run
    ShowRun {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Run ID to display
        run_id: String,
    },
    /// Export a series from a run as CSV
    ExportSeries {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Run ID
        run_id: String,
        /// Variable name (e.g., beta_x, disp_x, sigma_y, or x, px, y, py, z, delta for tracks)
        variable: String,
        /// Particle index for tracking runs
        #[arg(long, default_value_t = 0)]
        particle: usize,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// Closed orbit, periodic Twiss functions, tunes and chromaticity
    Twiss {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Beamline ID to solve
        beamline_id: String,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// Second-moment envelope, optionally with space charge
    Envelope {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Beamline ID to propagate through
        beamline_id: String,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// Turn-by-turn particle tracking
    Track {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Beamline ID to track through
        beamline_id: String,
        /// Number of turns (defaults to the beamline's tracking settings)
        #[arg(long)]
        turns: Option<usize>,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
}

fn main() -> AppResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if cli.timing {
        om_core::timing::enable_timing();
    }

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Beamlines { project_path } => cmd_beamlines(&project_path),
        Commands::Run(run_cmd) => {
            let (project_path, beamline_id, mode, no_cache) = match run_cmd {
                RunCommands::Twiss {
                    project_path,
                    beamline_id,
                    no_cache,
                } => (project_path, beamline_id, RunMode::Twiss, no_cache),
                RunCommands::Envelope {
                    project_path,
                    beamline_id,
                    no_cache,
                } => (project_path, beamline_id, RunMode::Envelope, no_cache),
                RunCommands::Track {
                    project_path,
                    beamline_id,
                    turns,
                    no_cache,
                } => (project_path, beamline_id, RunMode::Track { turns }, no_cache),
            };
            cmd_run(&project_path, &beamline_id, mode, !no_cache)
        }
        Commands::Runs {
            project_path,
            beamline_id,
        } => cmd_runs(&project_path, beamline_id.as_deref()),
        Commands::ShowRun {
            project_path,
            run_id,
        } => cmd_show_run(&project_path, &run_id),
        Commands::ExportSeries {
            project_path,
            run_id,
            variable,
            particle,
            output,
        } => cmd_export_series(&project_path, &run_id, &variable, particle, output.as_deref()),
    }
}

fn cmd_validate(project_path: &Path) -> AppResult<()> {
    println!("Validating project: {}", project_path.display());
    let project = project_service::load_project(project_path)?;
    project_service::validate_project(&project)?;
    println!("✓ Project is valid");
    Ok(())
}

fn cmd_beamlines(project_path: &Path) -> AppResult<()> {
    let project = project_service::load_project(project_path)?;
    let beamlines = project_service::list_beamlines(&project);

    if beamlines.is_empty() {
        println!("No beamlines found in project");
    } else {
        println!("Beamlines in project:");
        for bl in beamlines {
            println!(
                "  {} - {} ({:?}, {} elements, {:.3} m)",
                bl.id, bl.name, bl.topology, bl.element_count, bl.length_m
            );
        }
    }
    Ok(())
}

fn mode_label(mode: &RunMode) -> &'static str {
    match mode {
        RunMode::Twiss => "optics",
        RunMode::Envelope => "envelope",
        RunMode::Track { .. } => "tracking",
    }
}

fn cmd_run(project_path: &Path, beamline_id: &str, mode: RunMode, use_cache: bool) -> AppResult<()> {
    println!("Running {} for beamline: {}", mode_label(&mode), beamline_id);

    let request = RunRequest {
        project_path,
        beamline_id,
        mode,
        options: RunOptions {
            use_cache,
            ..RunOptions::default()
        },
    };

    let mut last_emit = Instant::now();
    let mut last_stage = String::new();
    let result = run_service::ensure_run_with_progress(
        &request,
        Some(&mut |event| {
            let stage_key = format!("{:?}", event.stage);
            let emit_now = stage_key != last_stage || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                render_cli_progress(&event);
                last_stage = stage_key;
                last_emit = Instant::now();
            }
        }),
    );
    clear_progress_line();

    let response = match result {
        Ok(response) => response,
        Err(err) if err.is_unstable_lattice() => {
            eprintln!("✗ Lattice has no stable periodic solution");
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    if response.loaded_from_cache {
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Run completed: {}", response.run_id);
    }

    print_timing_summary(&request.mode, &response.timing);
    print_summary(&response.report)
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    let spinner = ['|', '/', '-', '\\'];
    let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
    let mut line = format!(
        "\r{} {}  elapsed={:.2}s",
        spinner[spin_idx],
        event.stage.label(),
        event.elapsed_wall_s
    );
    if let Some(it) = &event.iteration {
        if let Some(stage) = &it.stage {
            line.push_str(&format!("  step={stage}"));
        }
        if let Some(iter) = it.iteration {
            line.push_str(&format!("  iter={iter}"));
        }
        if let Some(residual) = it.residual {
            line.push_str(&format!("  residual={residual:.3e}"));
        }
    }
    if let Some(msg) = &event.message {
        line.push_str(&format!("  {msg}"));
    }
    if event.stage != RunStage::Completed {
        print!("{line}");
        let _ = io::stdout().flush();
    }
}

fn print_timing_summary(mode: &RunMode, timing: &RunTimingSummary) {
    let total = timing.total_time_s.max(1.0e-12);
    let compile_pct = 100.0 * timing.compile_time_s / total;
    let solve_pct = 100.0 * timing.solve_time_s / total;
    let save_pct = 100.0 * timing.save_time_s / total;

    println!("\nTiming summary:");
    println!(
        "  Compile: {:.3}s ({:.1}%)",
        timing.compile_time_s, compile_pct
    );
    println!("  Solve:   {:.3}s ({:.1}%)", timing.solve_time_s, solve_pct);
    println!("  Save:    {:.3}s ({:.1}%)", timing.save_time_s, save_pct);
    if timing.load_cache_time_s > 0.0 {
        println!("  Cache load: {:.3}s", timing.load_cache_time_s);
    }
    println!("  Total:   {:.3}s", timing.total_time_s);

    match mode {
        RunMode::Twiss if timing.iterations > 0 => {
            println!("  Closed-orbit iterations: {}", timing.iterations);
            println!("  Final residual: {:.3e}", timing.residual);
        }
        RunMode::Envelope if timing.iterations > 0 => {
            println!("  Space-charge iterations: {}", timing.iterations);
            println!("  Final residual: {:.3e}", timing.residual);
        }
        _ => {}
    }
}

fn print_summary(report: &RunReport) -> AppResult<()> {
    let summary = query::get_run_summary(report)?;
    println!("\nRun Summary ({}):", summary.kind);
    println!("  Records: {}", summary.record_count);
    if summary.s_range.1 > summary.s_range.0 {
        println!(
            "  s range: {:.3} - {:.3} m",
            summary.s_range.0, summary.s_range.1
        );
    }
    for (key, value) in &summary.figures {
        println!("  {key}: {value}");
    }
    Ok(())
}

fn cmd_runs(project_path: &Path, beamline_id: Option<&str>) -> AppResult<()> {
    let runs = run_service::list_runs(project_path, beamline_id)?;

    if runs.is_empty() {
        println!("No cached runs found");
    } else {
        println!("Cached runs:");
        for manifest in runs {
            println!(
                "  {} {:<8} {} ({})",
                manifest.run_id,
                manifest.run_type.label(),
                manifest.beamline_id,
                manifest.timestamp
            );
        }
    }
    Ok(())
}

fn cmd_show_run(project_path: &Path, run_id: &str) -> AppResult<()> {
    println!("Loading run: {}", run_id);

    let (manifest, report) = run_service::load_run(project_path, run_id)?;
    println!("  Beamline: {}", manifest.beamline_id);
    println!("  Created:  {}", manifest.timestamp);
    println!("  Solver:   {}", manifest.solver_version);
    print_summary(&report)?;

    match &report {
        RunReport::Twiss(r) => {
            println!(
                "\n{:<12} {:>9} {:>10} {:>8} {:>10} {:>8} {:>9}",
                "element", "s [m]", "beta_x", "alpha_x", "beta_y", "alpha_y", "D_x"
            );
            for t in &r.records {
                println!(
                    "{:<12} {:>9.4} {:>10.4} {:>8.4} {:>10.4} {:>8.4} {:>9.4}",
                    t.element, t.s_m, t.beta_x_m, t.alpha_x, t.beta_y_m, t.alpha_y, t.disp_x_m
                );
            }
        }
        RunReport::Envelope(r) => {
            println!(
                "\n{:<12} {:>9} {:>12} {:>12} {:>12} {:>12}",
                "element", "s [m]", "sigma_x[mm]", "sigma_y[mm]", "eps_x", "eps_y"
            );
            for e in &r.records {
                println!(
                    "{:<12} {:>9.4} {:>12.4} {:>12.4} {:>12.4e} {:>12.4e}",
                    e.element,
                    e.s_m,
                    e.sigma_x_m * 1e3,
                    e.sigma_y_m * 1e3,
                    e.emittance_x_m,
                    e.emittance_y_m
                );
            }
        }
        RunReport::Track(r) => {
            println!("\nLost particles:");
            let mut any = false;
            for p in r.particles.iter().filter(|p| !p.alive) {
                any = true;
                println!(
                    "  #{} at {} (index {}) turn {}: {}",
                    p.index,
                    p.lost_element.as_deref().unwrap_or("?"),
                    p.lost_element_index.map_or_else(|| "?".to_string(), |i| i.to_string()),
                    p.lost_turn.map_or_else(|| "?".to_string(), |t| t.to_string()),
                    p.loss_reason.as_deref().unwrap_or("unknown")
                );
            }
            if !any {
                println!("  none");
            }
        }
    }

    Ok(())
}

fn coordinate_index(variable: &str) -> Option<usize> {
    ["x", "px", "y", "py", "z", "delta"]
        .iter()
        .position(|c| *c == variable)
}

fn cmd_export_series(
    project_path: &Path,
    run_id: &str,
    variable: &str,
    particle: usize,
    output: Option<&Path>,
) -> AppResult<()> {
    let (_manifest, report) = run_service::load_run(project_path, run_id)?;

    let (header, rows): (&str, Vec<String>) = match &report {
        RunReport::Twiss(r) => (
            "s_m,value",
            query::extract_twiss_series(r, variable)?
                .iter()
                .map(|(s, v)| format!("{s},{v}"))
                .collect(),
        ),
        RunReport::Envelope(r) => (
            "s_m,value",
            query::extract_envelope_series(r, variable)?
                .iter()
                .map(|(s, v)| format!("{s},{v}"))
                .collect(),
        ),
        RunReport::Track(r) => {
            let coordinate = coordinate_index(variable).ok_or_else(|| {
                AppError::InvalidInput(format!("Unknown coordinate: {variable}"))
            })?;
            (
                "turn,value",
                query::particle_series(r, particle, coordinate)?
                    .iter()
                    .map(|(turn, v)| format!("{turn},{v}"))
                    .collect(),
            )
        }
    };

    // Build CSV
    let mut csv = format!("{header}\n");
    for row in &rows {
        csv.push_str(row);
        csv.push('\n');
    }

    // Write to file or stdout
    if let Some(path) = output {
        std::fs::write(path, csv)?;
        println!("✓ Exported {} data points to {}", rows.len(), path.display());
    } else {
        print!("{csv}");
    }

    Ok(())
}
