use clap::{Parser, Subcommand};
use orforms::formulation::allocation::AllocationProblem;
use orforms::formulation::coverage::CoverageProblem;
use orforms::formulation::facility_location::FacilityLocationProblem;
use orforms::formulation::job_shop::JobShopProblem;
use orforms::formulation::resource_tuning::ResourceTuningProblem;
use orforms::{
    init_logging, Formulation, PlanningService, ResourceSampler, SolverBackend, SolverConfig,
    SolverError, SolverFactory,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Parser)]
#[command(name = "orforms")]
#[command(about = "Formulate and solve small operations-research problems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Solver backend
    #[arg(long, value_enum, default_value_t = SolverBackend::Auto, global = true)]
    backend: SolverBackend,

    /// Solver wall-clock limit in seconds
    #[arg(long, global = true)]
    solver_time_limit: Option<f64>,

    /// Relative MIP gap at which the solver may stop
    #[arg(long, global = true)]
    gap: Option<f64>,

    /// Let the solver print its own log
    #[arg(long, global = true)]
    verbose: bool,

    /// Log filter (e.g. `info`, `orforms=debug`); defaults to ORFORMS_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Split resources between projects to maximize weighted return
    Allocation {
        /// JSON instance file
        file: PathBuf,
    },
    /// Open facilities and route customer demand at least cost
    Facility {
        /// JSON instance file
        file: PathBuf,
    },
    /// Pick the fewest facilities so every customer is covered
    Coverage {
        /// JSON instance file
        file: PathBuf,
    },
    /// Schedule jobs on machines to minimize the makespan
    JobShop {
        /// JSON instance file
        file: PathBuf,
    },
    /// Run a command, measure it, and size its cheapest CPU/memory reservation
    Tune {
        /// Longest acceptable run, in seconds
        #[arg(long)]
        max_runtime: f64,
        /// Upper bound on the reserved memory, in MB
        #[arg(long)]
        memory_limit: Option<f64>,
        #[arg(long, default_value_t = 1.0)]
        cost_per_cpu: f64,
        #[arg(long, default_value_t = 0.01)]
        cost_per_mb: f64,
        /// Multiplier applied to the observed peaks
        #[arg(long, default_value_t = ResourceTuningProblem::DEFAULT_HEADROOM)]
        headroom: f64,
        /// Sampling interval in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Command to run, followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn read_instance<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
    let instance = serde_json::from_str(&source)
        .map_err(|e| format!("Error parsing {}: {}", path.display(), e))?;
    Ok(instance)
}

fn solve_file<F>(service: &PlanningService, path: &Path) -> Result<String, Box<dyn std::error::Error>>
where
    F: Formulation + DeserializeOwned,
    F::Output: Serialize,
{
    let instance: F = read_instance(path)?;
    let plan = service.solve(&instance)?;
    Ok(serde_json::to_string_pretty(&plan)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let mut config = SolverConfig::default()
        .with_backend(cli.backend)
        .with_verbose(cli.verbose);
    if let Some(limit) = cli.solver_time_limit {
        config = config.with_time_limit(limit);
    }
    if let Some(gap) = cli.gap {
        config = config.with_gap_tolerance(gap);
    }
    let service = PlanningService::new(SolverFactory::create_from_config(&config)).with_config(config);

    let report = match cli.command {
        Commands::Allocation { file } => solve_file::<AllocationProblem>(&service, &file)?,
        Commands::Facility { file } => solve_file::<FacilityLocationProblem>(&service, &file)?,
        Commands::Coverage { file } => solve_file::<CoverageProblem>(&service, &file)?,
        Commands::JobShop { file } => solve_file::<JobShopProblem>(&service, &file)?,
        Commands::Tune {
            max_runtime,
            memory_limit,
            cost_per_cpu,
            cost_per_mb,
            headroom,
            interval_ms,
            command,
        } => {
            let (program, args) = command
                .split_first()
                .ok_or_else(|| SolverError::InvalidInput("no command given".into()))?;
            let run = ResourceSampler::new()
                .with_interval(Duration::from_millis(interval_ms))
                .run(program, args)
                .await?;
            if !run.success {
                warn!(program = %program, "command exited unsuccessfully; sizing from its run anyway");
            }

            let mut problem =
                ResourceTuningProblem::new(run.profile(), max_runtime, cost_per_cpu, cost_per_mb)
                    .with_headroom(headroom);
            if let Some(limit) = memory_limit {
                problem = problem.with_memory_limit(limit);
            }
            let plan = service.solve(&problem)?;
            serde_json::to_string_pretty(&serde_json::json!({ "run": run, "plan": plan }))?
        }
    };

    println!("{report}");
    Ok(())
}
