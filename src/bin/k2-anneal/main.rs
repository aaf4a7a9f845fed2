mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use k2_anneal::driver;
use k2_anneal::parallel::{run_worker, WorkerConfig};
use k2_anneal::sa::Solution;
use k2_anneal::schedule::{self, Instance, Schedule};

use crate::cli::{Cli, Commands, GenerateArgs, InstanceArgs, SolveArgs, WorkerArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet)?;
    tracing::debug!(?cli, "parsed arguments");

    let worker_args = cli.verbosity_args();
    match cli.command {
        Commands::Solve(args) => solve(args, worker_args),
        Commands::Generate(args) => generate(args),
        Commands::Worker(args) => worker(args),
    }
}

fn load_instance(source: &InstanceArgs, seed: u64) -> Result<Instance> {
    match (&source.instance, source.generate) {
        (Some(path), _) => schedule::load_csv(path, source.machines)
            .with_context(|| format!("loading instance {}", path.display())),
        (None, Some(jobs)) => Ok(schedule::generate(
            jobs,
            source.machines,
            source.min_time,
            source.max_time,
            seed,
        )?),
        (None, None) => bail!("either --instance or --generate is required"),
    }
}

fn solve(args: SolveArgs, worker_args: Vec<String>) -> Result<()> {
    let instance = Arc::new(load_instance(&args.source, args.anneal.seed)?);
    let params = args.anneal.params();
    let cooling = args.anneal.cooling();
    cooling.validate()?;
    tracing::info!(
        jobs = instance.jobs(),
        machines = instance.machines(),
        neighborhood = %args.anneal.neighborhood,
        "solving"
    );

    let best = match args.workers {
        None => driver::run_sequential(
            instance,
            &params,
            None,
            args.anneal.neighborhood,
            cooling.build(),
        )?,
        Some(workers) => {
            let par = args.par_params(workers);
            let report = driver::run_processes(
                instance,
                &params,
                &par,
                args.anneal.neighborhood,
                cooling,
                worker_args,
            )?;
            println!(
                "rounds: {}  improvements: {}  workers: {}",
                report.rounds, report.improvements, report.workers_seen
            );
            report.best.context("no worker delivered a solution")?
        }
    };

    print_schedule(&best);
    if let Some(path) = &args.output {
        schedule::save_schedule_csv(path, &best)
            .with_context(|| format!("writing schedule {}", path.display()))?;
    }
    Ok(())
}

fn print_schedule(best: &Schedule) {
    println!("K2 = {}", best.objective());
    for (machine, order) in best.orders().iter().enumerate() {
        let jobs: Vec<String> = order.iter().map(u32::to_string).collect();
        println!("machine {machine}: [{}]", jobs.join(", "));
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let instance = schedule::generate(args.jobs, args.machines, args.min_time, args.max_time, args.seed)?;
    schedule::save_csv(&args.output, &instance)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "wrote {} jobs (total time {}) to {}",
        instance.jobs(),
        instance.total_time(),
        args.output.display()
    );
    Ok(())
}

fn worker(args: WorkerArgs) -> Result<()> {
    let instance = Arc::new(
        schedule::load_csv(&args.instance, args.machines)
            .with_context(|| format!("loading instance {}", args.instance.display()))?,
    );
    let config = WorkerConfig {
        worker_id: args.worker_id,
        socket_path: args.socket.clone(),
        params: args.anneal.params(),
        init_seed: args.init_seed,
    };
    let cooling = args.anneal.cooling();
    cooling.validate()?;
    let summary = run_worker(instance, &config, args.anneal.neighborhood, cooling.build())
        .with_context(|| format!("worker {} on {}", args.worker_id, args.socket.display()))?;
    tracing::debug!(?summary, "worker exiting");
    Ok(())
}
