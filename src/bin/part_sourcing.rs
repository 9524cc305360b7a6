use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use part_sourcing::config::{ConfigLoader, ResolvedSettings};
use part_sourcing::delivery::{EnterpriseNotifier, FtpChannel, RemoteCopy};
use part_sourcing::domain::Provider;
use part_sourcing::error::SourcingError;
use part_sourcing::getchips::GetChipsHttpClient;
use part_sourcing::lookup::PartLookup;
use part_sourcing::nexar::NexarHttpClient;
use part_sourcing::output::{JsonOutput, LogSink};
use part_sourcing::pipeline::{Pipeline, PipelineOptions};
use part_sourcing::token::{HttpTokenSource, SystemClock, TokenManager};
use part_sourcing::watcher::{DirectoryWatcher, spawn_worker, watch_queue};

#[derive(Parser)]
#[command(name = "part-sourcing")]
#[command(about = "Look up offers for a spreadsheet of part numbers and deliver the result")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Process one input spreadsheet")]
    Process(ProcessArgs),
    #[command(about = "Watch a directory and process spreadsheets as they arrive")]
    Watch(WatchArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(long, value_enum)]
    provider: Option<Provider>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ProcessArgs {
    input: Utf8PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long, env = "WATCH_FOLDER")]
    dir: Option<Utf8PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SourcingError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SourcingError) -> u8 {
    match error {
        err if err.is_input_error() => 2,
        SourcingError::Auth(_) => 3,
        SourcingError::NoData(_) => 4,
        SourcingError::Delivery(_) => 5,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Process(args) => run_process(args, settings),
        Commands::Watch(args) => run_watch(args, settings),
    }
}

fn run_process(args: ProcessArgs, settings: ResolvedSettings) -> miette::Result<()> {
    let pipeline = build_pipeline(&settings, &args.run)?;
    let report = pipeline.run(&args.input, &LogSink)?;
    JsonOutput::print_report(&report).into_diagnostic()?;
    Ok(())
}

fn run_watch(args: WatchArgs, settings: ResolvedSettings) -> miette::Result<()> {
    let dir = args
        .dir
        .or_else(|| settings.watch.folder.clone())
        .ok_or_else(|| miette::Report::msg("no watch folder (use --dir or WATCH_FOLDER)"))?;
    let pipeline = build_pipeline(&settings, &args.run)?;

    let (sender, receiver) = watch_queue();
    let worker = spawn_worker(receiver, move |path| {
        pipeline.run(path, &LogSink).map(|report| {
            tracing::info!(
                output = %report.output,
                records = report.records,
                "queued file processed"
            );
        })
    });
    let _watcher = DirectoryWatcher::start(&dir, settings.watch.clone(), sender)?;

    let handled = worker
        .join()
        .map_err(|_| miette::Report::msg("watch worker panicked"))?;
    tracing::info!(handled, "watch worker stopped");
    Ok(())
}

fn build_pipeline(
    settings: &ResolvedSettings,
    overrides: &RunArgs,
) -> Result<Pipeline<Box<dyn PartLookup>>, SourcingError> {
    let provider = overrides.provider.unwrap_or(settings.provider);
    let chunk_size = overrides.chunk_size.unwrap_or(settings.chunk_size);
    if chunk_size == 0 {
        return Err(SourcingError::Config(
            "chunk size must be at least 1".to_string(),
        ));
    }
    let options = PipelineOptions {
        chunk_size,
        parallelism: settings.parallelism,
        output_dir: overrides
            .output_dir
            .clone()
            .unwrap_or_else(|| settings.upload_folder.clone()),
        column: provider.identifier_column(),
    };

    let mut pipeline = Pipeline::new(build_lookup(settings, provider)?, options);
    if let Some(ftp) = &settings.ftp {
        pipeline = pipeline.with_channel(Box::new(FtpChannel::new(ftp.clone())));
    }
    if let Some(ssh) = &settings.ssh {
        if ssh.archive_input {
            pipeline = pipeline.with_archive(RemoteCopy::detect(ssh.clone()));
        }
        pipeline = pipeline.with_channel(RemoteCopy::detect(ssh.clone()));
    }
    if let Some(enterprise) = &settings.enterprise {
        pipeline = pipeline.with_notifier(Box::new(EnterpriseNotifier::new(enterprise.clone())?));
    }
    Ok(pipeline)
}

fn build_lookup(
    settings: &ResolvedSettings,
    provider: Provider,
) -> Result<Box<dyn PartLookup>, SourcingError> {
    match provider {
        Provider::Nexar => {
            let nexar = &settings.nexar;
            let source =
                HttpTokenSource::new(&nexar.token_url, &nexar.client_id, &nexar.client_secret)?;
            let tokens = TokenManager::new(Box::new(source), Box::new(SystemClock));
            Ok(Box::new(NexarHttpClient::new(
                &nexar.api_url,
                &nexar.currency,
                tokens,
            )?))
        }
        Provider::Getchips => {
            let getchips = &settings.getchips;
            let client =
                GetChipsHttpClient::new(&getchips.url, &getchips.token, &getchips.currency)?
                    .with_quantity(getchips.quantity);
            Ok(Box::new(client))
        }
    }
}
