use anyhow::Context;
use objsync::cli::{
    Args, Commands, ConfigDiscovery, CopyArgs, DiscoveryEnv, ListArgs, MirrorArgs,
    ResolvedConfig, SessionCommand,
};
use objsync::commands::list::{self, ListUsageError};
use objsync::commands::session::{clear_sessions, list_sessions, resume_hint, resume_session};
use objsync::commands::{
    CommandRegistry, SessionRun, TransferSettings, interrupt_token, run_session,
};
use objsync::session::{SessionError, SessionId, SessionManager};
use std::io;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for command output
    let default_filter = if args.debug {
        "objsync=debug"
    } else {
        "objsync=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let resolved = match ConfigDiscovery::discover(&DiscoveryEnv::from_process(
        args.config_dir.clone(),
    )) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    debug!("Session root: {}", resolved.session_root.display());

    match args.command {
        Commands::Ls(list_args) => run_list(&list_args, args.mimic).await,
        Commands::Cp(copy_args) => run_copy(&resolved, copy_args).await,
        Commands::Mirror(mirror_args) => run_mirror(&resolved, mirror_args).await,
        Commands::Session(command) => run_session_command(&resolved, command).await,
        Commands::Config => {
            ConfigDiscovery::show_discovery_info(&resolved);
            ExitCode::SUCCESS
        }
    }
}

async fn run_list(args: &ListArgs, mimic: bool) -> ExitCode {
    let base_dir = list::current_dir();
    let mut stdout = io::stdout().lock();
    match list::run_list(args, mimic, &base_dir, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ListUsageError>().is_some() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}

async fn run_copy(resolved: &ResolvedConfig, args: CopyArgs) -> ExitCode {
    run_transfer(resolved, CopyArgs::COMMAND, args.to_argv()).await
}

async fn run_mirror(resolved: &ResolvedConfig, args: MirrorArgs) -> ExitCode {
    run_transfer(resolved, MirrorArgs::COMMAND, args.to_argv()).await
}

/// Start a fresh session for a transfer and drive it like a resumed one
async fn run_transfer(resolved: &ResolvedConfig, command: &str, argv: Vec<String>) -> ExitCode {
    let manager = resolved.session_manager();
    let session = match manager
        .begin(command, argv)
        .await
        .context("Unable to start a session")
    {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    info!("Running {} in session {}", command, session.id());

    let registry = CommandRegistry::new(TransferSettings::from(&resolved.config));
    let run = run_session(&manager, &session, &registry, interrupt_token()).await;
    report_run(session.id(), run)
}

async fn run_session_command(resolved: &ResolvedConfig, command: SessionCommand) -> ExitCode {
    let manager = resolved.session_manager();
    match command {
        SessionCommand::List => {
            let mut stdout = io::stdout().lock();
            exit_on_session_error(list_sessions(&manager, &mut stdout).await.map(|_| ()))
        }
        SessionCommand::Clear { target } => {
            let mut stdout = io::stdout().lock();
            exit_on_session_error(
                clear_sessions(&manager, &target, &mut stdout)
                    .await
                    .map(|_| ()),
            )
        }
        SessionCommand::Resume { id } => run_resume(resolved, &manager, &id).await,
    }
}

async fn run_resume(resolved: &ResolvedConfig, manager: &SessionManager, id: &str) -> ExitCode {
    let registry = CommandRegistry::new(TransferSettings::from(&resolved.config));
    match resume_session(manager, id, &registry, interrupt_token()).await {
        Ok((id, run)) => report_run(&id, run),
        Err(e) => {
            error!("Unable to resume session {}: {}", id, e);
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn exit_on_session_error(result: Result<(), SessionError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn report_run(id: &SessionId, run: SessionRun) -> ExitCode {
    match run {
        SessionRun::Finished => ExitCode::SUCCESS,
        SessionRun::Failed { error, saved } => {
            eprintln!("Error: {:#}", error);
            if saved {
                eprintln!("{}", resume_hint(id));
            }
            ExitCode::from(EXIT_FAILURE)
        }
        SessionRun::Interrupted { saved } => {
            match saved {
                Ok(_) => eprintln!("\nInterrupted. {}", resume_hint(id)),
                Err(e) => eprintln!("\nInterrupted. Session {} could not be saved: {}", id, e),
            }
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
