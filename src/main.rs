use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use likepilot::app::actions::{UiActions, UserActions};
use likepilot::app::config::{
    load_config, load_config_from_path, save_config, BotConfig, TargetApp,
};
use likepilot::app::gestures::{HumanInput, Pacing};
use likepilot::app::logging::init_logging;
use likepilot::app::models::ProgressEvent;
use likepilot::app::runner::start_run;
use likepilot::app::shell::{ShellExecutor, SuShell};
use likepilot::app::state::SessionState;
use likepilot::app::volume_key::{run_volume_key_self_test, start_volume_key_listener};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    users: Option<PathBuf>,
    cycles: Option<u32>,
    app: Option<String>,
    rescale: Option<(i32, i32)>,
    save: bool,
    json: bool,
    self_test_volume: bool,
    clear_app_data: bool,
    test_search: bool,
    test_like: bool,
    test_restart: bool,
    test_swipe: bool,
}

fn print_usage() {
    eprintln!(
        "usage: likepilot [--config PATH] [--users FILE] [--cycles N] [--app NAME]\n\
         \x20                [--rescale WxH] [--save] [--json]\n\
         \x20                [--self-test-volume | --clear-app-data]\n\
         \x20                [--test-search | --test-like | --test-restart | --test-swipe]\n\
         \n\
         \x20 --config PATH       load configuration from PATH instead of the default file\n\
         \x20 --users FILE        user ids, one per line (overrides the configured list)\n\
         \x20 --cycles N          number of passes over the user list\n\
         \x20 --app NAME          target app preset: douyin | xiaohongshu | kuaishou\n\
         \x20 --rescale WxH       rescale the coordinate map to a WxH panel\n\
         \x20 --save              persist the effective configuration before running\n\
         \x20 --json              print the final run summary as JSON\n\
         \x20 --self-test-volume  watch for a volume-down press for 30s, then exit\n\
         \x20 --clear-app-data    pm clear the target app, then exit\n\
         \x20 --test-search       search the first configured user and open its profile\n\
         \x20 --test-like         double-tap the configured like region once\n\
         \x20 --test-restart      force-stop and relaunch the target app once\n\
         \x20 --test-swipe        swipe the feed once using the configured anchors"
    );
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or("--config requires a path")?;
                args.config = Some(PathBuf::from(value));
            }
            "--users" => {
                let value = iter.next().ok_or("--users requires a path")?;
                args.users = Some(PathBuf::from(value));
            }
            "--cycles" => {
                let value = iter.next().ok_or("--cycles requires a number")?;
                args.cycles = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid cycle count: {value}"))?,
                );
            }
            "--app" => {
                args.app = Some(iter.next().ok_or("--app requires a preset name")?);
            }
            "--rescale" => {
                let value = iter.next().ok_or("--rescale requires WxH")?;
                let (width, height) = value
                    .split_once(['x', 'X'])
                    .ok_or_else(|| format!("invalid resolution: {value}"))?;
                let width: i32 = width
                    .parse()
                    .map_err(|_| format!("invalid width: {width}"))?;
                let height: i32 = height
                    .parse()
                    .map_err(|_| format!("invalid height: {height}"))?;
                if width < 1 || height < 1 {
                    return Err(format!("invalid resolution: {value}"));
                }
                args.rescale = Some((width, height));
            }
            "--save" => args.save = true,
            "--json" => args.json = true,
            "--self-test-volume" => args.self_test_volume = true,
            "--clear-app-data" => args.clear_app_data = true,
            "--test-search" => args.test_search = true,
            "--test-like" => args.test_like = true,
            "--test-restart" => args.test_restart = true,
            "--test-swipe" => args.test_swipe = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn load_effective_config(args: &Args) -> Result<BotConfig, String> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
    .map_err(|err| err.to_string())?;

    if let Some(path) = &args.users {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        config.user_ids = raw.lines().map(|line| line.to_string()).collect();
    }
    if let Some(cycles) = args.cycles {
        config.cycle_count = cycles;
    }
    if let Some(name) = &args.app {
        config.target =
            TargetApp::preset(name).ok_or_else(|| format!("unknown app preset: {name}"))?;
    }
    if let Some((width, height)) = args.rescale {
        config.coordinates = config.coordinates.rescaled(width, height);
    }
    Ok(config)
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Status { message } => println!("== {message}"),
        ProgressEvent::Log { timestamp, message } => println!("[{timestamp}] {message}"),
        ProgressEvent::CycleStarted { cycle, cycle_count } => {
            println!("-- cycle {cycle}/{cycle_count}")
        }
        ProgressEvent::Progress {
            completed_users,
            total_users,
            total_likes,
            current_cycle,
            restart_countdown,
        } => println!(
            "   {completed_users}/{total_users} users | {total_likes} likes | cycle {current_cycle} | restart in {restart_countdown}"
        ),
        ProgressEvent::Finished(summary) => println!(
            "== finished: {} of {} expected likes, {} restarts{}",
            summary.total_likes,
            summary.expected_likes,
            summary.app_restarts,
            if summary.cancelled { " (cancelled)" } else { "" }
        ),
    }
}

fn build_actions(shell: Arc<dyn ShellExecutor>, config: &BotConfig) -> UiActions {
    let trace_id = Uuid::new_v4().to_string();
    let input = HumanInput::new(Arc::clone(&shell), Pacing::default(), trace_id.clone());
    UiActions::new(
        shell,
        input,
        config.coordinates.clone(),
        config.target.clone(),
        trace_id,
    )
}

/// One-shot coordinate-tuning helpers, run against the live device.
fn run_manual_test(args: &Args, shell: Arc<dyn ShellExecutor>, config: &BotConfig) -> ExitCode {
    let actions = build_actions(shell, config);

    if args.test_restart {
        println!("restarting {}", config.target.package);
        actions.restart_app();
        return ExitCode::SUCCESS;
    }
    if args.test_swipe {
        println!("swiping the feed once");
        actions.swipe_up();
        return ExitCode::SUCCESS;
    }
    if args.test_like {
        println!("double-tapping the like region; watch for the like animation");
        if let Err(err) = actions.double_tap_like() {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
        return ExitCode::SUCCESS;
    }

    // --test-search
    let user_ids = config.trimmed_user_ids();
    let Some(user_id) = user_ids.first() else {
        eprintln!("error: no user ids configured; add --users FILE");
        return ExitCode::from(2);
    };
    println!("searching {user_id} and opening the first result");
    actions.open_app();
    let outcome = actions
        .search_user(user_id)
        .and_then(|()| actions.enter_user_profile());
    match outcome {
        Ok(()) => {
            println!("sequence completed; verify the profile is on screen");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn main() -> ExitCode {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            print_usage();
            return ExitCode::from(2);
        }
    };

    let config = match load_effective_config(&args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    if args.save {
        if let Err(err) = save_config(&config) {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    }

    let shell: Arc<dyn ShellExecutor> = Arc::new(SuShell::default());

    if args.clear_app_data {
        let actions = build_actions(Arc::clone(&shell), &config);
        println!("clearing data of {}", config.target.package);
        actions.clear_app_data();
        return ExitCode::SUCCESS;
    }

    if args.test_search || args.test_like || args.test_restart || args.test_swipe {
        return run_manual_test(&args, Arc::clone(&shell), &config);
    }

    if args.self_test_volume {
        let trace_id = Uuid::new_v4().to_string();
        return match run_volume_key_self_test(shell.as_ref(), &trace_id) {
            Ok(true) => {
                println!("volume-down press detected");
                ExitCode::SUCCESS
            }
            Ok(false) => {
                println!("self test expired without a volume-down press");
                ExitCode::from(1)
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::from(1)
            }
        };
    }

    let session = SessionState::new();
    let (events_tx, events_rx) = mpsc::sync_channel(256);

    let listener = if config.enable_volume_key_stop {
        let trace_id = Uuid::new_v4().to_string();
        match start_volume_key_listener(Arc::clone(&shell), session.running_flag(), trace_id) {
            Ok(listener) => Some(listener),
            Err(err) => {
                // Degrades silently; Ctrl-C or process kill remains available.
                warn!(error = %err, "volume-key cancellation unavailable");
                None
            }
        }
    } else {
        None
    };

    let handle = match start_run(config, &session, events_tx) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(listener) = listener {
                listener.stop();
            }
            return ExitCode::from(2);
        }
    };

    // The channel closes when the worker drops its sender.
    for event in events_rx.iter() {
        print_event(&event);
    }

    let summary = handle.join();
    if let Some(listener) = listener {
        listener.stop();
    }

    match summary {
        Some(summary) => {
            if args.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(payload) => println!("{payload}"),
                    Err(err) => eprintln!("error: failed to serialize summary: {err}"),
                }
            }
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("error: run worker panicked");
            ExitCode::from(1)
        }
    }
}
