use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::fs::File;
use std::path::Path;
use std::time::Instant;

use ctop::actions::{ActionRunner, ProcessSpawner};
use ctop::app::{App, CliArgs, Config, ViewState, exit_report};
use ctop::canvas::Canvas;
use ctop::canvas::backend::Tui;
use ctop::collection::classify::{Backends, Classifier, command_exists};
use ctop::collection::mounts::Mountpoints;
use ctop::collection::{CGroupCollector, HostContext};
use ctop::events::{Directive, wait_for_input};
use ctop::stats::{DisplayRow, build_rows};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(&args)?;

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", CliArgs::command().render_usage());
            std::process::exit(1);
        }
    };
    log::info!("ctop starting with {:?}", config);

    let context = HostContext::detect()?;
    let backends = Backends::detect();

    let mountpoints = match Mountpoints::resolve() {
        Ok(mountpoints) => mountpoints,
        Err(err) => {
            log::error!("Mountpoint resolution failed: {}", err);
            eprintln!("[ERROR] Failed to locate cgroup mountpoints.");
            diagnose();
            std::process::exit(1);
        }
    };

    let mut collector = CGroupCollector::new(mountpoints, context, Classifier::new(backends));
    let mut app = App::new(ViewState::from_config(&config), backends);
    let mut runner = ActionRunner::new();

    let mut tui = Tui::new()?;
    let result = run_app(&mut tui, &mut app, &mut collector, &mut runner);
    tui.restore()?;

    if let Some(warning) = exit_report(result)? {
        eprintln!("{}", warning);
        diagnose();
    }

    Ok(())
}

fn init_logging(args: &CliArgs) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if let Some(path) = &args.log_file {
        let file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Sample, draw, then handle input until the next tick. Returns the number of
/// rows in the last sample once the user quits.
fn run_app(
    tui: &mut Tui,
    app: &mut App,
    collector: &mut CGroupCollector,
    runner: &mut ActionRunner<ProcessSpawner>,
) -> Result<usize> {
    loop {
        collector.collect_metrics()?;
        let rows = match collector.current() {
            Some(sample) => build_rows(sample, collector.previous().map(|prev| prev.taken_at)),
            None => Vec::new(),
        };
        render(tui, app, &rows)?;

        let tick = Instant::now() + app.view.refresh;
        loop {
            let timeout = if app.view.paused {
                None
            } else {
                let now = Instant::now();
                if now >= tick {
                    break;
                }
                Some(tick - now)
            };

            let Some(event) = wait_for_input(timeout)? else {
                continue;
            };

            match app.apply(event) {
                Directive::Continue => {}
                Directive::Redraw => render(tui, app, &rows)?,
                Directive::Quit => return Ok(rows.len()),
                Directive::Run(command) => {
                    runner.run(&command, tui)?;
                    render(tui, app, &rows)?;
                }
            }
        }
    }
}

fn render(tui: &mut Tui, app: &mut App, rows: &[DisplayRow]) -> Result<()> {
    let (width, height) = tui.size()?;
    let screen = Canvas::layout(rows, &mut app.view, &app.backends, width, height);
    tui.draw(&screen)
}

/// Print hints about common reasons for not seeing any cgroup.
fn diagnose() {
    if Path::new("/.dockerenv").is_file() {
        eprintln!(
            "
Hint: It seems you are running inside a Docker container.
      Please make sure to expose host's cgroups with
      '--volume=/sys/fs/cgroup:/sys/fs/cgroup:ro'"
        );
    }

    if command_exists("boot2docker") {
        eprintln!(
            "
Hint: It seems you have 'boot2docker' installed.
      To monitor Docker containers in 'boot2docker'
      run ctop inside the VM itself."
        );
    }
}
