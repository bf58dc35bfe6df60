use chrono::Utc;

fn main() {
    env_logger::init();

    if handle_cli_flags() {
        return;
    }

    if let Err(err) = yt_reminder::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("YT-Reminder {}", yt_reminder::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "YT-Reminder — Desktop reminders for new channel uploads.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --check-now          Run a single feed check and exit\n  --plan               Print today's wake schedule and exit"
                );
                saw_flag = true;
            }
            "--check-now" => {
                saw_flag = true;
                if let Err(err) = check_now() {
                    eprintln!("Check failed: {err:?}");
                    std::process::exit(1);
                }
            }
            "--plan" => {
                saw_flag = true;
                if let Err(err) = print_plan() {
                    eprintln!("Planning failed: {err:?}");
                    std::process::exit(1);
                }
            }
            _ => {}
        }
    }
    saw_flag
}

fn check_now() -> anyhow::Result<()> {
    let cfg = yt_reminder::config::load(yt_reminder::config::LoadOptions::default())?;
    let daemon = yt_reminder::app::Daemon::new(cfg)?;
    let outcome = daemon.check_once()?;
    println!("{}", outcome.describe());
    Ok(())
}

fn print_plan() -> anyhow::Result<()> {
    let cfg = yt_reminder::config::load(yt_reminder::config::LoadOptions::default())?;
    let wakes = yt_reminder::schedule::plan_day(&cfg.schedule, Utc::now());
    for wake in &wakes {
        println!(
            "{}  {}",
            wake.when
                .with_timezone(&yt_reminder::schedule::jst())
                .format("%Y-%m-%d %H:%M JST"),
            wake.name
        );
    }
    Ok(())
}
