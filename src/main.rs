use anyhow::{bail, Context, Result};
use coupon_scan::domains::qr::CouponQrMode;
use coupon_scan::domains::scan::{LogPayload, ScanOutcome};
use coupon_scan::domains::verify::{ManualOutcome, ResultAction, VerifyOutcome};
use coupon_scan::{AppState, StationFlow};
use shared::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::ctrl_c;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: coupon_scan [verify | scan | manual <code> | qr <url|uuid> <uuid> [out.png | -]]";

fn report_scan(outcome: &ScanOutcome<VerifyOutcome>) {
    match outcome {
        ScanOutcome::Handled { output, .. } => info!("✅ Scan finished: {:?}", output),
        ScanOutcome::Cancelled => info!("📴 Camera closed"),
        ScanOutcome::Unavailable(e) => warn!("⚠️ Camera unavailable: {}", e),
    }
}

fn print_screen(flow: &StationFlow) {
    let screen = flow.screen();
    flow.take_alert();
    print!("{}", screen);
}

/// Interactive verification page on the terminal. Ctrl-C closes the camera
/// while it is open and quits otherwise.
async fn run_station(state: &AppState) -> Result<()> {
    let flow = &state.flow;
    let session = &state.session;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_screen(flow);
    loop {
        let Some(line) = session.until_interrupted(lines.next_line(), ctrl_c).await else {
            break;
        };
        let Some(line) = line? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match command {
            "s" => match session.until_interrupted(flow.start_scan(), ctrl_c).await {
                Some(outcome) => report_scan(&outcome),
                None => break,
            },
            "m" => match session.until_interrupted(flow.submit_manual(rest), ctrl_c).await {
                Some(ManualOutcome::Dispatched(outcome)) => {
                    info!("✅ Manual verification finished: {:?}", outcome)
                }
                Some(ManualOutcome::EmptyCode) => {}
                None => break,
            },
            "c" => {
                let actions = flow.screen().result.map(|r| r.actions).unwrap_or_default();
                if actions.contains(&ResultAction::Continue) {
                    match session
                        .until_interrupted(flow.perform(ResultAction::Continue), ctrl_c)
                        .await
                    {
                        Some(Some(outcome)) => report_scan(&outcome),
                        Some(None) => {}
                        None => break,
                    }
                } else if actions.contains(&ResultAction::Next) {
                    flow.perform(ResultAction::Next).await;
                } else {
                    println!("Nothing to continue");
                }
            }
            "e" => {
                flow.perform(ResultAction::End).await;
            }
            "q" => break,
            "" => {}
            other => println!("Unknown command '{}'", other),
        }
        print_screen(flow);
    }

    flow.close_camera();
    info!("👋 Station closed");
    Ok(())
}

/// Plain scan page: print the first payload the camera reads.
async fn run_scan_demo(state: &AppState) -> Result<()> {
    match state.session.until_interrupted(state.session.run(&LogPayload), ctrl_c).await {
        Some(ScanOutcome::Handled { token, .. }) => println!("{}", token),
        Some(ScanOutcome::Cancelled) => info!("📴 Camera closed"),
        Some(ScanOutcome::Unavailable(e)) => bail!("could not start the camera: {}", e),
        None => info!("👋 Scan abandoned"),
    }
    Ok(())
}

async fn run_manual(state: &AppState, code: &str) -> Result<()> {
    if state
        .session
        .until_interrupted(state.flow.submit_manual(code), ctrl_c)
        .await
        .is_some()
    {
        print_screen(&state.flow);
    }
    Ok(())
}

/// Writes the coupon QR as PNG, or prints it as a data URL when `out` is `-`.
async fn run_qr(state: &AppState, mode: &str, uuid: &str, out: &str) -> Result<()> {
    let mode: CouponQrMode = mode.parse()?;
    if out == "-" {
        println!("{}", state.qr_generator.generate_data_url(mode, uuid)?);
        return Ok(());
    }

    let png = state.qr_generator.generate(mode, uuid)?;
    tokio::fs::write(out, &png)
        .await
        .with_context(|| format!("writing {}", out))?;
    info!("🖼️ Wrote {} QR for {} to {} ({} bytes)", mode, uuid, out, png.len());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.app.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🔧 Environment: {}", config.app.environment);
    let state = AppState::new(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("verify") => run_station(&state).await,
        Some("scan") => run_scan_demo(&state).await,
        Some("manual") => run_manual(&state, args.get(1).map(String::as_str).unwrap_or("")).await,
        Some("qr") => match (args.get(1), args.get(2)) {
            (Some(mode), Some(uuid)) => {
                let out = args.get(3).map(String::as_str).unwrap_or("coupon-qr.png");
                run_qr(&state, mode, uuid, out).await
            }
            _ => bail!("{}", USAGE),
        },
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}
