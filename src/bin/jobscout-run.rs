//! One automation run, spawned by the control plane: `jobscout-run <search|apply>`.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use jobscout::brain::{OpenAiBrain, ScoringBackend};
use jobscout::config::{linkedin_credentials, load_config, JobscoutConfig, ProfileConfig};
use jobscout::control::RunMode;
use jobscout::core::run_state::{FileStatusStore, Monitor, RunStatus};
use jobscout::core::stop_signal::{FileStopSignal, StopSignal};
use jobscout::features::antibot::{pacing_from_env, Pacing};
use jobscout::features::session_store;
use jobscout::scraping::browser_manager::BrowserSession;
use jobscout::scraping::CdpPage;
use jobscout::tools::apply_run::{run_apply_batch, ApplySettings};
use jobscout::tools::login::{ensure_logged_in, LoginOptions, LoginOutcome};
use jobscout::tools::search_run::{run_sweep, SweepSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args
        .get(1)
        .and_then(|a| RunMode::parse(a))
        .ok_or_else(|| anyhow!("usage: jobscout-run <search|apply>"))?;

    let config = load_config();
    let mut monitor = Monitor::new(Arc::new(FileStatusStore::new(config.paths.status_path())));
    let stop = FileStopSignal::new(config.paths.stop_signal_path());
    // A signal left over from a previous run must not cancel this one.
    stop.clear();
    monitor.set_status(RunStatus::Running);
    monitor.log(format!("Starting {} run", mode));

    let outcome = run(mode, &config, &mut monitor, &stop).await;
    if let Err(e) = &outcome {
        monitor.log(format!("❌ Run aborted: {:#}", e));
        monitor.set_status(RunStatus::Stopped);
    }
    outcome
}

fn brain_for(config: &JobscoutConfig, profile: &ProfileConfig) -> Result<OpenAiBrain> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(OpenAiBrain::from_config(client, &config.brain, profile.raw.clone())?)
}

async fn run(
    mode: RunMode,
    config: &JobscoutConfig,
    monitor: &mut Monitor,
    stop: &FileStopSignal,
) -> Result<()> {
    let profile_path = config.brain.resolve_profile_path();
    let profile = ProfileConfig::load(&profile_path).context("candidate profile is required")?;

    let brain = match mode {
        RunMode::Search => Some(brain_for(config, &profile).context("scoring backend is required for search")?),
        RunMode::Apply => match brain_for(config, &profile) {
            Ok(b) => Some(b),
            Err(e) => {
                warn!("no scoring backend, open questions are left blank: {:#}", e);
                None
            }
        },
    };

    let pacing = pacing_from_env();
    let session = BrowserSession::launch(&config.browser, &config.paths).await?;
    let outcome = drive(mode, config, &profile, brain.as_ref(), &session, monitor, stop, &pacing).await;
    session.close().await;
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    mode: RunMode,
    config: &JobscoutConfig,
    profile: &ProfileConfig,
    brain: Option<&OpenAiBrain>,
    session: &BrowserSession,
    monitor: &mut Monitor,
    stop: &FileStopSignal,
    pacing: &Pacing,
) -> Result<()> {
    let cookies = config.paths.session_cookies_path();
    if session_store::restore(session.page(), &cookies).await {
        info!("restored stored session from {}", cookies.display());
    }

    let page = CdpPage::new(session.page().clone());
    let origin = config.run.resolve_platform_origin();
    monitor.log("Checking login...");
    let login = ensure_logged_in(
        &page,
        &origin,
        linkedin_credentials(),
        pacing,
        &LoginOptions::default(),
    )
    .await
    .context("login failed")?;
    if login == LoginOutcome::SignedIn {
        session_store::save_from_page(session.page(), &cookies).await;
    }
    monitor.log("✅ Logged in");

    let reports_dir = config.paths.resolve_reports_dir();
    match mode {
        RunMode::Search => {
            let brain = brain.ok_or_else(|| anyhow!("scoring backend is required for search"))?;
            let settings = SweepSettings {
                job_limit: config.run.resolve_job_limit(),
                match_threshold: config.run.resolve_match_threshold(),
                short_window: config.run.resolve_short_window(),
                wide_window: config.run.resolve_wide_window(),
                origin,
                reports_dir,
                ..SweepSettings::default()
            };
            let summary = run_sweep(
                &page,
                brain,
                monitor,
                stop,
                &profile.roles(),
                &profile.locations(),
                &settings,
                pacing,
            )
            .await?;
            info!(
                "sweep done: {} combinations, {} matches, report {:?}",
                summary.combinations_run, summary.matches, summary.final_report
            );
        }
        RunMode::Apply => {
            let settings = ApplySettings {
                reports_dir,
                ..ApplySettings::default()
            };
            let summary = run_apply_batch(
                &page,
                brain.map(|b| b as &dyn ScoringBackend),
                profile,
                monitor,
                stop,
                &settings,
                pacing,
            )
            .await?;
            info!(
                "apply done: {} attempted, {} submitted, {} skipped",
                summary.attempted, summary.submitted, summary.skipped
            );
        }
    }
    Ok(())
}
