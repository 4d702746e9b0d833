//! Session commands: `veil create`, `join`, `resume`, `status`, `reveal`, `reset`.

use anyhow::{Result, bail};
use console::style;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use veil::config::VeilConfig;
use veil::coordinator::{CommitOutcome, Coordinator, Phase};
use veil::errors::SessionError;
use veil::store::{SnapshotStore, now_millis};
use veil::transport::{HttpTransport, SessionTransport};
use veil::ui::icons::{CHECK, WARN};
use veil::ui::{SessionUI, report};
use veil::upload::{ArtifactSlot, StagedFile};
use veil_common::PrivacyLevel;

use crate::CommitArgs;

/// How long to wait for the renderer to drain after the coordinator is gone.
const RENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A coordinator wired to the relay, the saved-session file and the terminal.
struct SessionRun {
    coordinator: Coordinator,
    ui: SessionUI,
    renderer: JoinHandle<()>,
}

impl SessionRun {
    fn start(config: &VeilConfig) -> Result<Self> {
        let coordinator = build_coordinator(config)?;
        let ui = SessionUI::new();
        let renderer = ui.clone().spawn(coordinator.subscribe());
        Ok(Self {
            coordinator,
            ui,
            renderer,
        })
    }

    /// Stop the coordinator and let the renderer print whatever is queued.
    async fn finish(self) {
        let Self {
            coordinator,
            ui,
            renderer,
        } = self;
        drop(coordinator);
        let abort = renderer.abort_handle();
        if tokio::time::timeout(RENDER_DRAIN_TIMEOUT, renderer)
            .await
            .is_err()
        {
            abort.abort();
        }
        ui.finish();
    }
}

fn build_coordinator(config: &VeilConfig) -> Result<Coordinator> {
    let transport = HttpTransport::new(&config.server_url, config.request_timeout())?;
    Ok(Coordinator::new(
        Arc::new(transport),
        Arc::new(config.snapshot_store()),
        config.coordinator_settings(),
    ))
}

// ── Prompts ──────────────────────────────────────────────────────────

fn prompt_text(
    config: &VeilConfig,
    ui: &SessionUI,
    value: Option<String>,
    prompt: &str,
    flag: &str,
) -> Result<String> {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }
    if config.yes {
        bail!("{} is required when prompts are disabled (--yes)", flag);
    }
    let value = ui.suspend(|| {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact_text()
    })?;
    Ok(value)
}

fn prompt_path(
    config: &VeilConfig,
    ui: &SessionUI,
    value: Option<PathBuf>,
    prompt: &str,
    flag: &str,
) -> Result<PathBuf> {
    match value {
        Some(path) => Ok(path),
        None => prompt_text(config, ui, None, prompt, flag).map(PathBuf::from),
    }
}

fn prompt_amount(config: &VeilConfig, ui: &SessionUI, value: Option<f64>, minimum: f64) -> Result<f64> {
    if let Some(amount) = value {
        return Ok(amount);
    }
    if config.yes {
        bail!("--amount is required when prompts are disabled (--yes)");
    }
    let amount = ui.suspend(|| {
        Input::<f64>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Transaction amount (minimum {})",
                report::format_amount(minimum)
            ))
            .validate_with(|amount: &f64| {
                if amount.is_finite() && *amount >= minimum {
                    Ok(())
                } else {
                    Err(format!("must be at least {}", report::format_amount(minimum)))
                }
            })
            .interact_text()
    })?;
    Ok(amount)
}

/// Ask a yes/no question. Under `--yes` the answer is `assume`.
fn confirm(config: &VeilConfig, ui: &SessionUI, prompt: &str, assume: bool) -> Result<bool> {
    if config.yes {
        return Ok(assume);
    }
    let answer = ui.suspend(|| {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(assume)
            .interact()
    })?;
    Ok(answer)
}

/// Run `fut` unless the user presses Ctrl-C first. The saved session is kept
/// either way.
async fn until_interrupted<F: Future>(ui: &SessionUI, fut: F) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = tokio::signal::ctrl_c() => {
            ui.idle();
            ui.println(format!(
                "{}Detached. Run {} to continue this session",
                WARN,
                style("veil resume").bold()
            ));
            None
        }
    }
}

// ── Protocol steps ───────────────────────────────────────────────────

async fn stage(run: &SessionRun, slot: ArtifactSlot, path: &Path) -> Result<()> {
    let file = StagedFile::from_path(path).await?;
    run.coordinator.stage_file(slot, file)?;
    Ok(())
}

/// Stage both documents, commit the amount and follow through to the result.
async fn drive_commit(config: &VeilConfig, run: &SessionRun, args: CommitArgs) -> Result<()> {
    let bank = prompt_path(config, &run.ui, args.bank, "Bank statement", "--bank")?;
    stage(run, ArtifactSlot::BankStatement, &bank).await?;
    let commitment = prompt_path(
        config,
        &run.ui,
        args.commitment,
        "Commitment letter",
        "--commitment",
    )?;
    stage(run, ArtifactSlot::CommitmentLetter, &commitment).await?;

    let minimum = run.coordinator.settings().minimum_amount;
    let amount = prompt_amount(config, &run.ui, args.amount, minimum)?;

    match run.coordinator.submit_commit(amount).await? {
        CommitOutcome::Revealed(_) => Ok(()),
        CommitOutcome::RevealFailed { message } => {
            tracing::warn!(error = %message, "reveal after commit failed");
            reveal_with_retry(config, run).await
        }
        CommitOutcome::AwaitingPeer => await_result(config, run).await,
    }
}

/// True while a reveal request is outstanding.
fn reveal_pending(coordinator: &Coordinator) -> bool {
    coordinator.session().is_some_and(|s| s.result_revealed)
}

/// Follow the session until the result is shown or the session is lost.
async fn await_result(config: &VeilConfig, run: &SessionRun) -> Result<()> {
    let coordinator = &run.coordinator;
    let mut events = coordinator.subscribe();
    loop {
        match coordinator.phase() {
            Phase::ResultShown => return Ok(()),
            Phase::Invalidated | Phase::RoleUnset => {
                bail!("The session is no longer available on the relay")
            }
            Phase::BothCommitted if !reveal_pending(coordinator) => {
                return reveal_with_retry(config, run).await;
            }
            _ => {}
        }

        match until_interrupted(&run.ui, events.recv()).await {
            None => return Ok(()),
            Some(Ok(_)) | Some(Err(broadcast::error::RecvError::Lagged(_))) => {}
            Some(Err(broadcast::error::RecvError::Closed)) => {
                bail!("Session coordinator stopped unexpectedly")
            }
        }
    }
}

async fn reveal_with_retry(config: &VeilConfig, run: &SessionRun) -> Result<()> {
    loop {
        if !confirm(config, &run.ui, "Reveal failed. Try again?", false)? {
            bail!("Result not revealed yet. Run `veil reveal` to try again");
        }
        match run.coordinator.retry_reveal().await {
            Ok(_) => return Ok(()),
            Err(e @ SessionError::Invalidated) => return Err(e.into()),
            Err(e) if run.coordinator.phase() == Phase::Invalidated => return Err(e.into()),
            Err(e) => tracing::debug!(error = %e, "reveal retry failed"),
        }
    }
}

async fn wait_then_commit(config: &VeilConfig, run: &SessionRun, args: CommitArgs) -> Result<()> {
    let Some(phase) = until_interrupted(
        &run.ui,
        run.coordinator.wait_for_phase(&[Phase::InputReady]),
    )
    .await
    else {
        return Ok(());
    };
    if phase != Phase::InputReady {
        bail!("The session ended before the other company joined");
    }
    drive_commit(config, run, args).await
}

// ── Commands ─────────────────────────────────────────────────────────

pub async fn cmd_create(
    config: &VeilConfig,
    company: Option<String>,
    privacy: PrivacyLevel,
    commit: CommitArgs,
    detach: bool,
) -> Result<()> {
    let run = SessionRun::start(config)?;
    let outcome: Result<()> = async {
        let company = prompt_text(config, &run.ui, company, "Company name", "--company")?;
        let session_id = run.coordinator.create_session(&company, privacy).await?;
        if detach {
            run.ui.println(format!(
                "Run {} once {} has been shared",
                style("veil resume").bold(),
                style(&session_id).cyan()
            ));
            return Ok(());
        }
        wait_then_commit(config, &run, commit).await
    }
    .await;
    run.finish().await;
    outcome
}

pub async fn cmd_join(
    config: &VeilConfig,
    session_id: &str,
    company: Option<String>,
    commit: CommitArgs,
    detach: bool,
) -> Result<()> {
    let run = SessionRun::start(config)?;
    let outcome: Result<()> = async {
        let company = prompt_text(config, &run.ui, company, "Company name", "--company")?;
        run.coordinator.join_session(session_id, &company).await?;
        if detach {
            return Ok(());
        }
        drive_commit(config, &run, commit).await
    }
    .await;
    run.finish().await;
    outcome
}

pub async fn cmd_resume(config: &VeilConfig, commit: CommitArgs) -> Result<()> {
    let run = SessionRun::start(config)?;
    let outcome: Result<()> = async {
        let Some(session) = run.coordinator.validate().await? else {
            bail!("No saved session to resume. Start one with `veil create` or `veil join`");
        };
        tracing::info!(session_id = %session.session_id, phase = %run.coordinator.phase(), "resuming");

        match run.coordinator.phase() {
            Phase::WaitingForPeer => wait_then_commit(config, &run, commit).await,
            Phase::InputReady => drive_commit(config, &run, commit).await,
            Phase::Committed | Phase::BothCommitted => await_result(config, &run).await,
            Phase::ResultShown => Ok(()),
            phase => bail!("Session {} cannot be resumed ({})", session.session_id, phase),
        }
    }
    .await;
    run.finish().await;
    outcome
}

pub async fn cmd_reveal(config: &VeilConfig) -> Result<()> {
    let run = SessionRun::start(config)?;
    let outcome: Result<()> = async {
        if run.coordinator.validate().await?.is_none() {
            bail!("No saved session to reveal");
        }
        match run.coordinator.phase() {
            Phase::ResultShown => Ok(()),
            Phase::BothCommitted if reveal_pending(&run.coordinator) => {
                await_result(config, &run).await
            }
            Phase::BothCommitted => {
                run.coordinator.retry_reveal().await?;
                Ok(())
            }
            Phase::Committed => bail!("The other company has not committed yet"),
            _ => bail!("Nothing to reveal yet. Run `veil resume` to continue the session"),
        }
    }
    .await;
    run.finish().await;
    outcome
}

pub async fn cmd_status(config: &VeilConfig) -> Result<()> {
    let store = config.snapshot_store();
    let Some(snapshot) = store.load()? else {
        println!("No saved session.");
        return Ok(());
    };

    let transport = HttpTransport::new(&config.server_url, config.request_timeout())?;
    let status = match transport.status(&snapshot.session_id).await {
        Ok(status) => Some(status),
        Err(e) => {
            println!("{}Could not query the relay: {}", WARN, e);
            None
        }
    };

    let age_secs = (now_millis() - snapshot.saved_at_epoch_millis) / 1000;
    print!("{}", report::format_status(&snapshot, age_secs, status.as_ref()));
    Ok(())
}

pub fn cmd_reset(config: &VeilConfig, force: bool) -> Result<()> {
    let store = config.snapshot_store();
    let Some(snapshot) = store.load()? else {
        println!("No saved session.");
        return Ok(());
    };

    if !force {
        let prompt = format!("Forget session {}?", snapshot.session_id);
        if !confirm(config, &SessionUI::hidden(), &prompt, true)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    build_coordinator(config)?.reset()?;
    println!("{}Reset complete", CHECK);
    Ok(())
}
