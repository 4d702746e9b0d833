use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::coordinator::{CoordinatorEvent, Notice, NoticeLevel, Phase};
use crate::ui::icons::{CHECK, CLOCK, CROSS, HANDSHAKE, INFO, LOCK, UPLOAD, WARN};
use crate::ui::report;

/// Terminal renderer for coordinator events.
///
/// One spinner line shows what the session is waiting on; notices and
/// milestones are printed above it so the spinner stays at the bottom.
#[derive(Clone)]
pub struct SessionUI {
    spinner: ProgressBar,
}

impl Default for SessionUI {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionUI {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .expect("progress bar template is a valid static string"),
        );
        Self { spinner }
    }

    /// A renderer that draws nothing, for non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
        }
    }

    pub fn wait(&self, message: impl Into<String>) {
        self.spinner.set_message(message.into());
        self.spinner.enable_steady_tick(Duration::from_millis(120));
    }

    pub fn idle(&self) {
        self.spinner.disable_steady_tick();
        self.spinner.set_message("");
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    /// Hide the spinner while `f` runs, e.g. for an interactive prompt.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.spinner.suspend(f)
    }

    pub fn println(&self, line: impl AsRef<str>) {
        if self.spinner.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.spinner.println(line.as_ref());
        }
    }

    pub fn notice(&self, notice: &Notice) {
        let line = match notice.level {
            NoticeLevel::Info => format!("{}{}", INFO, notice.message),
            NoticeLevel::Success => format!("{}{}", CHECK, style(&notice.message).green()),
            NoticeLevel::Warning => format!("{}{}", WARN, style(&notice.message).yellow()),
            NoticeLevel::Error => format!("{}{}", CROSS, style(&notice.message).red()),
        };
        self.println(line);
    }

    pub fn render(&self, event: &CoordinatorEvent) {
        match event {
            CoordinatorEvent::PhaseChanged { to, .. } => match to {
                Phase::Creating => self.wait("Creating session..."),
                Phase::Joining => self.wait("Joining session..."),
                Phase::WaitingForPeer => self.wait("Waiting for the other company to join"),
                Phase::Committed => self.wait("Waiting for the other company to commit"),
                Phase::BothCommitted => self.wait("Revealing result..."),
                Phase::InputReady | Phase::ResultShown | Phase::Invalidated | Phase::RoleUnset => {
                    self.idle()
                }
            },
            CoordinatorEvent::SessionCreated { session_id } => {
                self.println(format!(
                    "{}Share this session id with the other company: {}",
                    HANDSHAKE,
                    style(session_id).cyan().bold()
                ));
            }
            CoordinatorEvent::SessionJoined {
                session_id,
                initiator_name,
            } => {
                let who = initiator_name
                    .as_deref()
                    .map(|name| format!(" with {}", style(name).bold()))
                    .unwrap_or_default();
                self.println(format!(
                    "{}Joined session {}{}",
                    HANDSHAKE,
                    style(session_id).cyan(),
                    who
                ));
            }
            CoordinatorEvent::SessionResumed { .. } => {}
            CoordinatorEvent::PeerStatus {
                peer_committed,
                self_committed,
                ..
            } => {
                if *peer_committed && !*self_committed {
                    self.println(format!(
                        "{}The other company is waiting for your commitment",
                        CLOCK
                    ));
                }
            }
            CoordinatorEvent::FilesUploaded => {
                self.println(format!("{}Documents uploaded", UPLOAD));
            }
            CoordinatorEvent::Committed { level_info } => {
                if let Some(level) = level_info {
                    self.println(format!(
                        "{}Your tier: {} ({})",
                        LOCK,
                        style(&level.name).cyan().bold(),
                        level.description
                    ));
                }
            }
            CoordinatorEvent::RevealStarted => self.wait("Revealing result..."),
            CoordinatorEvent::ResultReady(result) => {
                self.idle();
                self.println(report::format_result(result).trim_end());
            }
            CoordinatorEvent::Invalidated { .. } => self.idle(),
            CoordinatorEvent::Notice(notice) => self.notice(notice),
        }
    }

    /// Render events until the channel closes or the task is aborted.
    pub fn spawn(self, mut events: broadcast::Receiver<CoordinatorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.render(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "renderer lagged behind events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            self.finish();
        })
    }
}
