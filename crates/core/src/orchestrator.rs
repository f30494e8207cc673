use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;

use crate::configure::{set_aspect_ratio, set_mode};
use crate::download::{media_filename, DownloadRequest, Downloader, MediaKind};
use crate::error::GenerationError;
use crate::logger;
use crate::page::HostPage;
use crate::poller::{wait_for_new_media, PollConfig};
use crate::settings::HostProfile;
use crate::sleep::{sleep_cancellable, sleep_ms, CancelToken, Clock};
use crate::snapshot::Snapshotter;
use crate::submit::{enter_prompt, Submitter};
use crate::types::*;

/// How one prompt ended, when it did not fail
enum ItemOutcome {
    Done,
    Cancelled,
}

/// Move `state` from Idle to ConfiguringMode. False if a batch is in flight.
fn claim(state: &Mutex<OrchestratorState>) -> bool {
    let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
    if !s.is_idle() {
        return false;
    }
    *s = OrchestratorState::ConfiguringMode;
    true
}

fn is_config_miss(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<GenerationError>(), Some(GenerationError::ConfigurationNotFound { .. }))
}

/// Drives batches of prompts through the host page, one at a time.
pub struct Orchestrator {
    page: Box<dyn HostPage>,
    downloader: Box<dyn Downloader>,
    clock: Arc<dyn Clock>,
    profile: HostProfile,
    submitter: Submitter,
    queue: Arc<Mutex<Vec<PromptItem>>>,
    state: Arc<Mutex<OrchestratorState>>,
    cancel: CancelToken,
    notify: mpsc::Sender<Notification>,
}

impl Orchestrator {
    pub fn new(
        page: Box<dyn HostPage>,
        downloader: Box<dyn Downloader>,
        clock: Arc<dyn Clock>,
        profile: HostProfile,
        notify: mpsc::Sender<Notification>,
    ) -> Self {
        let submitter = Submitter::from_profile(&profile);
        Self {
            page,
            downloader,
            clock,
            profile,
            submitter,
            queue: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(OrchestratorState::Idle)),
            cancel: CancelToken::new(),
            notify,
        }
    }

    /// Queue shared with the UI for display.
    pub fn queue(&self) -> Arc<Mutex<Vec<PromptItem>>> {
        Arc::clone(&self.queue)
    }

    pub fn state(&self) -> Arc<Mutex<OrchestratorState>> {
        Arc::clone(&self.state)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Handle for the UI side; commands go out on `cmd_tx`.
    pub fn controller(&self, cmd_tx: mpsc::Sender<Command>) -> Controller {
        Controller {
            cmd_tx,
            state: self.state(),
            cancel: self.cancel_token(),
        }
    }

    fn emit(&self, n: Notification) {
        self.notify.send(n).ok();
    }

    fn set_state(&self, s: OrchestratorState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = s;
    }

    fn set_status(&self, prompt_id: u64, status: PromptStatus) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(item) = queue.iter_mut().find(|i| i.id == prompt_id) {
                item.status = status;
            }
        }
        self.emit(Notification::UpdateQueue { prompt_id, status });
    }

    /// Run a whole batch. `None` if another batch is already in flight.
    pub fn run_batch(&mut self, req: BatchRequest) -> Option<CompletionReason> {
        if !claim(&self.state) {
            logger::error("already processing");
            return None;
        }
        self.cancel.reset();
        Some(self.run_claimed(req))
    }

    /// Run a batch whose slot was already claimed by a `Controller`.
    fn run_claimed(&mut self, req: BatchRequest) -> CompletionReason {
        *self.queue.lock().unwrap_or_else(|e| e.into_inner()) = req.prompts.clone();
        logger::info(&format!("starting generation of {} prompt(s)...", req.prompts.len()));
        if let Some(image) = &req.reference_image {
            logger::info(&format!("reference image attached ({} bytes)", image.len()));
        }

        let reason = match self.configure(&req) {
            Ok(()) => self.process_queue(&req),
            Err(e) => {
                let message = format!("fatal error: {:#}", e);
                logger::error(&message);
                self.emit(Notification::Error { message });
                CompletionReason::Failed
            }
        };

        self.set_state(OrchestratorState::Idle);
        match reason {
            CompletionReason::Finished => logger::success("all prompts completed"),
            CompletionReason::Stopped => logger::info("generation stopped"),
            CompletionReason::Failed => {}
        }
        self.emit(Notification::GenerationComplete { reason });
        reason
    }

    /// Mode, then ratio for images. A missing control is only a warning.
    fn configure(&mut self, req: &BatchRequest) -> Result<()> {
        let clock = self.clock.as_ref();

        self.set_state(OrchestratorState::ConfiguringMode);
        match set_mode(self.page.as_mut(), &self.profile, clock, req.mode) {
            Err(e) if is_config_miss(&e) => logger::warn(&format!("{}, using page default", e)),
            other => other?,
        }
        sleep_ms(clock, 500);

        if req.mode == GenerationMode::Image {
            self.set_state(OrchestratorState::ConfiguringRatio);
            match set_aspect_ratio(self.page.as_mut(), &self.profile, clock, &req.aspect_ratio) {
                Err(e) if is_config_miss(&e) => logger::warn(&format!("{}, using page default", e)),
                other => other?,
            }
            sleep_ms(clock, 500);
        }
        Ok(())
    }

    fn process_queue(&mut self, req: &BatchRequest) -> CompletionReason {
        let total = req.prompts.len();
        for (i, item) in req.prompts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return CompletionReason::Stopped;
            }

            match self.process_item(req, item) {
                Ok(ItemOutcome::Done) => {}
                Ok(ItemOutcome::Cancelled) => {
                    logger::info("generation stopped during wait");
                    self.set_status(item.id, PromptStatus::Pending);
                    return CompletionReason::Stopped;
                }
                Err(e) => {
                    logger::error(&format!("error on \"{}\": {:#}", item.preview(50), e));
                    self.set_status(item.id, PromptStatus::Error);
                }
            }

            if i + 1 < total && !self.cancel.is_cancelled() {
                logger::info(&format!("waiting {}s before next prompt...", req.delay_seconds));
                let delay = Duration::from_secs(req.delay_seconds);
                if !sleep_cancellable(self.clock.as_ref(), delay, &self.cancel) {
                    return CompletionReason::Stopped;
                }
            }
        }

        if self.cancel.is_cancelled() {
            CompletionReason::Stopped
        } else {
            CompletionReason::Finished
        }
    }

    fn process_item(&mut self, req: &BatchRequest, item: &PromptItem) -> Result<ItemOutcome> {
        self.set_status(item.id, PromptStatus::Generating);
        logger::info(&format!("generating: {}", item.preview(50)));

        self.set_state(OrchestratorState::EnteringPrompt);
        enter_prompt(self.page.as_mut(), &self.profile, self.clock.as_ref(), &item.text)?;
        sleep_ms(self.clock.as_ref(), 500);

        let baseline = Snapshotter::new(self.page.as_mut(), &self.profile).baseline(req.mode)?;
        logger::info(&format!("{} before: {}", req.mode, baseline.len()));

        self.set_state(OrchestratorState::Submitting);
        self.submitter.submit(self.page.as_mut(), &self.profile, self.clock.as_ref(), &item.text)?;

        self.set_state(OrchestratorState::Polling);
        let config = PollConfig::from_profile(&self.profile, req.mode);
        let outcome = {
            let mut probe = Snapshotter::new(self.page.as_mut(), &self.profile);
            wait_for_new_media(&mut probe, &baseline, &config, self.clock.as_ref(), &self.cancel)?
        };

        let urls = match outcome {
            PollOutcome::Stable(urls) | PollOutcome::Partial(urls) => urls,
            PollOutcome::Cancelled => return Ok(ItemOutcome::Cancelled),
        };

        if req.auto_download && !urls.is_empty() {
            self.set_status(item.id, PromptStatus::Downloading);
            self.set_state(OrchestratorState::Downloading);
            self.download(req.mode, &urls);
        }

        self.set_status(item.id, PromptStatus::Completed);
        logger::success(&format!("completed: {}", item.preview(50)));
        Ok(ItemOutcome::Done)
    }

    /// Hand every URL to the downloader. Failures are logged, never fatal.
    fn download(&mut self, mode: GenerationMode, urls: &[String]) {
        let (kind, noun, pause) = match mode {
            GenerationMode::Image => (MediaKind::Image, "image", Duration::from_millis(500)),
            GenerationMode::Video => (MediaKind::Video, "video", Duration::from_millis(1000)),
        };
        logger::info(&format!("downloading {} new {}(s)...", urls.len(), noun));

        let mut sent = 0;
        for (i, url) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            logger::info(&format!("downloading {} {}/{}", noun, i + 1, urls.len()));
            let req = DownloadRequest {
                kind,
                url: url.clone(),
                filename: media_filename(&self.profile.file_prefix, kind, Local::now().timestamp_millis(), i + 1),
            };
            match self.downloader.request(req) {
                Ok(()) => sent += 1,
                Err(e) => {
                    let err = GenerationError::DownloadFailed { url: url.clone(), reason: e.to_string() };
                    logger::error(&err.to_string());
                }
            }
            sleep_cancellable(self.clock.as_ref(), pause, &self.cancel);
        }

        logger::success(&format!("requested {}/{} {} download(s)", sent, urls.len(), noun));
    }
}

/// UI-side handle: answers commands immediately, forwards work to the
/// orchestrator thread.
#[derive(Clone)]
pub struct Controller {
    cmd_tx: mpsc::Sender<Command>,
    state: Arc<Mutex<OrchestratorState>>,
    cancel: CancelToken,
}

impl Controller {
    pub fn dispatch(&self, cmd: Command) -> Response {
        match cmd {
            Command::Ping => match self.cmd_tx.send(Command::Ping) {
                Ok(()) => Response::Ok,
                Err(_) => Response::Unreachable,
            },
            Command::StopGeneration => {
                self.cancel.cancel();
                logger::info("generation stopped by user");
                Response::Stopped
            }
            Command::StartGeneration(req) => {
                if !claim(&self.state) {
                    logger::error("already processing");
                    return Response::Busy;
                }
                self.cancel.reset();
                if self.cmd_tx.send(Command::StartGeneration(req)).is_err() {
                    logger::error("orchestrator is not running");
                    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = OrchestratorState::Idle;
                    return Response::Busy;
                }
                Response::Started
            }
            Command::Quit => {
                self.cancel.cancel();
                self.cmd_tx.send(Command::Quit).ok();
                Response::Ok
            }
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_processing(&self) -> bool {
        !self.state().is_idle()
    }
}

/// Orchestrator thread body. Returns on `Quit` or when every sender is gone.
pub fn orchestrate(mut orch: Orchestrator, cmd_rx: mpsc::Receiver<Command>) {
    for cmd in cmd_rx {
        match cmd {
            Command::StartGeneration(req) => {
                orch.run_claimed(req);
            }
            Command::Quit => {
                logger::info("shutting down");
                return;
            }
            // Answered by the controller
            Command::Ping | Command::StopGeneration => {}
        }
    }
}
