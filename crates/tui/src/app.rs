use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

use genbatch_core::logger;
use genbatch_core::orchestrator::Controller;
use genbatch_core::queue::{build_queue, load_prompts};
use genbatch_core::settings::Settings;
use genbatch_core::types::{BatchRequest, Command, CompletionReason, Notification, PromptItem, Response};

use crate::confirm::ConfirmDialog;

/// Most the delay can be raised to from the keyboard.
const MAX_DELAY_SECS: u64 = 60;

pub struct App {
    pub queue: Arc<Mutex<Vec<PromptItem>>>,
    pub controller: Controller,
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub prompts_path: Option<PathBuf>,
    pub reference_image: Option<Vec<u8>>,
    pub last_outcome: Option<CompletionReason>,
    pub confirm: Option<ConfirmDialog>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub events_rx: mpsc::Receiver<Notification>,
    pub should_quit: bool,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Mutex<Vec<PromptItem>>>,
        controller: Controller,
        settings: Settings,
        settings_path: PathBuf,
        prompts_path: Option<PathBuf>,
        reference_image: Option<Vec<u8>>,
        log_rx: mpsc::Receiver<String>,
        events_rx: mpsc::Receiver<Notification>,
    ) -> Self {
        Self {
            queue,
            controller,
            settings,
            settings_path,
            prompts_path,
            reference_image,
            last_outcome: None,
            confirm: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            events_rx,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    /// Apply orchestrator notifications. Queue statuses are read straight
    /// from the shared queue, so only completion needs handling here.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                Notification::GenerationComplete { reason } => self.last_outcome = Some(reason),
                Notification::Error { message } => logger::error(&format!("generation failed: {}", message)),
                Notification::UpdateQueue { .. } => {}
            }
        }
    }

    pub fn is_processing(&self) -> bool {
        self.controller.is_processing()
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Re-read the prompts file into a fresh queue.
    pub fn reload_prompts(&mut self) {
        if self.is_processing() {
            logger::warn("cannot reload prompts while generating");
            return;
        }
        let Some(path) = &self.prompts_path else {
            logger::warn("no prompts file given (--prompts)");
            return;
        };
        match load_prompts(path) {
            Ok(prompts) => {
                let items = build_queue(&prompts);
                logger::info(&format!("loaded {} prompt(s) from {}", items.len(), path.display()));
                *self.queue.lock().unwrap_or_else(|e| e.into_inner()) = items;
            }
            Err(e) => logger::error(&format!("{:#}", e)),
        }
    }

    pub fn start(&mut self) {
        if self.controller.dispatch(Command::Ping) != Response::Ok {
            logger::error("orchestrator is not responding, restart genbatch");
            return;
        }
        let prompts: Vec<String> = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.iter().map(|i| i.text.clone()).collect()
        };
        if prompts.is_empty() {
            logger::warn("no prompts to generate, press r to load");
            return;
        }

        let req = BatchRequest {
            mode: self.settings.mode,
            aspect_ratio: self.settings.aspect_ratio.clone(),
            auto_download: self.settings.auto_download,
            delay_seconds: self.settings.delay_seconds,
            reference_image: self.reference_image.clone(),
            prompts: build_queue(&prompts),
        };
        if self.controller.dispatch(Command::StartGeneration(req)) == Response::Started {
            self.last_outcome = None;
        }
    }

    pub fn stop(&mut self) {
        if self.is_processing() {
            self.controller.dispatch(Command::StopGeneration);
        }
    }

    /// Empty the queue and the log panel.
    pub fn clear(&mut self) {
        if self.is_processing() {
            logger::warn("cannot clear while generating");
            return;
        }
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.log_messages.clear();
        self.log_scroll = 0;
        self.last_outcome = None;
    }

    fn save_settings(&self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            logger::error(&format!("saving settings: {:#}", e));
        }
    }

    pub fn toggle_mode(&mut self) {
        self.settings.mode = self.settings.mode.toggled();
        logger::info(&format!("mode: {}", self.settings.mode));
        self.save_settings();
    }

    pub fn cycle_ratio(&mut self) {
        self.settings.aspect_ratio = self.settings.aspect_ratio.cycled();
        logger::info(&format!("aspect ratio: {}", self.settings.aspect_ratio));
        self.save_settings();
    }

    pub fn toggle_auto_download(&mut self) {
        self.settings.auto_download = !self.settings.auto_download;
        logger::info(&format!("auto download: {}", if self.settings.auto_download { "on" } else { "off" }));
        self.save_settings();
    }

    pub fn adjust_delay(&mut self, delta: i64) {
        let next = (self.settings.delay_seconds as i64 + delta).clamp(0, MAX_DELAY_SECS as i64) as u64;
        if next != self.settings.delay_seconds {
            self.settings.delay_seconds = next;
            self.save_settings();
        }
    }

    /// Quit, asking first if a batch is still running.
    pub fn request_quit(&mut self) {
        if self.is_processing() {
            self.confirm = Some(ConfirmDialog::new("Generation running. Quit anyway?"));
        } else {
            self.quit();
        }
    }

    pub fn quit(&mut self) {
        self.confirm = None;
        self.controller.dispatch(Command::Quit);
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genbatch_core::orchestrator::Orchestrator;
    use genbatch_core::page::stub::StubPage;
    use genbatch_core::download::DryRunDownloader;
    use genbatch_core::settings::HostProfile;
    use genbatch_core::sleep::ManualClock;
    use genbatch_core::types::{AspectRatio, GenerationMode};

    fn app(dir: &std::path::Path) -> (App, mpsc::Receiver<Command>) {
        let (notify_tx, events_rx) = mpsc::channel();
        let orch = Orchestrator::new(
            Box::new(StubPage::demo()),
            Box::new(DryRunDownloader { folder: "Out".into() }),
            Arc::new(ManualClock::new()),
            HostProfile::default(),
            notify_tx,
        );
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (_log_tx, log_rx) = mpsc::channel();
        let app = App::new(
            orch.queue(),
            orch.controller(cmd_tx),
            Settings::default(),
            dir.join("settings.json"),
            Some(dir.join("prompts.txt")),
            None,
            log_rx,
            events_rx,
        );
        (app, cmd_rx)
    }

    #[test]
    fn test_settings_changes_persist() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _cmd_rx) = app(dir.path());

        app.toggle_mode();
        app.cycle_ratio();
        app.adjust_delay(-10);

        let saved = Settings::load(&app.settings_path).unwrap();
        assert_eq!(saved.mode, GenerationMode::Video);
        assert_eq!(saved.aspect_ratio, AspectRatio::new("1:1"));
        assert_eq!(saved.delay_seconds, 0);
    }

    #[test]
    fn test_start_sends_loaded_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prompts.txt"), "a fox\n\na crow\n").unwrap();
        let (mut app, cmd_rx) = app(dir.path());

        app.start();
        assert!(matches!(cmd_rx.try_recv(), Ok(Command::Ping)));
        assert!(cmd_rx.try_recv().is_err());

        app.reload_prompts();
        app.start();
        assert!(matches!(cmd_rx.try_recv(), Ok(Command::Ping)));
        match cmd_rx.try_recv() {
            Ok(Command::StartGeneration(req)) => {
                let texts: Vec<&str> = req.prompts.iter().map(|p| p.text.as_str()).collect();
                assert_eq!(texts, vec!["a fox", "a crow"]);
            }
            other => panic!("expected start, got {:?}", other),
        }
        assert!(app.is_processing());
    }

    #[test]
    fn test_clear_empties_queue_and_log() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prompts.txt"), "a fox\n\na crow\n").unwrap();
        let (mut app, _cmd_rx) = app(dir.path());
        app.reload_prompts();
        app.log_messages.push("old line".into());
        app.log_scroll = 4;

        app.clear();

        assert!(app.queue.lock().unwrap().is_empty());
        assert!(app.log_messages.is_empty());
        assert_eq!(app.log_scroll, 0);
    }

    #[test]
    fn test_start_refuses_when_orchestrator_gone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prompts.txt"), "a fox\n").unwrap();
        let (mut app, cmd_rx) = app(dir.path());
        app.reload_prompts();
        drop(cmd_rx);

        app.start();

        assert!(!app.is_processing());
    }
}
