use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use genbatch_core::download::{DownloadRequest, Downloader};
use genbatch_core::orchestrator::Orchestrator;
use genbatch_core::page::stub::{Generation, MediaStep, StubDom, StubPage};
use genbatch_core::settings::HostProfile;
use genbatch_core::sleep::{CancelToken, Clock, ManualClock};
use genbatch_core::types::{
    AspectRatio, BatchRequest, GenerationMode, Notification, PromptItem, PromptStatus,
};

/// Records every request. Optionally sets a cancel token after the Nth one,
/// the way a user pressing stop mid-download would.
#[derive(Clone, Default)]
pub struct RecordingDownloader {
    pub requests: Arc<Mutex<Vec<DownloadRequest>>>,
    trip: Arc<Mutex<Option<(usize, CancelToken)>>>,
}

impl Downloader for RecordingDownloader {
    fn request(&mut self, req: DownloadRequest) -> Result<()> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(req);
            requests.len()
        };
        if let Some((n, token)) = self.trip.lock().unwrap().as_ref() {
            if count == *n {
                token.cancel();
            }
        }
        Ok(())
    }
}

/// Virtual clock that sets a cancel token once enough time has passed.
pub struct TrippingClock {
    inner: ManualClock,
    at: Duration,
    token: Mutex<Option<CancelToken>>,
}

impl TrippingClock {
    pub fn new(at: Duration) -> Self {
        Self { inner: ManualClock::new(), at, token: Mutex::new(None) }
    }

    pub fn arm(&self, token: CancelToken) {
        *self.token.lock().unwrap() = Some(token);
    }
}

impl Clock for TrippingClock {
    fn elapsed(&self) -> Duration {
        self.inner.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.inner.sleep(d);
        if self.inner.elapsed() >= self.at {
            if let Some(token) = self.token.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
    }
}

/// An orchestrator wired to a stub page, a recording downloader, and a
/// virtual clock.
pub struct Harness {
    pub orch: Orchestrator,
    pub page: StubPage,
    pub downloads: RecordingDownloader,
    pub events: mpsc::Receiver<Notification>,
    pub clock: Arc<dyn Clock>,
}

impl Harness {
    pub fn new(dom: StubDom) -> Self {
        Self::with_clock(dom, Arc::new(ManualClock::new()))
    }

    pub fn with_clock(dom: StubDom, clock: Arc<dyn Clock>) -> Self {
        let page = StubPage::new(dom);
        let downloads = RecordingDownloader::default();
        let (tx, events) = mpsc::channel();
        let orch = Orchestrator::new(
            Box::new(page.clone()),
            Box::new(downloads.clone()),
            Arc::clone(&clock),
            HostProfile::default(),
            tx,
        );
        Self { orch, page, downloads, events, clock }
    }

    /// Press stop right after the `n`th download request.
    pub fn stop_after_downloads(&self, n: usize) {
        *self.downloads.trip.lock().unwrap() = Some((n, self.orch.cancel_token()));
    }

    pub fn download_urls(&self) -> Vec<String> {
        self.downloads.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.events.try_iter().collect()
    }
}

/// The host page as it usually looks: mode and ratio dropdowns, a send
/// button, an avatar and some earlier generations.
pub fn host_dom() -> StubDom {
    let mut dom = StubDom::default();
    dom.add_dropdown("Image", &["Image", "Video"]);
    dom.add_dropdown("9:16", &["9:16", "1:1", "16:9"]);
    dom.add_send_button();
    dom.add_image(&cdn("avatar.jpg"), 40);
    for n in 1..=4 {
        dom.add_image(&cdn(&format!("history-{}.jpg", n)), 512);
    }
    dom
}

pub fn cdn(name: &str) -> String {
    format!("https://scontent.test.fbcdn.net/v/{}", name)
}

/// Four images arriving two at a time after a blank read.
pub fn image_generation(tag: &str) -> Generation {
    let urls: Vec<String> = (1..=4).map(|n| cdn(&format!("{}-{}.jpg", tag, n))).collect();
    vec![MediaStep::none(), MediaStep::images(&urls[..2]), MediaStep::images(&urls[2..])]
}

pub fn video_generation(tag: &str) -> Generation {
    vec![MediaStep::none(), MediaStep::none(), MediaStep::videos(&[cdn(&format!("{}.mp4", tag))])]
}

pub fn batch(mode: GenerationMode, ratio: &str, texts: &[&str]) -> BatchRequest {
    BatchRequest {
        mode,
        aspect_ratio: AspectRatio::new(ratio),
        auto_download: true,
        delay_seconds: 3,
        reference_image: None,
        prompts: texts
            .iter()
            .enumerate()
            .map(|(i, t)| PromptItem::new(i as u64 + 1, *t))
            .collect(),
    }
}

/// Status updates for one prompt, in order.
pub fn statuses(events: &[Notification], id: u64) -> Vec<PromptStatus> {
    events
        .iter()
        .filter_map(|n| match n {
            Notification::UpdateQueue { prompt_id, status } if *prompt_id == id => Some(*status),
            _ => None,
        })
        .collect()
}
