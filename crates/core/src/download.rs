use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use chrono::{Local, NaiveDate};
use regex::Regex;

use crate::error::GenerationError;
use crate::logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub kind: MediaKind,
    pub url: String,
    pub filename: String,
}

/// Accepts download requests. Must not block on the transfer itself.
pub trait Downloader: Send {
    fn request(&mut self, req: DownloadRequest) -> Result<()>;
}

fn forbidden_chars() -> &'static Regex {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    FORBIDDEN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("literal pattern"))
}

/// Replace characters no common filesystem accepts.
pub fn sanitize_filename(name: &str) -> String {
    forbidden_chars().replace_all(name, "_").into_owned()
}

/// `<prefix>-<millis>-<n>.jpg` or `<prefix>-video-<millis>-<n>.mp4`.
pub fn media_filename(prefix: &str, kind: MediaKind, stamp_millis: i64, n: usize) -> String {
    match kind {
        MediaKind::Image => format!("{}-{}-{}.jpg", prefix, stamp_millis, n),
        MediaKind::Video => format!("{}-video-{}-{}.mp4", prefix, stamp_millis, n),
    }
}

/// `<folder>/<YYYY-MM-DD>/<sanitized filename>`
pub fn dated_path(folder: &str, date: NaiveDate, filename: &str) -> PathBuf {
    PathBuf::from(folder)
        .join(date.format("%Y-%m-%d").to_string())
        .join(sanitize_filename(filename))
}

/// `path` if free, else `name (1).ext`, `name (2).ext`, ...
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1..)
        .map(|i| {
            let name = match &ext {
                Some(ext) => format!("{} ({}).{}", stem, i, ext),
                None => format!("{} ({})", stem, i),
            };
            path.with_file_name(name)
        })
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Decode a base64 `data:` URL into (mime, bytes).
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload).ok()?;
    let mime = if mime.is_empty() { "text/plain" } else { mime };
    Some((mime.to_string(), bytes))
}

fn fetch(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    if url.starts_with("data:") {
        return decode_data_url(url)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| anyhow!("malformed data URL"));
    }
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("fetch failed: {}", status));
    }
    Ok(response.bytes()?.to_vec())
}

fn store(root: &Path, folder: &str, req: &DownloadRequest, bytes: &[u8]) -> Result<PathBuf> {
    let target = unique_path(&root.join(dated_path(folder, Local::now().date_naive(), &req.filename)));
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&target, bytes).with_context(|| format!("writing {}", target.display()))?;
    Ok(target)
}

/// Background worker that fetches and writes downloads one at a time.
pub struct FileDownloader {
    tx: Option<mpsc::Sender<DownloadRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl FileDownloader {
    pub fn spawn(root: PathBuf, folder: String) -> Result<Self> {
        logger::register_prefix("download", logger::COLOR_MAGENTA);
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("building http client")?;
        let (tx, rx) = mpsc::channel::<DownloadRequest>();

        let worker = thread::spawn(move || {
            for req in rx {
                let result = fetch(&client, &req.url).and_then(|bytes| store(&root, &folder, &req, &bytes));
                match result {
                    Ok(path) => logger::info_p("download", &format!("saved {}", path.display())),
                    Err(e) => {
                        let err = GenerationError::DownloadFailed { url: req.url.clone(), reason: format!("{:#}", e) };
                        logger::error_p("download", &err.to_string());
                    }
                }
            }
        });

        Ok(Self { tx: Some(tx), worker: Some(worker) })
    }

    /// Stop accepting requests and wait for queued ones to finish.
    pub fn shutdown(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

impl Drop for FileDownloader {
    fn drop(&mut self) {
        self.finish();
    }
}

impl Downloader for FileDownloader {
    fn request(&mut self, req: DownloadRequest) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("downloader shut down"))?;
        tx.send(req).map_err(|_| anyhow!("download worker exited"))
    }
}

/// Logs what would be downloaded. Used against the simulated page.
pub struct DryRunDownloader {
    pub folder: String,
}

impl Downloader for DryRunDownloader {
    fn request(&mut self, req: DownloadRequest) -> Result<()> {
        let path = dated_path(&self.folder, Local::now().date_naive(), &req.filename);
        logger::info_p("download", &format!("(dry run) {} -> {}", req.url, path.display()));
        Ok(())
    }
}
