use std::collections::HashSet;

use anyhow::Result;

use crate::page::{HostPage, VideoInfo};
use crate::settings::HostProfile;
use crate::types::{GenerationMode, MediaBaseline};

/// Source of media readings. The poller only talks to this.
pub trait MediaProbe {
    /// Generated image URLs in document order, de-duplicated.
    fn image_urls(&mut self) -> Result<Vec<String>>;
    /// Number of full-size videos.
    fn video_count(&mut self) -> Result<usize>;
    /// Playable sources of full-size videos in document order (newest first).
    fn video_urls(&mut self) -> Result<Vec<String>>;
}

/// Takes snapshots of a live page using the profile's filters.
pub struct Snapshotter<'a> {
    page: &'a mut dyn HostPage,
    profile: &'a HostProfile,
}

impl<'a> Snapshotter<'a> {
    pub fn new(page: &'a mut dyn HostPage, profile: &'a HostProfile) -> Self {
        Self { page, profile }
    }

    pub fn baseline(&mut self, mode: GenerationMode) -> Result<MediaBaseline> {
        Ok(match mode {
            GenerationMode::Image => MediaBaseline::Images(self.image_urls()?.into_iter().collect()),
            GenerationMode::Video => MediaBaseline::Videos(self.video_count()?),
        })
    }
}

impl MediaProbe for Snapshotter<'_> {
    fn image_urls(&mut self) -> Result<Vec<String>> {
        let min = self.profile.min_image_width;
        let mut seen = HashSet::new();
        let urls = self
            .page
            .images()?
            .into_iter()
            .filter(|img| !img.src.is_empty() && img.src.contains(&self.profile.content_origin))
            .filter(|img| img.width > min || img.natural_width > min)
            .map(|img| img.src)
            .filter(|src| seen.insert(src.clone()))
            .collect();
        Ok(urls)
    }

    fn video_count(&mut self) -> Result<usize> {
        let min = self.profile.min_video_size;
        Ok(self.page.videos()?.iter().filter(|v| is_full_size(v, min)).count())
    }

    fn video_urls(&mut self) -> Result<Vec<String>> {
        let min = self.profile.min_video_size;
        let urls = self
            .page
            .videos()?
            .iter()
            .filter_map(|v| playable_source(v).filter(|_| is_full_size(v, min)))
            .collect();
        Ok(urls)
    }
}

fn first_nonzero(values: [u32; 3]) -> u32 {
    values.into_iter().find(|v| *v > 0).unwrap_or(0)
}

/// Intrinsic size if known, otherwise rendered size.
fn is_full_size(v: &VideoInfo, min: u32) -> bool {
    let width = first_nonzero([v.video_width, v.client_width, v.offset_width]);
    let height = first_nonzero([v.video_height, v.client_height, v.offset_height]);
    width > min || height > min
}

/// `src`, then `currentSrc`, then the first nested `<source>`.
fn playable_source(v: &VideoInfo) -> Option<String> {
    [Some(&v.src), Some(&v.current_src), v.source_src.as_ref()]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
}

/// Image URLs present now but not in the baseline, in document order.
pub fn image_delta(current: &[String], baseline: &HashSet<String>) -> Vec<String> {
    current.iter().filter(|u| !baseline.contains(*u)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::stub::{StubDom, StubPage};
    use crate::page::VideoInfo;

    fn page_with_media() -> StubPage {
        let mut dom = StubDom::default();
        dom.add_image("https://x.fbcdn.net/a.jpg", 512);
        dom.add_image("https://x.fbcdn.net/a.jpg", 512);
        dom.add_image("https://x.fbcdn.net/avatar.jpg", 40);
        dom.add_image("https://elsewhere.com/b.jpg", 512);
        dom.add_image("https://x.fbcdn.net/c.jpg", 151);
        dom.prepend_video("https://x.fbcdn.net/v1.mp4");
        dom.videos.push(VideoInfo {
            src: String::new(),
            current_src: String::new(),
            source_src: Some("https://x.fbcdn.net/v0.mp4".into()),
            client_width: 320,
            ..VideoInfo::default()
        });
        dom.videos.push(VideoInfo {
            src: "https://x.fbcdn.net/icon.mp4".into(),
            client_width: 48,
            client_height: 48,
            ..VideoInfo::default()
        });
        StubPage::new(dom)
    }

    #[test]
    fn test_image_snapshot_filters_origin_size_and_duplicates() {
        let mut page = page_with_media();
        let profile = HostProfile::default();
        let urls = Snapshotter::new(&mut page, &profile).image_urls().unwrap();
        assert_eq!(urls, vec!["https://x.fbcdn.net/a.jpg", "https://x.fbcdn.net/c.jpg"]);
    }

    #[test]
    fn test_video_snapshot_counts_and_resolves_sources() {
        let mut page = page_with_media();
        let profile = HostProfile::default();
        let mut snap = Snapshotter::new(&mut page, &profile);
        assert_eq!(snap.video_count().unwrap(), 2);
        assert_eq!(
            snap.video_urls().unwrap(),
            vec!["https://x.fbcdn.net/v1.mp4", "https://x.fbcdn.net/v0.mp4"]
        );
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut page = page_with_media();
        let profile = HostProfile::default();
        let mut snap = Snapshotter::new(&mut page, &profile);
        assert_eq!(snap.image_urls().unwrap(), snap.image_urls().unwrap());
        assert_eq!(snap.video_count().unwrap(), snap.video_count().unwrap());
    }

    #[test]
    fn test_empty_page() {
        let mut page = StubPage::new(StubDom::default());
        let profile = HostProfile::default();
        let mut snap = Snapshotter::new(&mut page, &profile);
        assert!(snap.image_urls().unwrap().is_empty());
        assert_eq!(snap.video_count().unwrap(), 0);
        assert_eq!(snap.baseline(GenerationMode::Video).unwrap(), MediaBaseline::Videos(0));
    }
}
