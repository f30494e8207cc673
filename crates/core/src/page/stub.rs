use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::logger;
use super::{
    ButtonInfo, EditCommand, ElementId, HostPage, ImageInfo, KeyPhase, MouseAction, Rect,
    VideoInfo,
};

pub const INPUT_SELECTOR: &str = r#"div[role="textbox"][contenteditable="true"]"#;
const COMBOBOX_SELECTOR: &str = r#"button[role="combobox"]"#;
const OPTION_SELECTOR: &str = r#"div[role="option"], div[role="menuitem"]"#;

const INPUT_ID: ElementId = 1;
const OPTION_BASE: ElementId = 10_000;

/// Media that shows up on one read of the page while a generation runs
#[derive(Debug, Clone, Default)]
pub struct MediaStep {
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

impl MediaStep {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn images<S: AsRef<str>>(urls: &[S]) -> Self {
        Self { images: urls.iter().map(|u| u.as_ref().to_string()).collect(), videos: Vec::new() }
    }

    pub fn videos<S: AsRef<str>>(urls: &[S]) -> Self {
        Self { images: Vec::new(), videos: urls.iter().map(|u| u.as_ref().to_string()).collect() }
    }
}

/// What the page renders after one submission, one step per media read
pub type Generation = Vec<MediaStep>;

#[derive(Debug, Clone)]
pub struct StubButton {
    pub id: ElementId,
    /// Extra selectors (beyond `button`) this button answers to.
    pub selectors: Vec<String>,
    pub aria_label: String,
    pub text: String,
    pub disabled: bool,
    pub has_icon: bool,
    pub rect: Rect,
    pub submits: bool,
}

#[derive(Debug, Clone)]
pub struct StubDropdown {
    pub id: ElementId,
    pub text: String,
    pub options: Vec<String>,
}

/// In-memory model of the host page.
pub struct StubDom {
    pub input_present: bool,
    pub input_text: String,
    pub input_rect: Rect,
    /// Native insert-text command works
    pub exec_insert_works: bool,
    /// Enter on the input submits
    pub enter_submits: bool,
    pub buttons: Vec<StubButton>,
    pub dropdowns: Vec<StubDropdown>,
    pub images: Vec<ImageInfo>,
    pub videos: Vec<VideoInfo>,
    /// Scripted generations, consumed one per submission.
    pub scripted: VecDeque<Generation>,
    /// Synthesize a generation when nothing is scripted.
    pub auto_generate: bool,
    /// Every prompt the page accepted, in order.
    pub submitted: Vec<String>,
    /// Every option text clicked, in order.
    pub selected_options: Vec<String>,
    /// Number of body clicks (dropdown dismissals).
    pub dismissals: usize,
    /// Number of media reads taken so far.
    pub media_reads: usize,
    active: VecDeque<MediaStep>,
    open_dropdown: Option<usize>,
    focused: Option<ElementId>,
    select_all: bool,
    next_id: ElementId,
    next_media: usize,
}

impl Default for StubDom {
    fn default() -> Self {
        Self {
            input_present: true,
            input_text: String::new(),
            input_rect: Rect { left: 300.0, top: 900.0, right: 1200.0, bottom: 950.0 },
            exec_insert_works: true,
            enter_submits: true,
            buttons: Vec::new(),
            dropdowns: Vec::new(),
            images: Vec::new(),
            videos: Vec::new(),
            scripted: VecDeque::new(),
            auto_generate: false,
            submitted: Vec::new(),
            selected_options: Vec::new(),
            dismissals: 0,
            media_reads: 0,
            active: VecDeque::new(),
            open_dropdown: None,
            focused: None,
            select_all: false,
            next_id: 100,
            next_media: 1,
        }
    }
}

impl StubDom {
    fn alloc_id(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_dropdown(&mut self, text: &str, options: &[&str]) -> ElementId {
        let id = self.alloc_id();
        self.dropdowns.push(StubDropdown {
            id,
            text: text.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        });
        id
    }

    pub fn add_button(&mut self, button: StubButton) -> ElementId {
        let id = self.alloc_id();
        self.buttons.push(StubButton { id, ..button });
        id
    }

    /// Icon-only send button to the right of the input, labelled "Send".
    pub fn add_send_button(&mut self) -> ElementId {
        let top = self.input_rect.top;
        self.add_button(StubButton {
            id: 0,
            selectors: vec![r#"button[aria-label="Send"]"#.to_string()],
            aria_label: "Send".into(),
            text: String::new(),
            disabled: false,
            has_icon: true,
            rect: Rect { left: 1210.0, top, right: 1250.0, bottom: top + 40.0 },
            submits: true,
        })
    }

    pub fn add_image(&mut self, src: &str, width: u32) {
        self.images.push(ImageInfo { src: src.to_string(), width, natural_width: width });
    }

    /// Videos are prepended, newest first, the way the host page renders them.
    pub fn prepend_video(&mut self, src: &str) {
        self.videos.insert(0, VideoInfo {
            src: src.to_string(),
            current_src: src.to_string(),
            source_src: None,
            video_width: 720,
            video_height: 1280,
            client_width: 360,
            client_height: 640,
            offset_width: 360,
            offset_height: 640,
        });
    }

    pub fn script(&mut self, generation: Generation) {
        self.scripted.push_back(generation);
    }

    fn advance_generation(&mut self) {
        self.media_reads += 1;
        if let Some(step) = self.active.pop_front() {
            for src in step.images {
                self.add_image(&src, 512);
            }
            for src in step.videos {
                self.prepend_video(&src);
            }
        }
    }

    fn current_mode_is_video(&self) -> bool {
        self.dropdowns
            .first()
            .map_or(false, |d| d.text.to_lowercase().contains("video"))
    }

    fn synthesize(&mut self) -> Generation {
        let video = self.current_mode_is_video();
        let mut url = |ext: &str| {
            let n = self.next_media;
            self.next_media += 1;
            format!("https://scontent.stub.fbcdn.net/v/generated-{}.{}", n, ext)
        };
        if video {
            vec![MediaStep::none(), MediaStep::none(), MediaStep::videos(&[url("mp4")])]
        } else {
            let (a, b, c, d) = (url("jpg"), url("jpg"), url("jpg"), url("jpg"));
            vec![MediaStep::none(), MediaStep::images(&[a, b]), MediaStep::images(&[c, d])]
        }
    }

    fn submit(&mut self) {
        let text = self.input_text.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.submitted.push(text);
        self.input_text.clear();
        let generation = match self.scripted.pop_front() {
            Some(g) => g,
            None if self.auto_generate => self.synthesize(),
            None => Vec::new(),
        };
        self.active = generation.into();
    }

    fn option_ids(&self) -> Vec<ElementId> {
        match self.open_dropdown {
            Some(d) => (0..self.dropdowns[d].options.len())
                .map(|i| OPTION_BASE + i as ElementId)
                .collect(),
            None => Vec::new(),
        }
    }

    fn option_text(&self, el: ElementId) -> Option<String> {
        let d = self.open_dropdown?;
        let idx = el.checked_sub(OPTION_BASE)? as usize;
        self.dropdowns[d].options.get(idx).cloned()
    }

    fn activate(&mut self, el: ElementId) {
        if let Some(text) = self.option_text(el) {
            if let Some(d) = self.open_dropdown.take() {
                self.dropdowns[d].text = text.clone();
            }
            self.selected_options.push(text);
            return;
        }
        if let Some(d) = self.dropdowns.iter().position(|d| d.id == el) {
            self.open_dropdown = Some(d);
            return;
        }
        let submits = self.buttons.iter().any(|b| b.id == el && b.submits && !b.disabled);
        if submits {
            self.submit();
        }
    }

    fn element_text(&self, el: ElementId) -> String {
        if el == INPUT_ID {
            return self.input_text.clone();
        }
        if let Some(text) = self.option_text(el) {
            return text;
        }
        if let Some(d) = self.dropdowns.iter().find(|d| d.id == el) {
            return d.text.clone();
        }
        self.buttons
            .iter()
            .find(|b| b.id == el)
            .map(|b| b.text.clone())
            .unwrap_or_default()
    }
}

/// Simulated host page. Clones share the same DOM.
#[derive(Clone, Default)]
pub struct StubPage {
    dom: Arc<Mutex<StubDom>>,
}

impl StubPage {
    pub fn new(dom: StubDom) -> Self {
        Self { dom: Arc::new(Mutex::new(dom)) }
    }

    /// A page that looks like the real one: mode and ratio dropdowns, a send
    /// button, some history, and a fresh generation on every submission.
    pub fn demo() -> Self {
        let mut dom = StubDom { auto_generate: true, ..StubDom::default() };
        dom.add_dropdown("Image", &["Image", "Video"]);
        dom.add_dropdown("9:16", &["9:16", "1:1", "16:9"]);
        dom.add_send_button();
        dom.add_image("https://scontent.stub.fbcdn.net/v/avatar.jpg", 40);
        for n in 1..=4 {
            dom.add_image(&format!("https://scontent.stub.fbcdn.net/v/history-{}.jpg", n), 512);
        }
        Self::new(dom)
    }

    /// Lock the shared DOM for inspection or scripting.
    pub fn dom(&self) -> MutexGuard<'_, StubDom> {
        self.dom.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StubDom>> {
        self.dom.lock().map_err(|_| anyhow!("stub dom poisoned"))
    }
}

impl HostPage for StubPage {
    fn images(&mut self) -> Result<Vec<ImageInfo>> {
        let mut dom = self.lock()?;
        dom.advance_generation();
        Ok(dom.images.clone())
    }

    fn videos(&mut self) -> Result<Vec<VideoInfo>> {
        let mut dom = self.lock()?;
        dom.advance_generation();
        Ok(dom.videos.clone())
    }

    fn query_all(&mut self, selector: &str) -> Result<Vec<ElementId>> {
        let dom = self.lock()?;
        let ids = match selector {
            INPUT_SELECTOR if dom.input_present => vec![INPUT_ID],
            COMBOBOX_SELECTOR => dom.dropdowns.iter().map(|d| d.id).collect(),
            OPTION_SELECTOR => dom.option_ids(),
            "button" => dom
                .dropdowns
                .iter()
                .map(|d| d.id)
                .chain(dom.buttons.iter().map(|b| b.id))
                .collect(),
            _ => dom
                .buttons
                .iter()
                .filter(|b| b.selectors.iter().any(|s| s == selector))
                .map(|b| b.id)
                .collect(),
        };
        Ok(ids)
    }

    fn text_content(&mut self, el: ElementId) -> Result<String> {
        Ok(self.lock()?.element_text(el))
    }

    fn inner_text(&mut self, el: ElementId) -> Result<String> {
        Ok(self.lock()?.element_text(el))
    }

    fn inner_html_len(&mut self, el: ElementId) -> Result<usize> {
        Ok(self.lock()?.element_text(el).len())
    }

    fn rect(&mut self, el: ElementId) -> Result<Option<Rect>> {
        let dom = self.lock()?;
        if el == INPUT_ID {
            return Ok(Some(dom.input_rect));
        }
        Ok(dom.buttons.iter().find(|b| b.id == el).map(|b| b.rect))
    }

    fn focus(&mut self, el: ElementId) -> Result<()> {
        self.lock()?.focused = Some(el);
        Ok(())
    }

    fn exec_command(&mut self, cmd: &EditCommand) -> Result<bool> {
        let mut dom = self.lock()?;
        if dom.focused != Some(INPUT_ID) {
            return Ok(false);
        }
        match cmd {
            EditCommand::SelectAll => dom.select_all = true,
            EditCommand::Delete => {
                if dom.select_all {
                    dom.input_text.clear();
                    dom.select_all = false;
                }
            }
            EditCommand::InsertText(text) => {
                if !dom.exec_insert_works {
                    return Ok(false);
                }
                dom.input_text.push_str(text);
            }
        }
        Ok(true)
    }

    fn dispatch_text_input(&mut self, el: ElementId, text: &str) -> Result<()> {
        logger::info_p("stub", &format!("textInput({}, {} chars)", el, text.len()));
        Ok(())
    }

    fn set_text_content(&mut self, el: ElementId, text: &str) -> Result<()> {
        if el == INPUT_ID {
            self.lock()?.input_text = text.to_string();
        }
        Ok(())
    }

    fn clear_inner_html(&mut self, el: ElementId) -> Result<()> {
        if el == INPUT_ID {
            self.lock()?.input_text.clear();
        }
        Ok(())
    }

    fn dispatch_input(&mut self, _el: ElementId, _data: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn dispatch_change(&mut self, _el: ElementId) -> Result<()> {
        Ok(())
    }

    fn dispatch_key(&mut self, el: ElementId, key: &str, phase: KeyPhase) -> Result<()> {
        let mut dom = self.lock()?;
        if el == INPUT_ID && key == "Enter" && phase == KeyPhase::Down && dom.enter_submits {
            dom.submit();
        }
        Ok(())
    }

    fn buttons(&mut self) -> Result<Vec<ButtonInfo>> {
        let dom = self.lock()?;
        Ok(dom.buttons.iter().map(button_info).collect())
    }

    fn button(&mut self, el: ElementId) -> Result<Option<ButtonInfo>> {
        let dom = self.lock()?;
        Ok(dom.buttons.iter().find(|b| b.id == el).map(button_info))
    }

    fn dispatch_mouse(&mut self, el: ElementId, action: MouseAction) -> Result<()> {
        if action == MouseAction::Click {
            self.lock()?.activate(el);
        }
        Ok(())
    }

    fn click(&mut self, el: ElementId) -> Result<()> {
        self.lock()?.activate(el);
        Ok(())
    }

    fn dismiss(&mut self) -> Result<()> {
        let mut dom = self.lock()?;
        dom.open_dropdown = None;
        dom.dismissals += 1;
        Ok(())
    }
}

fn button_info(b: &StubButton) -> ButtonInfo {
    ButtonInfo {
        id: b.id,
        aria_label: b.aria_label.clone(),
        text: b.text.clone(),
        disabled: b.disabled,
        has_icon: b.has_icon,
        rect: b.rect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_submits_and_clears_input() {
        let mut page = StubPage::new(StubDom::default());
        page.focus(INPUT_ID).unwrap();
        page.exec_command(&EditCommand::InsertText("a red fox".into())).unwrap();
        page.dispatch_key(INPUT_ID, "Enter", KeyPhase::Down).unwrap();
        let dom = page.dom();
        assert_eq!(dom.submitted, vec!["a red fox".to_string()]);
        assert!(dom.input_text.is_empty());
    }

    #[test]
    fn test_scripted_generation_applies_one_step_per_read() {
        let mut dom = StubDom::default();
        dom.script(vec![MediaStep::images(&["a", "b"]), MediaStep::images(&["c"])]);
        dom.input_text = "x".into();
        dom.submit();
        let mut page = StubPage::new(dom);
        assert_eq!(page.images().unwrap().len(), 2);
        assert_eq!(page.images().unwrap().len(), 3);
        assert_eq!(page.images().unwrap().len(), 3);
    }

    #[test]
    fn test_dropdown_option_selection() {
        let mut dom = StubDom::default();
        let dd = dom.add_dropdown("Image", &["Image", "Video"]);
        let mut page = StubPage::new(dom);
        page.click(dd).unwrap();
        let options = page.query_all(OPTION_SELECTOR).unwrap();
        assert_eq!(options.len(), 2);
        page.click(options[1]).unwrap();
        assert_eq!(page.text_content(dd).unwrap(), "Video");
        assert!(page.query_all(OPTION_SELECTOR).unwrap().is_empty());
    }
}
