pub mod stub;

#[cfg(feature = "chrome")]
pub mod chrome;

use anyhow::Result;
use serde::Deserialize;

use crate::logger;

/// Opaque handle to a DOM element, stable for the element's lifetime.
pub type ElementId = u64;

/// Viewport-relative bounding box
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// An `<img>` as rendered
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    pub width: u32,
    pub natural_width: u32,
}

/// A `<video>` as rendered. Sizes are 0 when unknown.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoInfo {
    pub src: String,
    pub current_src: String,
    /// `src` of the first nested `<source>`, if any
    pub source_src: Option<String>,
    pub video_width: u32,
    pub video_height: u32,
    pub client_width: u32,
    pub client_height: u32,
    pub offset_width: u32,
    pub offset_height: u32,
}

/// A `<button>` with what the submit heuristics look at
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ButtonInfo {
    pub id: ElementId,
    pub aria_label: String,
    pub text: String,
    pub disabled: bool,
    /// Contains an icon (`<svg>`) child
    pub has_icon: bool,
    pub rect: Rect,
}

/// Editing commands of the document's native command interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    SelectAll,
    Delete,
    InsertText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Down,
    Up,
    Click,
}

/// DOM-level operations against the host page.
///
/// Reads never mutate the page. Writes are best-effort: a `false` or empty
/// return is a normal outcome, `Err` means the page itself is unreachable.
pub trait HostPage: Send {
    fn images(&mut self) -> Result<Vec<ImageInfo>>;
    fn videos(&mut self) -> Result<Vec<VideoInfo>>;

    /// All elements matching `selector`, in document order.
    fn query_all(&mut self, selector: &str) -> Result<Vec<ElementId>>;
    fn query(&mut self, selector: &str) -> Result<Option<ElementId>> {
        Ok(self.query_all(selector)?.into_iter().next())
    }
    /// First element matching any of `selectors`, tried in order.
    fn find_first(&mut self, selectors: &[String]) -> Result<Option<ElementId>> {
        for selector in selectors {
            if let Some(el) = self.query(selector)? {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }

    fn text_content(&mut self, el: ElementId) -> Result<String>;
    fn inner_text(&mut self, el: ElementId) -> Result<String>;
    fn inner_html_len(&mut self, el: ElementId) -> Result<usize>;
    fn rect(&mut self, el: ElementId) -> Result<Option<Rect>>;

    fn focus(&mut self, el: ElementId) -> Result<()>;
    /// Returns whether the command reported success.
    fn exec_command(&mut self, cmd: &EditCommand) -> Result<bool>;
    fn dispatch_text_input(&mut self, el: ElementId, text: &str) -> Result<()>;
    fn set_text_content(&mut self, el: ElementId, text: &str) -> Result<()>;
    fn clear_inner_html(&mut self, el: ElementId) -> Result<()>;
    fn dispatch_input(&mut self, el: ElementId, data: Option<&str>) -> Result<()>;
    fn dispatch_change(&mut self, el: ElementId) -> Result<()>;
    fn dispatch_key(&mut self, el: ElementId, key: &str, phase: KeyPhase) -> Result<()>;

    fn buttons(&mut self) -> Result<Vec<ButtonInfo>>;
    fn button(&mut self, el: ElementId) -> Result<Option<ButtonInfo>>;
    fn dispatch_mouse(&mut self, el: ElementId, action: MouseAction) -> Result<()>;
    /// Plain `element.click()`.
    fn click(&mut self, el: ElementId) -> Result<()>;
    /// Click on the document body, closing open popovers.
    fn dismiss(&mut self) -> Result<()>;
}

/// Full pointer gesture on `el`; some pages only react to the whole sequence.
pub fn gesture_click(page: &mut dyn HostPage, el: ElementId) -> Result<()> {
    for action in [MouseAction::Down, MouseAction::Up, MouseAction::Click] {
        page.dispatch_mouse(el, action)?;
    }
    Ok(())
}

/// Which page backend to drive.
pub enum Backend {
    Stub,
    #[cfg(feature = "chrome")]
    Chrome(chrome::ChromeOptions),
}

/// Create the page for the chosen backend.
pub fn create_page(backend: Backend) -> Result<Box<dyn HostPage>> {
    match backend {
        Backend::Stub => {
            logger::register_prefix("stub", logger::COLOR_GRAY);
            Ok(Box::new(stub::StubPage::demo()))
        }
        #[cfg(feature = "chrome")]
        Backend::Chrome(opts) => {
            logger::register_prefix("chrome", logger::COLOR_GRAY);
            Ok(Box::new(chrome::ChromePage::open(opts)?))
        }
    }
}
