use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::logger;
use super::{ButtonInfo, EditCommand, ElementId, HostPage, ImageInfo, KeyPhase, MouseAction, Rect, VideoInfo};

const PRELUDE: &str = r#"
const tag = (el) => {
  if (!el.dataset.gbId) {
    window.__gbNext = (window.__gbNext || 0) + 1;
    el.dataset.gbId = String(window.__gbNext);
  }
  return Number(el.dataset.gbId);
};
const byId = (id) => document.querySelector(`[data-gb-id="${id}"]`);
const rectOf = (el) => {
  const r = el.getBoundingClientRect();
  return { left: r.left, top: r.top, right: r.right, bottom: r.bottom };
};
const buttonOf = (b) => ({
  id: tag(b),
  aria_label: b.getAttribute('aria-label') || '',
  text: (b.textContent || '').trim(),
  disabled: !!b.disabled,
  has_icon: !!b.querySelector('svg'),
  rect: rectOf(b),
});
"#;

const IMAGES_JS: &str = r#"
return Array.from(document.querySelectorAll('img')).map((i) => ({
  src: i.src || '',
  width: i.width | 0,
  natural_width: i.naturalWidth | 0,
}));
"#;

const VIDEOS_JS: &str = r#"
return Array.from(document.querySelectorAll('video')).map((v) => {
  const source = v.querySelector('source');
  return {
    src: v.src || '',
    current_src: v.currentSrc || '',
    source_src: source && source.src ? source.src : null,
    video_width: v.videoWidth | 0,
    video_height: v.videoHeight | 0,
    client_width: v.clientWidth | 0,
    client_height: v.clientHeight | 0,
    offset_width: v.offsetWidth | 0,
    offset_height: v.offsetHeight | 0,
  };
});
"#;

/// Encode a Rust value as a JS literal.
fn lit<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

/// Where to find the browser and which page to drive
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// DevTools websocket URL of a running browser. Launches one when unset.
    pub connect: Option<String>,
    /// Host page URL, reused if a tab already shows it.
    pub url: String,
}

/// Host page backed by a Chromium tab. Each primitive is one script
/// returning `JSON.stringify(..)`; elements are tagged `data-gb-id`.
pub struct ChromePage {
    rt: Runtime,
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

async fn find_or_open(browser: &mut Browser, url: &str) -> Result<Page> {
    browser.fetch_targets().await.ok();
    tokio::time::sleep(Duration::from_millis(500)).await;

    for page in browser.pages().await? {
        if let Ok(Some(current)) = page.url().await {
            if current.starts_with(url) {
                logger::info_p("chrome", &format!("attached to open tab {}", current));
                return Ok(page);
            }
        }
    }

    logger::info_p("chrome", &format!("opening {}", url));
    Ok(browser.new_page(url).await?)
}

impl ChromePage {
    pub fn open(opts: ChromeOptions) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;

        let (browser, page, handler) = rt.block_on(async {
            let (mut browser, mut handler) = match &opts.connect {
                Some(ws) => {
                    logger::info_p("chrome", &format!("connecting to {}", ws));
                    Browser::connect(ws.clone()).await.context("connecting to browser")?
                }
                None => {
                    let config = BrowserConfig::builder()
                        .with_head()
                        .build()
                        .map_err(|e| anyhow!("browser config: {}", e))?;
                    logger::info_p("chrome", "launching browser");
                    Browser::launch(config).await.context("launching browser")?
                }
            };

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        logger::warn_p("chrome", &format!("handler: {}", e));
                    }
                }
            });

            let page = find_or_open(&mut browser, &opts.url).await?;
            Ok::<_, anyhow::Error>((browser, page, handler))
        })?;

        Ok(Self { rt, _browser: browser, page, handler })
    }

    /// Run `body` (which must `return` a JSON-serializable value) in the page.
    fn eval<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let script = format!("(() => {{ {} const __r = (() => {{ {} }})(); return JSON.stringify(__r === undefined ? null : __r); }})()", PRELUDE, body);
        self.rt.block_on(async {
            let value = self.page.evaluate(script).await.context("evaluating script")?;
            let json: String = value.into_value().context("script result")?;
            serde_json::from_str(&json).context("decoding script result")
        })
    }

    /// Run `body` against element `el`, bound as `e`. Missing elements are skipped.
    fn on_element<T: DeserializeOwned>(&self, el: ElementId, body: &str, missing: &str) -> Result<T> {
        self.eval(&format!("const e = byId({}); if (!e) return {}; {}", el, missing, body))
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

impl HostPage for ChromePage {
    fn images(&mut self) -> Result<Vec<ImageInfo>> {
        self.eval(IMAGES_JS)
    }

    fn videos(&mut self) -> Result<Vec<VideoInfo>> {
        self.eval(VIDEOS_JS)
    }

    fn query_all(&mut self, selector: &str) -> Result<Vec<ElementId>> {
        self.eval(&format!("return Array.from(document.querySelectorAll({})).map(tag);", lit(selector)))
    }

    fn text_content(&mut self, el: ElementId) -> Result<String> {
        self.on_element(el, "return e.textContent || '';", "''")
    }

    fn inner_text(&mut self, el: ElementId) -> Result<String> {
        self.on_element(el, "return e.innerText || '';", "''")
    }

    fn inner_html_len(&mut self, el: ElementId) -> Result<usize> {
        self.on_element(el, "return e.innerHTML.length;", "0")
    }

    fn rect(&mut self, el: ElementId) -> Result<Option<Rect>> {
        self.on_element(el, "return rectOf(e);", "null")
    }

    fn focus(&mut self, el: ElementId) -> Result<()> {
        self.on_element(el, "e.focus(); return null;", "null")
    }

    fn exec_command(&mut self, cmd: &EditCommand) -> Result<bool> {
        let call = match cmd {
            EditCommand::SelectAll => "document.execCommand('selectAll', false, null)".to_string(),
            EditCommand::Delete => "document.execCommand('delete', false, null)".to_string(),
            EditCommand::InsertText(text) => format!("document.execCommand('insertText', false, {})", lit(text)),
        };
        self.eval(&format!("try {{ return !!{}; }} catch (_) {{ return false; }}", call))
    }

    fn dispatch_text_input(&mut self, el: ElementId, text: &str) -> Result<()> {
        let body = format!(
            "try {{ const ev = document.createEvent('TextEvent'); ev.initTextEvent('textInput', true, true, window, {}); e.dispatchEvent(ev); }} catch (_) {{}} return null;",
            lit(text)
        );
        self.on_element(el, &body, "null")
    }

    fn set_text_content(&mut self, el: ElementId, text: &str) -> Result<()> {
        self.on_element(el, &format!("e.textContent = {}; return null;", lit(text)), "null")
    }

    fn clear_inner_html(&mut self, el: ElementId) -> Result<()> {
        self.on_element(el, "e.innerHTML = ''; return null;", "null")
    }

    fn dispatch_input(&mut self, el: ElementId, data: Option<&str>) -> Result<()> {
        let event = match data {
            Some(text) => format!(
                "new InputEvent('input', {{ bubbles: true, cancelable: true, inputType: 'insertText', data: {} }})",
                lit(text)
            ),
            None => "new Event('input', { bubbles: true })".to_string(),
        };
        self.on_element(el, &format!("e.dispatchEvent({}); return null;", event), "null")
    }

    fn dispatch_change(&mut self, el: ElementId) -> Result<()> {
        self.on_element(el, "e.dispatchEvent(new Event('change', { bubbles: true })); return null;", "null")
    }

    fn dispatch_key(&mut self, el: ElementId, key: &str, phase: KeyPhase) -> Result<()> {
        let kind = match phase {
            KeyPhase::Down => "keydown",
            KeyPhase::Up => "keyup",
        };
        let code = if key == "Enter" { 13 } else { 0 };
        let body = format!(
            "e.dispatchEvent(new KeyboardEvent('{}', {{ key: {k}, code: {k}, keyCode: {c}, which: {c}, bubbles: true, cancelable: true }})); return null;",
            kind,
            k = lit(key),
            c = code
        );
        self.on_element(el, &body, "null")
    }

    fn buttons(&mut self) -> Result<Vec<ButtonInfo>> {
        self.eval("return Array.from(document.querySelectorAll('button')).map(buttonOf);")
    }

    fn button(&mut self, el: ElementId) -> Result<Option<ButtonInfo>> {
        self.on_element(el, "return e.tagName === 'BUTTON' ? buttonOf(e) : null;", "null")
    }

    fn dispatch_mouse(&mut self, el: ElementId, action: MouseAction) -> Result<()> {
        let kind = match action {
            MouseAction::Down => "mousedown",
            MouseAction::Up => "mouseup",
            MouseAction::Click => "click",
        };
        let body = format!(
            "e.dispatchEvent(new MouseEvent('{}', {{ bubbles: true, cancelable: true, view: window }})); return null;",
            kind
        );
        self.on_element(el, &body, "null")
    }

    fn click(&mut self, el: ElementId) -> Result<()> {
        self.on_element(el, "e.click(); return null;", "null")
    }

    fn dismiss(&mut self) -> Result<()> {
        self.eval("document.body.click(); return null;")
    }
}
