//! Headless Chrome bindings for both pipelines.
//!
//! - [`ChromeLauncher`] / [`ChromeEngine`] implement the native print seams.
//! - [`ChromePreview`] hosts a rendered preview in a tab and implements
//!   [`DisplayTree`] so the raster pipeline can clone and capture it.
//!
//! Documents are loaded through base64 `data:` URLs, so nothing touches the
//! filesystem.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use headless_chrome::protocol::cdp::Page::{self, CaptureScreenshotFormatOption};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::config::ChromeConfig;
use crate::error::{RenderError, Result};
use crate::html::PREVIEW_SELECTOR;
use crate::native::{Engine, EngineLauncher, PrintOptions};
use crate::raster::{CaptureStyle, CapturedImage, DisplayTree};

/// Gap between the end of the document and an attached capture clone, px.
const CLONE_GAP_PX: u32 = 100;

fn data_url(html: &str) -> String {
    format!("data:text/html;charset=utf-8;base64,{}", BASE64_STD.encode(html))
}

fn js_string(s: &str) -> String {
    // serde_json emits a valid JS string literal.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// An element's border box in document coordinates, CSS px.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DocumentRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl DocumentRect {
    fn clip(self, scale: f64) -> Page::Viewport {
        Page::Viewport { x: self.x, y: self.y, width: self.width, height: self.height, scale }
    }
}

/// Screenshot command that paints the clip even where it lies outside the
/// window's viewport.
fn full_surface_capture(clip: Page::Viewport) -> Page::CaptureScreenshot {
    Page::CaptureScreenshot {
        format: Some(CaptureScreenshotFormatOption::Png),
        quality: None,
        clip: Some(clip),
        from_surface: Some(true),
        capture_beyond_viewport: Some(true),
        optimize_for_speed: None,
    }
}

/// Launches one isolated Chrome process per call.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: ChromeConfig,
    idle_timeout: Duration,
}

impl ChromeLauncher {
    /// `idle_timeout` must outlast the readiness timeout, otherwise the
    /// browser closes itself while the barrier is still polling.
    pub fn new(config: ChromeConfig, idle_timeout: Duration) -> Self {
        Self { config, idle_timeout }
    }

    fn launch_browser(&self) -> Result<Browser> {
        let args: Vec<&OsStr> = self.config.args.iter().map(OsStr::new).collect();
        let options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(false)
            .path(self.config.executable.clone())
            .args(args)
            .idle_browser_timeout(self.idle_timeout)
            .build()
            .map_err(|e| RenderError::EngineLaunchFailure(format!("launch options: {e}")))?;
        let browser =
            Browser::new(options).map_err(|e| RenderError::EngineLaunchFailure(e.to_string()))?;
        log::debug!("Launched browser engine");
        Ok(browser)
    }

    fn open_tab(&self, browser: &Browser) -> Result<Arc<Tab>> {
        browser
            .new_tab()
            .map_err(|e| RenderError::EngineLaunchFailure(format!("new tab: {e}")))
    }
}

fn evaluate_bool(tab: &Tab, expression: &str, await_promise: bool) -> anyhow::Result<bool> {
    let remote = tab.evaluate(expression, await_promise)?;
    Ok(remote.value.and_then(|v| v.as_bool()).unwrap_or(false))
}

fn load(tab: &Tab, html: &str) -> anyhow::Result<()> {
    tab.navigate_to(&data_url(html))?;
    tab.wait_until_navigated()?;
    Ok(())
}

impl EngineLauncher for ChromeLauncher {
    type Engine = ChromeEngine;

    fn launch(&self) -> Result<ChromeEngine> {
        let browser = self.launch_browser()?;
        let tab = self.open_tab(&browser)?;
        Ok(ChromeEngine { tab: Some(tab), browser: Some(browser) })
    }
}

/// A launched Chrome with a single page context.
pub struct ChromeEngine {
    tab: Option<Arc<Tab>>,
    browser: Option<Browser>,
}

impl ChromeEngine {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| RenderError::EngineFailure("engine already shut down".to_string()))
    }
}

impl Engine for ChromeEngine {
    fn load_html(&mut self, html: &str) -> Result<()> {
        load(self.tab()?, html).map_err(|e| RenderError::engine("load", e))
    }

    fn content_populated(&mut self, selector: &str) -> Result<bool> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); return !!el && el.innerHTML !== ''; }})()",
            js_string(selector)
        );
        evaluate_bool(self.tab()?, &expr, false).map_err(|e| RenderError::engine("readiness", e))
    }

    fn print_to_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>> {
        let (paper_width, paper_height) = options.paper_inches();
        let (top, right, bottom, left) = options.margin_inches();
        let pdf_options = PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(options.print_background),
            scale: Some(1.0),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            margin_top: Some(top),
            margin_bottom: Some(bottom),
            margin_left: Some(left),
            margin_right: Some(right),
            prefer_css_page_size: Some(options.prefer_css_page_size),
            ..Default::default()
        };
        self.tab()?
            .print_to_pdf(Some(pdf_options))
            .map_err(|e| RenderError::engine("print", e))
    }

    fn shutdown(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                log::debug!("Closing tab failed, process teardown will reap it: {e}");
            }
        }
        // Dropping the browser kills the Chrome process.
        if self.browser.take().is_some() {
            log::debug!("Browser engine shut down");
        }
    }
}

impl Drop for ChromeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Preview host
// ---------------------------------------------------------------------------

/// Element handle inside a [`ChromePreview`], by DOM id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(pub String);

/// A rendered preview living in a headless tab.
pub struct ChromePreview {
    engine: ChromeEngine,
    next_clone: u32,
}

impl ChromePreview {
    /// Launch a browser and show `preview_html` (see
    /// [`crate::html::render_preview`]).
    pub fn open(launcher: &ChromeLauncher, preview_html: &str) -> Result<Self> {
        let mut engine = launcher.launch()?;
        engine.load_html(preview_html).map_err(|e| RenderError::capture("preview load", e))?;
        Ok(Self { engine, next_clone: 0 })
    }

    /// The preview container.
    pub fn preview_element(&self) -> ElementId {
        ElementId(PREVIEW_SELECTOR.trim_start_matches('#').to_string())
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.engine.tab().map_err(|e| RenderError::capture("tab", e))
    }

    fn eval(&self, step: &str, expression: &str, await_promise: bool) -> Result<bool> {
        evaluate_bool(self.tab()?, expression, await_promise)
            .map_err(|e| RenderError::capture(step, e))
    }

    fn natural_width(&self, node: &ElementId) -> Result<Option<u32>> {
        let expr = format!(
            "(() => {{ const el = document.getElementById({}); return el ? el.scrollWidth : null; }})()",
            js_string(&node.0)
        );
        let remote = self
            .tab()?
            .evaluate(&expr, false)
            .map_err(|e| RenderError::capture("measure", e))?;
        Ok(remote.value.and_then(|v| v.as_f64()).map(|w| w.round() as u32))
    }
}

impl ChromePreview {
    fn document_rect(&self, node: &ElementId) -> Result<DocumentRect> {
        let expr = format!(
            r#"(() => {{
                const el = document.getElementById({id});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return JSON.stringify([r.left + window.scrollX, r.top + window.scrollY, r.width, r.height]);
            }})()"#,
            id = js_string(&node.0),
        );
        let remote = self
            .tab()?
            .evaluate(&expr, false)
            .map_err(|e| RenderError::capture("measure clone", e))?;
        let json = remote
            .value
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| RenderError::CaptureFailure(format!("clone '{}' is not attached", node.0)))?;
        parse_rect(&json)
    }
}

fn parse_rect(json: &str) -> Result<DocumentRect> {
    let [x, y, width, height]: [f64; 4] =
        serde_json::from_str(json).map_err(|e| RenderError::capture("clone rect", e))?;
    Ok(DocumentRect { x, y, width, height })
}

impl DisplayTree for ChromePreview {
    type Node = ElementId;

    fn clone_node(&mut self, source: &ElementId, style: &CaptureStyle) -> Result<ElementId> {
        let width = self.natural_width(source)?;
        self.next_clone += 1;
        let clone = ElementId(format!("mdforge-capture-{}", self.next_clone));
        let expr = format!(
            r#"(() => {{
                const src = document.getElementById({src});
                if (!src) return false;
                const clone = src.cloneNode(true);
                clone.id = {id};
                clone.setAttribute('style', {css});
                window.__mdforgeClones = window.__mdforgeClones || {{}};
                window.__mdforgeClones[{id}] = clone;
                return true;
            }})()"#,
            src = js_string(&source.0),
            id = js_string(&clone.0),
            css = js_string(&style.to_css(width)),
        );
        if !self.eval("clone", &expr, false)? {
            return Err(RenderError::CaptureFailure(format!("element '{}' not found", source.0)));
        }
        Ok(clone)
    }

    fn attach(&mut self, node: &ElementId) -> Result<()> {
        // Placed below the end of the document: laid out, never in view.
        let expr = format!(
            r#"(() => {{
                const clone = (window.__mdforgeClones || {{}})[{id}];
                if (!clone) return false;
                clone.style.left = '0px';
                clone.style.top = (document.documentElement.scrollHeight + {gap}) + 'px';
                document.body.appendChild(clone);
                return true;
            }})()"#,
            id = js_string(&node.0),
            gap = CLONE_GAP_PX,
        );
        if !self.eval("attach", &expr, false)? {
            return Err(RenderError::CaptureFailure(format!("clone '{}' is unknown", node.0)));
        }
        Ok(())
    }

    fn detach(&mut self, node: &ElementId) -> Result<()> {
        let expr = format!(
            r#"(() => {{
                const clones = window.__mdforgeClones || {{}};
                const clone = clones[{id}] || document.getElementById({id});
                if (clone) clone.remove();
                delete clones[{id}];
                return true;
            }})()"#,
            id = js_string(&node.0),
        );
        self.eval("detach", &expr, false).map(|_| ())
    }

    fn capture(&mut self, node: &ElementId, scale: f64) -> Result<CapturedImage> {
        // Let every image inside the clone settle, cross-origin ones included.
        let wait_images = format!(
            r#"(async () => {{
                const root = document.getElementById({id});
                if (!root) return false;
                const imgs = Array.from(root.querySelectorAll('img'));
                await Promise.all(imgs.map(img => img.complete ? null :
                    new Promise(done => {{ img.onload = done; img.onerror = done; }})));
                return true;
            }})()"#,
            id = js_string(&node.0),
        );
        if !self.eval("image load", &wait_images, true)? {
            return Err(RenderError::CaptureFailure(format!("clone '{}' is not attached", node.0)));
        }

        let clip = self.document_rect(node)?.clip(scale);
        let shot = self
            .tab()?
            .call_method(full_surface_capture(clip))
            .map_err(|e| RenderError::capture("screenshot", e))?;
        let png = BASE64_STD
            .decode(shot.data)
            .map_err(|e| RenderError::capture("screenshot decode", e))?;
        CapturedImage::from_png(png)
    }

    fn contains(&mut self, node: &ElementId) -> Result<bool> {
        let expr = format!("document.getElementById({}) !== null", js_string(&node.0));
        self.eval("lookup", &expr, false)
    }
}
