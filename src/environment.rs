use wasm_bindgen::JsValue;
use web_sys::{HtmlImageElement, Window};

use crate::error::EnvError;

/// The host primitives a sequencer touches: page path, clock, beacon
/// request and the two navigation kinds.
pub trait Environment {
    /// Path of the current document, e.g. `/spot/auwallet/store`
    fn current_path(&self) -> String;

    /// Wall-clock time in milliseconds since the Unix epoch
    fn now_millis(&self) -> u64;

    /// Issue a GET for `url` without waiting for or reading the response
    fn send_beacon(&self, url: &str) -> Result<(), EnvError>;

    /// Replace the current page with `url`
    fn replace_location(&self, url: &str) -> Result<(), EnvError>;

    /// Open `url` in a new browsing context
    fn open_new_context(&self, url: &str) -> Result<(), EnvError>;
}

/// `Environment` backed by the browser window.
pub struct BrowserEnvironment {
    window: Window,
}

impl BrowserEnvironment {
    /// Returns `None` when not running inside a browser window.
    pub fn new() -> Option<Self> {
        Some(Self {
            window: web_sys::window()?,
        })
    }
}

fn js_error(context: &str, err: JsValue) -> EnvError {
    let detail = err.as_string().unwrap_or_else(|| format!("{:?}", err));
    EnvError(format!("{}: {}", context, detail))
}

impl Environment for BrowserEnvironment {
    fn current_path(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn now_millis(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn send_beacon(&self, url: &str) -> Result<(), EnvError> {
        // The request starts as soon as `src` is set; the element itself
        // is never attached to the document.
        let img = HtmlImageElement::new().map_err(|e| js_error("could not create image", e))?;
        img.set_src(url);
        Ok(())
    }

    fn replace_location(&self, url: &str) -> Result<(), EnvError> {
        self.window
            .location()
            .set_href(url)
            .map_err(|e| js_error("could not set location", e))
    }

    fn open_new_context(&self, url: &str) -> Result<(), EnvError> {
        // A blocked popup returns null rather than throwing; that is not an error here.
        self.window
            .open_with_url(url)
            .map(|_| ())
            .map_err(|e| js_error("could not open window", e))
    }
}
