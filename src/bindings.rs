use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::config::CountLogConfig;
use crate::environment::BrowserEnvironment;
use crate::event::EventKind;
use crate::sequencer::EventSequencer;

/// `CountLog` as seen from page scripts.
///
/// ```js
/// const countLog = new CountLog();
/// countLog.impression({ log: { label: 'highway.route.result', type: 'pc' } });
/// countLog.click({ log: { label: 'banner' }, navigation: { url: '/next', newTab: true } });
/// ```
///
/// `click`, `impression` and `imp` return `false` for invalid options and a
/// `Promise` otherwise. The promise rejects if the beacon could not be
/// created or the navigation threw.
#[wasm_bindgen(js_name = CountLog)]
pub struct JsCountLog {
    inner: Rc<EventSequencer<BrowserEnvironment>>,
}

#[wasm_bindgen(js_class = CountLog)]
impl JsCountLog {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<JsCountLog, JsError> {
        let env = BrowserEnvironment::new()
            .ok_or_else(|| JsError::new("CountLog needs a browser window"))?;
        let config = if config.is_undefined() || config.is_null() {
            CountLogConfig::default()
        } else {
            let json = js_sys::JSON::stringify(&config)
                .ok()
                .and_then(|json| json.as_string())
                .ok_or_else(|| JsError::new("CountLog config is not serialisable"))?;
            CountLogConfig::from_json(&json)?
        };
        Ok(JsCountLog {
            inner: Rc::new(EventSequencer::with_config(env, config)),
        })
    }

    pub fn click(&self, options: JsValue) -> JsValue {
        self.start(EventKind::Click, &options)
    }

    pub fn impression(&self, options: JsValue) -> JsValue {
        self.start(EventKind::Impression, &options)
    }

    /// Older page scripts call `imp`
    pub fn imp(&self, options: JsValue) -> JsValue {
        self.start(EventKind::Impression, &options)
    }
}

impl JsCountLog {
    fn start(&self, kind: EventKind, options: &JsValue) -> JsValue {
        let Some(json) = options_to_json(options) else {
            log_warning("CountLog: options could not be converted to JSON, nothing was sent");
            return JsValue::FALSE;
        };
        let invocation = match self.inner.prepare_json(kind, &json) {
            Ok(invocation) => invocation,
            Err(err) => {
                tracing::debug!(error = %err, %kind, "options rejected");
                return JsValue::FALSE;
            }
        };

        let sequencer = Rc::clone(&self.inner);
        future_to_promise(async move {
            sequencer
                .exec(invocation)
                .await
                .map(|()| JsValue::UNDEFINED)
                .map_err(|err| JsValue::from(JsError::from(err)))
        })
        .into()
    }
}

/// Body of a `JSON.stringify` replacer factory. Inside the top-level `log`
/// object, values plain JSON would lose (`undefined`, `NaN`, `Infinity`)
/// are replaced by their `String()` form, as the query would show them.
const LOG_REPLACER: &str = r#"
return function (key, value) {
  if (this === options && (key === 'log' || key === 'cntlog')
      && value !== null && typeof value === 'object') {
    const kept = {};
    for (const name in value) {
      const v = value[name];
      const lost = v === undefined || (typeof v === 'number' && !isFinite(v));
      kept[name] = lost ? String(v) : v;
    }
    return kept;
  }
  return value;
};
"#;

/// `undefined` and `null` options both map to JSON `null`.
fn options_to_json(options: &JsValue) -> Option<String> {
    if options.is_undefined() || options.is_null() {
        return Some("null".to_string());
    }
    let replacer = js_sys::Function::new_with_args("options", LOG_REPLACER)
        .call1(&JsValue::NULL, options)
        .ok()?;
    // JSON.stringify throws on cycles and returns undefined for functions
    js_sys::JSON::stringify_with_replacer(options, &replacer)
        .ok()?
        .as_string()
}

/// Log a warning message to the browser console.
fn log_warning(msg: &str) {
    web_sys::console::warn_1(&msg.into());
}
