//! WebAssembly bindings for Blocky
//!
//! `Background` wraps the browser-level engine, `Page` wraps the page guard.
//! Host capabilities (toggle storage, enforcement, gesture relay) are plain
//! JS callbacks handed to the constructors.

use std::sync::Once;

use bk_core::types::{FrameId, GestureKind, LinkClick, NodeId, StructuralChange};
use bk_core::{
    Clock, ContextId, EngineConfig, EngineError, Enforcement, EnforcementPort, GestureRelay,
    NavigationEngine, NavigationEvent, PageGuard, ToggleSource, Verdict,
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;

// =============================================================================
// Logging
// =============================================================================

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;
static LOGGER_INIT: Once = Once::new();

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            Level::Info => web_sys::console::info_1(&line),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

/// Route engine logs to the browser console. `level` is one of
/// `error`, `warn`, `info`, `debug`, `trace`; anything else means `info`.
#[wasm_bindgen]
pub fn init_logging(level: Option<String>) {
    LOGGER_INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
    });
    let filter = level
        .as_deref()
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    log::set_max_level(filter);
}

// =============================================================================
// Host adapters
// =============================================================================

struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

/// `() => boolean`. Throwing means the setting could not be read.
struct JsToggle(js_sys::Function);

impl ToggleSource for JsToggle {
    fn is_enabled(&self) -> Result<bool, EngineError> {
        self.0
            .call0(&JsValue::NULL)
            .map(|v| v.as_bool().unwrap_or(true))
            .map_err(|e| EngineError::StorageUnavailable(describe(&e)))
    }
}

/// `(contextId, enforcement) => void`.
struct JsEnforcer(js_sys::Function);

impl EnforcementPort for JsEnforcer {
    fn block(&mut self, context: ContextId, enforcement: Enforcement) -> Result<(), EngineError> {
        self.0
            .call2(&JsValue::NULL, &JsValue::from(context.0), &enforcement_to_js(enforcement))
            .map(|_| ())
            .map_err(|e| EngineError::EnforcementFailure(describe(&e)))
    }
}

/// `() => void`, usually posting `{type: "userGesture"}` to the background.
struct JsRelay(Option<js_sys::Function>);

impl GestureRelay for JsRelay {
    fn send_gesture(&mut self) -> Result<(), EngineError> {
        match &self.0 {
            Some(f) => f
                .call0(&JsValue::NULL)
                .map(|_| ())
                .map_err(|e| EngineError::RelayFailure(describe(&e))),
            None => Ok(()),
        }
    }
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn load_config(config_json: Option<String>) -> Result<EngineConfig, JsValue> {
    match config_json {
        Some(text) if !text.trim().is_empty() => EngineConfig::from_json(&text)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e))),
        _ => Ok(EngineConfig::default()),
    }
}

fn enforcement_to_js(enforcement: Enforcement) -> JsValue {
    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &"type".into(), &JsValue::from_str(enforcement.as_str()));
    if let Enforcement::RemoveElement(node) = enforcement {
        let _ = js_sys::Reflect::set(&obj, &"node".into(), &JsValue::from(node.0));
    }
    obj.into()
}

fn verdict_to_js(verdict: Verdict) -> JsValue {
    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &"action".into(), &JsValue::from_str(verdict.action.as_str()));
    let _ = js_sys::Reflect::set(&obj, &"reason".into(), &JsValue::from_str(verdict.reason.as_str()));
    let _ = js_sys::Reflect::set(&obj, &"enforcement".into(), &enforcement_to_js(verdict.enforcement));
    obj.into()
}

// =============================================================================
// Background engine
// =============================================================================

#[wasm_bindgen]
pub struct Background {
    engine: NavigationEngine<JsToggle, JsEnforcer, JsClock>,
}

#[wasm_bindgen]
impl Background {
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        is_enabled: js_sys::Function,
        enforce: js_sys::Function,
    ) -> Result<Background, JsValue> {
        let config = load_config(config_json)?;
        Ok(Background {
            engine: NavigationEngine::new(config, JsToggle(is_enabled), JsEnforcer(enforce), JsClock),
        })
    }

    /// `webNavigation.onCommitted` with `transitionQualifiers` as strings.
    pub fn on_committed(&mut self, tab_id: i32, frame_id: i32, url: &str, qualifiers: JsValue) -> JsValue {
        let qualifiers: Vec<String> = js_sys::Array::from(&qualifiers)
            .iter()
            .filter_map(|v| v.as_string())
            .collect();
        let event = NavigationEvent::from_committed(
            tab_id,
            frame_id,
            url,
            qualifiers.iter().map(String::as_str),
        );
        verdict_to_js(self.engine.on_navigation(&event))
    }

    /// `{type: "userGesture"}` from a content script in `tab_id`.
    pub fn on_gesture(&mut self, tab_id: i32) {
        self.engine.on_gesture(ContextId(tab_id));
    }

    pub fn on_tab_removed(&mut self, tab_id: i32) {
        self.engine.on_context_closed(ContextId(tab_id));
    }

    /// Run the idle sweep if due. Returns the number of entries dropped.
    pub fn sweep(&mut self) -> u32 {
        self.engine.sweep_if_due().unwrap_or(0) as u32
    }

    pub fn has_recent_gesture(&self, tab_id: i32) -> bool {
        self.engine.has_recent_gesture(ContextId(tab_id))
    }

    pub fn redirect_count(&self, tab_id: i32) -> u32 {
        self.engine.session(ContextId(tab_id)).map_or(0, |s| s.count())
    }
}

// =============================================================================
// Page guard
// =============================================================================

#[wasm_bindgen]
pub struct Page {
    guard: PageGuard<JsEnforcer, JsClock, JsRelay>,
}

#[wasm_bindgen]
impl Page {
    #[wasm_bindgen(constructor)]
    pub fn new(
        href: &str,
        config_json: Option<String>,
        enforce: js_sys::Function,
        relay: Option<js_sys::Function>,
    ) -> Result<Page, JsValue> {
        let config = load_config(config_json)?;
        Ok(Page {
            guard: PageGuard::new(ContextId(0), href, config, JsEnforcer(enforce), JsClock, JsRelay(relay)),
        })
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.guard.set_enabled(enabled);
    }

    /// DOM event name: `mousedown`, `click`, `keydown`, `touchstart`, `submit`.
    pub fn on_gesture(&mut self, event_name: &str) -> bool {
        match GestureKind::from_event_name(event_name) {
            Some(kind) => {
                self.guard.on_gesture(kind);
                true
            }
            None => false,
        }
    }

    /// Poll timer body: `poll(location.href)`.
    pub fn poll(&mut self, href: &str) -> JsValue {
        verdict_to_js(self.guard.poll(href))
    }

    pub fn tick(&mut self) -> JsValue {
        self.guard.tick().map_or(JsValue::NULL, verdict_to_js)
    }

    /// Milliseconds until the pending rollback fires, or `undefined`.
    pub fn next_rollback_in(&self) -> Option<f64> {
        self.guard.next_rollback_in_ms().map(|ms| ms as f64)
    }

    pub fn on_popstate(&mut self, href: &str) {
        self.guard.on_history_navigation(href);
    }

    /// Guard for the wrapped `window.open`. On `action: "block"` the wrapper
    /// returns `null` instead of opening.
    pub fn request_open(&mut self, url: Option<String>, frame_id: Option<i32>) -> JsValue {
        verdict_to_js(self.guard.request_open(url.as_deref(), frame_id.map(FrameId)))
    }

    pub fn on_link_click(&mut self, href: &str, opens_new_context: bool, is_trusted: bool) -> JsValue {
        let click = LinkClick {
            href: href.to_string(),
            opens_new_context,
            is_trusted,
        };
        verdict_to_js(self.guard.on_link_click(&click))
    }

    pub fn on_frame_added(&mut self, frame_id: i32) {
        self.guard.on_structural_change(&StructuralChange::FrameAdded(FrameId(frame_id)));
    }

    pub fn on_frame_gesture(&mut self, frame_id: i32) {
        self.guard.on_frame_gesture(FrameId(frame_id));
    }

    pub fn on_meta_refresh(&mut self, node_id: u32, content: &str) -> JsValue {
        let change = StructuralChange::MetaRefreshAdded {
            node: NodeId(node_id),
            content: content.to_string(),
        };
        verdict_to_js(self.guard.on_structural_change(&change))
    }

    pub fn on_blur(&mut self) -> JsValue {
        verdict_to_js(self.guard.on_blur())
    }

    pub fn teardown(&mut self) {
        self.guard.teardown();
    }
}

// =============================================================================
// Classifier
// =============================================================================

#[wasm_bindgen]
pub fn looks_like_redirect_hub_js(url: &str) -> bool {
    bk_core::classify::looks_like_redirect_hub(url)
}

#[wasm_bindgen]
pub fn is_legitimate_redirect_js(url: &str, referrer: Option<String>) -> bool {
    bk_core::classify::is_legitimate_redirect(url, referrer.as_deref())
}

#[wasm_bindgen]
pub fn is_suspicious_redirect_js(prev_url: &str, current_url: &str) -> bool {
    bk_core::classify::is_suspicious_redirect(prev_url, current_url)
}

/// Full classification as a plain object.
#[wasm_bindgen]
pub fn classify_js(url: &str, referrer: Option<String>) -> Result<JsValue, JsValue> {
    let classification = bk_core::Classifier::default().classify(url, referrer.as_deref());
    let text = serde_json::to_string(&classification)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize: {}", e)))?;
    js_sys::JSON::parse(&text)
}

#[wasm_bindgen]
pub fn default_config_json() -> String {
    serde_json::to_string(&EngineConfig::default()).unwrap_or_default()
}
