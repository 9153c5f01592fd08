pub mod bindings;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod sequencer;

pub use bindings::JsCountLog;
pub use config::CountLogConfig;
pub use environment::{BrowserEnvironment, Environment};
pub use error::{ConfigError, EnvError, SequenceError, ValidationError};
pub use event::{
    flatten_query, BeaconRequest, EventKind, LogParams, LogValue, Navigation, PageIdentifier,
    ParameterBundle,
};
pub use sequencer::{validate, EventSequencer, Invocation};

use wasm_bindgen::prelude::*;

/// Runs once when the wasm module is instantiated
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}
