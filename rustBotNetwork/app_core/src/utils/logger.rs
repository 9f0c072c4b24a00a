use log::kv::{self, Key, Value, Visitor};
use log::{Log, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;

// --- Thread-local campaign ID storage ---

thread_local! {
    static CURRENT_CAMPAIGN_ID: RefCell<Option<String>> = RefCell::new(None);
}

/// Sets the current campaign ID for the calling thread. Every log record
/// emitted underneath, until cleared, carries this ID.
pub fn set_current_campaign_id(campaign_id: impl Into<String>) {
    let campaign_id = campaign_id.into();
    CURRENT_CAMPAIGN_ID.with(|cell| *cell.borrow_mut() = Some(campaign_id));
}

pub fn clear_current_campaign_id() {
    CURRENT_CAMPAIGN_ID.with(|cell| *cell.borrow_mut() = None);
}

/// Runs `f` with `campaign_id` pushed onto the thread-local logging context,
/// restoring the previous value afterwards. Used to bracket one
/// `run`/`run_cycle`/`execute_proposal`/`verify_proposal` call.
pub fn with_campaign_context<R>(campaign_id: &str, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CAMPAIGN_ID.with(|cell| cell.borrow().clone());
    set_current_campaign_id(campaign_id.to_string());
    let result = f();
    CURRENT_CAMPAIGN_ID.with(|cell| *cell.borrow_mut() = previous);
    result
}

// --- Log record structure for JSON output ---

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLogRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub campaign_id: Option<String>,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

struct JsonLogger;

struct KeyValueCollector<'a>(&'a mut HashMap<String, serde_json::Value>);

impl<'a> Visitor<'a> for KeyValueCollector<'a> {
    fn visit_pair(&mut self, key: Key<'a>, value: Value<'a>) -> Result<(), kv::Error> {
        self.0
            .insert(key.as_str().to_string(), json!(value.to_string()));
        Ok(())
    }
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let campaign_id = CURRENT_CAMPAIGN_ID.with(|cell| cell.borrow().clone());

        let mut extra = HashMap::new();
        let mut collector = KeyValueCollector(&mut extra);
        if let Err(e) = record.key_values().visit(&mut collector) {
            eprintln!("logger: failed to visit key-value pairs: {:?}", e);
        }

        let log_record = JsonLogRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: record.level().to_string(),
            message: format!("{}", record.args()),
            campaign_id,
            target: record.target().to_string(),
            module_path: record.module_path().map(|s| s.to_string()),
            file: record.file().map(|s| s.to_string()),
            line: record.line(),
            extra,
        };

        println!(
            "{}",
            serde_json::to_string(&log_record).expect("log record must serialize")
        );
    }

    fn flush(&self) {}
}

static LOGGER: JsonLogger = JsonLogger;
static INIT_LOGGER_ONCE: OnceCell<()> = OnceCell::new();

/// Initializes the JSON logger. Safe to call more than once; only the first
/// call takes effect.
pub fn init_logger() -> Result<(), SetLoggerError> {
    INIT_LOGGER_ONCE
        .get_or_try_init(|| {
            log::set_logger(&LOGGER)?;
            log::set_max_level(log::LevelFilter::Info);
            Ok(())
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::info;

    #[test]
    fn with_campaign_context_restores_previous_value() {
        let _ = init_logger();
        set_current_campaign_id("outer");
        with_campaign_context("inner", || {
            info!(target: "engine", "nested log line");
        });
        let restored = CURRENT_CAMPAIGN_ID.with(|cell| cell.borrow().clone());
        assert_eq!(restored.as_deref(), Some("outer"));
        clear_current_campaign_id();
    }
}
