//! Headless preview surface - runs a composed document's scripts in a
//! sandboxed V8 isolate.
//!
//! Provides only what previewed scripts need:
//! - window/self, parent.postMessage (forwarded to the host's MessagePort)
//! - addEventListener for "error" / "unhandledrejection", window.onerror
//! - console.log/warn/error (captured, not printed)
//! - atob, btoa, crypto.randomUUID, crypto.getRandomValues
//! - No DOM, fs, net, env, timers or module loading
//!
//! Every `load` builds a fresh isolate; the previous one is dropped together
//! with any pending promises.

use crate::config::PreviewConfig;
use crate::host::PreviewSurface;
use crate::message::{DiagnosticMessage, MessagePort};
use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use deno_core::error::JsError;
use deno_core::{op2, JsRuntime, OpState, PollEventLoopOptions, RuntimeOptions};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, LazyLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Script name reported to `onerror`, matching what an iframe `srcdoc` reports.
const DOCUMENT_URL: &str = "about:srcdoc";

static SCRIPT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("valid script regex")
});

static SRC_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)src\s*=").expect("valid src regex"));

static TYPE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)type\s*=\s*["']?([^"'\s>]*)"#).expect("valid type regex")
});

const CLASSIC_SCRIPT_TYPES: &[&str] = &[
    "",
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
];

/// Set when the isolate was terminated from outside the page's own code.
#[derive(Debug, Clone, Default)]
struct Termination {
    timed_out: Arc<AtomicBool>,
    heap_exhausted: Arc<AtomicBool>,
}

impl Termination {
    fn is_terminated(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst) || self.heap_exhausted.load(Ordering::SeqCst)
    }
}

/// Terminates the isolate once its deadline passes, unless cancelled first.
///
/// Runs on its own OS thread: a spinning script never yields back to the
/// async executor, whatever its flavor.
struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    fn arm(runtime: &mut JsRuntime, deadline: Duration, timed_out: Arc<AtomicBool>) -> Self {
        let isolate_handle = runtime.v8_isolate().thread_safe_handle();
        let (cancel, cancelled) = mpsc::channel::<()>();
        let thread = thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = cancelled.recv_timeout(deadline) {
                timed_out.store(true, Ordering::SeqCst);
                isolate_handle.terminate_execution();
            }
        });
        Self {
            cancel: Some(cancel),
            thread: Some(thread),
        }
    }

    /// Stop the watchdog and wait for it, so the timeout flag is final.
    fn disarm(mut self) {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("preview watchdog thread panicked");
            }
        }
    }
}

/// Captured console output from the preview runtime
#[derive(Debug, Default, Clone)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

// ============================================================================
// Console Ops
// ============================================================================

#[op2(fast)]
fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

// ============================================================================
// Messaging Ops
// ============================================================================

/// `parent.postMessage` - the only way out of the isolate.
#[op2(fast)]
fn op_post_message(state: &mut OpState, #[string] payload: &str) {
    let Some(port) = state.try_borrow::<MessagePort>() else {
        return;
    };
    match serde_json::from_str(payload) {
        Ok(value) => port.post(value),
        Err(e) => debug!(error = %e, "dropping unserializable message"),
    }
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

// ============================================================================
// Encoding Ops
// ============================================================================

#[op2]
#[string]
fn op_btoa(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    // btoa expects Latin-1, but we'll be lenient and accept UTF-8
    Ok(base64::engine::general_purpose::STANDARD.encode(data.as_bytes()))
}

#[op2]
#[string]
fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

deno_core::extension!(
    preview_runtime,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_post_message,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:preview_runtime/bootstrap.js",
    esm = ["ext:preview_runtime/bootstrap.js" = "src/bootstrap.js"],
);

/// Limits applied to each preview isolate.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeLimits {
    /// Maximum heap size in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for one document's scripts in milliseconds (None = unlimited)
    pub timeout_ms: Option<u64>,
}

impl From<&PreviewConfig> for RuntimeLimits {
    fn from(config: &PreviewConfig) -> Self {
        Self {
            max_heap_size: config.max_heap_size,
            timeout_ms: config.timeout_ms,
        }
    }
}

/// Create a sandboxed runtime whose `parent.postMessage` feeds `port`.
pub fn create_runtime(limits: &RuntimeLimits, port: MessagePort) -> Result<JsRuntime> {
    // Configure V8 heap limits if specified
    let create_params = limits.max_heap_size.map(|max_bytes| {
        deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes)
    });

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![preview_runtime::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    let termination = Termination::default();
    if limits.max_heap_size.is_some() {
        let isolate_handle = runtime.v8_isolate().thread_safe_handle();
        let heap_exhausted = Arc::clone(&termination.heap_exhausted);
        runtime.add_near_heap_limit_callback(move |current, initial| {
            warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "preview isolate near heap limit, terminating"
            );
            heap_exhausted.store(true, Ordering::SeqCst);
            isolate_handle.terminate_execution();
            // Headroom so termination can unwind instead of aborting the process.
            current * 2
        });
    }

    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(ConsoleOutput::default());
        state.put(termination);
        state.put(port);
    }

    Ok(runtime)
}

/// A classic inline script found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineScript {
    pub code: String,
}

/// Inline classic scripts in document order. External (`src`) scripts and
/// non-JavaScript types are skipped.
pub fn extract_inline_scripts(document: &str) -> Vec<InlineScript> {
    SCRIPT_ELEMENT
        .captures_iter(document)
        .filter_map(|captures| {
            let attributes = captures.get(1).map_or("", |m| m.as_str());
            if SRC_ATTRIBUTE.is_match(attributes) {
                debug!(attributes, "skipping external script");
                return None;
            }
            let script_type = TYPE_ATTRIBUTE
                .captures(attributes)
                .and_then(|c| c.get(1))
                .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
            if !CLASSIC_SCRIPT_TYPES.contains(&script_type.as_str()) {
                debug!(script_type, "skipping non-classic script");
                return None;
            }
            let code = captures.get(2).map_or("", |m| m.as_str());
            Some(InlineScript {
                code: code.to_string(),
            })
        })
        .collect()
}

/// Preview surface backed by a fresh `deno_core` isolate per document.
///
/// Running past `timeout_ms` or hitting the heap limit terminates the
/// isolate and is reported as a single error diagnostic.
pub struct HeadlessSurface {
    limits: RuntimeLimits,
    port: MessagePort,
    runtime: Option<JsRuntime>,
}

impl HeadlessSurface {
    pub fn new(limits: RuntimeLimits, port: MessagePort) -> Self {
        Self {
            limits,
            port,
            runtime: None,
        }
    }

    /// Console output captured from the currently loaded document.
    pub fn console_output(&mut self) -> ConsoleOutput {
        self.runtime
            .as_mut()
            .and_then(|runtime| {
                runtime
                    .op_state()
                    .borrow()
                    .try_borrow::<ConsoleOutput>()
                    .cloned()
            })
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl PreviewSurface for HeadlessSurface {
    async fn load(&mut self, document: &str) -> Result<()> {
        // Drop the previous context before creating the next isolate.
        self.runtime = None;

        let mut runtime = create_runtime(&self.limits, self.port.clone())?;
        let scripts = extract_inline_scripts(document);
        debug!(scripts = scripts.len(), "running preview document");

        let termination = runtime
            .op_state()
            .borrow()
            .try_borrow::<Termination>()
            .cloned()
            .unwrap_or_default();
        let watchdog = self.limits.timeout_ms.map(|ms| {
            Watchdog::arm(
                &mut runtime,
                Duration::from_millis(ms),
                Arc::clone(&termination.timed_out),
            )
        });

        let result = run_document(&mut runtime, &scripts, &termination).await;

        if let Some(watchdog) = watchdog {
            watchdog.disarm();
        }

        if termination.timed_out.load(Ordering::SeqCst) {
            let ms = self.limits.timeout_ms.unwrap_or_default();
            warn!(timeout_ms = ms, "preview scripts timed out");
            self.port.post(
                DiagnosticMessage::error(format!("Script execution timed out after {ms}ms"))
                    .to_value(),
            );
        } else if termination.heap_exhausted.load(Ordering::SeqCst) {
            self.port
                .post(DiagnosticMessage::error("Preview exceeded its memory limit").to_value());
        } else if let Err(e) = result {
            // Whatever escaped the page's own handlers is still the page's error.
            debug!(error = %e, "preview event loop failed");
            self.port
                .post(DiagnosticMessage::error(e.to_string()).to_value());
        }

        self.runtime = Some(runtime);
        Ok(())
    }
}

async fn run_document(
    runtime: &mut JsRuntime,
    scripts: &[InlineScript],
    termination: &Termination,
) -> Result<()> {
    for script in scripts {
        if termination.is_terminated() {
            return Ok(());
        }
        // A throwing script does not stop later scripts, as in a browser.
        if let Err(err) = runtime.execute_script(DOCUMENT_URL, script.code.clone()) {
            if termination.is_terminated() {
                return Ok(());
            }
            dispatch_script_error(runtime, &err)?;
        }
    }

    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await
}

/// Hand a synchronous script error to the page's `onerror`/`error` listeners.
fn dispatch_script_error(runtime: &mut JsRuntime, err: &Error) -> Result<()> {
    let (message, source, line, column) = match err.downcast_ref::<JsError>() {
        Some(js_error) => {
            let frame = js_error.frames.first();
            (
                js_error.exception_message.clone(),
                frame
                    .and_then(|f| f.file_name.clone())
                    .unwrap_or_else(|| DOCUMENT_URL.to_string()),
                frame.and_then(|f| f.line_number).unwrap_or(0),
                frame.and_then(|f| f.column_number).unwrap_or(0),
            )
        }
        None => (err.to_string(), DOCUMENT_URL.to_string(), 0, 0),
    };

    let call = format!(
        "globalThis.__previewDispatchError__({}, {}, {}, {})",
        serde_json::to_string(&message)?,
        serde_json::to_string(&source)?,
        line,
        column
    );
    if let Err(e) = runtime.execute_script("<preview-error>", call) {
        debug!(error = %e, "error listener dispatch failed");
    }
    Ok(())
}
