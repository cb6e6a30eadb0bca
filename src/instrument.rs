//! Diagnostic shim for previewed JavaScript.
//!
//! The shim runs inside the isolated context before user code and forwards
//! `console.log`, `console.error`, uncaught errors and unhandled rejections to
//! the parent as `{ type, msg }` messages. Original console behavior is kept.

use regex::Regex;
use std::sync::LazyLock;

/// Matches `//# sourceMappingURL=...` (and the legacy `//@` form) up to end of line.
static SOURCE_MAP_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)//[#@][ \t]*sourceMappingURL=[^\r\n]*").expect("valid source map regex")
});

/// Installed ahead of user code. Posts with a wildcard target origin: the
/// payload is the user's own debug text.
pub const SHIM: &str = r#"(function () {
  var post = function (type, msg) {
    try { parent.postMessage({ type: type, msg: msg }, "*"); } catch (_) {}
  };
  var format = function (args) {
    return Array.prototype.map.call(args, function (arg) {
      if (typeof arg === "string") return arg;
      if (arg instanceof Error) return String(arg);
      try {
        var json = JSON.stringify(arg);
        return json === undefined ? String(arg) : json;
      } catch (_) {
        return String(arg);
      }
    }).join(" ");
  };
  var originalLog = console.log;
  var originalError = console.error;
  console.log = function () {
    post("log", format(arguments));
    return originalLog.apply(console, arguments);
  };
  console.error = function () {
    post("error", format(arguments));
    return originalError.apply(console, arguments);
  };
  window.onerror = function (message, source, line, column) {
    post("error", message + " at " + source + ":" + line + ":" + column);
  };
  window.addEventListener("unhandledrejection", function (event) {
    post("error", "Unhandled Promise: " + event.reason);
  });
})();"#;

/// Remove every source map reference comment from `js`.
pub fn strip_source_maps(js: &str) -> String {
    SOURCE_MAP_COMMENT.replace_all(js, "").into_owned()
}

/// Build the instrumented script block: the shim, then the user's code,
/// each in its own `<script>` element so a syntax error in user code leaves
/// the shim installed.
pub fn instrument(js: &str) -> String {
    let code = strip_source_maps(js);
    format!("<script>\n{SHIM}\n</script>\n<script>\n{code}\n</script>")
}
