//! Synthetic runtime helpers. These are prepended to every chunk whose
//! printed body actually calls one of them — the linker's printed output
//! references them by name but never declares them itself.
//!
//! Each helper lazily memoizes its wrapped body the same way the
//! module-registry `__require` in the scope-hoisting emitter caches a
//! module's `exports` object after first evaluation; these just do it
//! per-closure instead of through a shared `__modules` table, since the
//! linker inlines each wrapped file as its own closure rather than
//! indexing them by id.

pub const RUNTIME_SOURCE: &str = r#"var __defProp = Object.defineProperty;
var __getOwnPropNames = Object.getOwnPropertyNames;
var __hasOwnProp = Object.prototype.hasOwnProperty;

var __commonJS = (body) => {
  var cached;
  return function () {
    if (!cached) {
      var module = { exports: {} };
      body(module, module.exports);
      cached = module.exports;
    }
    return cached;
  };
};

var __esm = (body) => {
  var ran = false;
  return function () {
    if (!ran) {
      ran = true;
      body();
    }
  };
};

var __export = (target, all) => {
  for (var name in all) {
    __defProp(target, name, { get: all[name], enumerable: true });
  }
};

var __reExport = (target, source) => {
  if (source && typeof source === "object") {
    for (var key of __getOwnPropNames(source)) {
      if (key !== "default" && !__hasOwnProp.call(target, key)) {
        __defProp(target, key, {
          get: () => source[key],
          enumerable: true,
        });
      }
    }
  }
  return target;
};

var __toESM = (mod) => {
  if (mod && mod.__esModule) {
    return mod;
  }
  var target = {};
  __reExport(target, mod);
  __defProp(target, "default", { value: mod, enumerable: true });
  return target;
};

var __toCommonJS = (mod) => {
  var target = {};
  for (var key in mod) {
    target[key] = mod[key];
  }
  return target;
};
"#;

/// Names `print_js` may emit calls to. Checked against a chunk's printed
/// body to decide whether that chunk needs its own copy of the runtime.
const HELPER_NAMES: &[&str] = &["__commonJS", "__esm", "__export", "__reExport", "__toESM", "__toCommonJS"];

/// Whether any helper this runtime defines is actually called in `code`.
#[must_use]
pub fn is_needed_by(code: &str) -> bool {
    HELPER_NAMES.iter().any(|h| code.contains(h))
}
