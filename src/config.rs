//! Process-wide configuration flags
//!
//! Each flag is sourced from an environment variable, parsed once at first
//! use, and fixed for the process lifetime. Kernel backend selection and the
//! state-dict load policy read these; nothing re-evaluates them per call.

use std::sync::LazyLock;

/// Parse a lenient boolean string, falling back to `default` when the
/// variable is unset or unrecognized.
fn env_to_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "y" | "t" => true,
            "0" | "false" | "no" | "off" | "n" | "f" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

static IGNORE_MISSING_KEYS: LazyLock<bool> =
    LazyLock::new(|| env_to_bool("CUANTIZAR_IGNORE_MISSING_KEYS", false));

static NATIVE_KERNELS: LazyLock<bool> =
    LazyLock::new(|| env_to_bool("CUANTIZAR_NATIVE_KERNELS", true));

static PARALLEL_KERNELS: LazyLock<bool> =
    LazyLock::new(|| env_to_bool("CUANTIZAR_PARALLEL_KERNELS", false));

static VERBOSE: LazyLock<bool> = LazyLock::new(|| env_to_bool("CUANTIZAR_VERBOSE", false));

/// Tolerate missing learnable-parameter keys during state-dict load.
///
/// Env: `CUANTIZAR_IGNORE_MISSING_KEYS`, default `false`.
pub fn ignore_missing_keys() -> bool {
    *IGNORE_MISSING_KEYS
}

/// Select the vectorized kernel backend for the STE primitives.
///
/// Env: `CUANTIZAR_NATIVE_KERNELS`, default `true`. When disabled the scalar
/// reference backend is used instead.
pub fn native_kernels() -> bool {
    *NATIVE_KERNELS
}

/// Wrap the selected kernel backend in the chunk-parallel executor.
///
/// Env: `CUANTIZAR_PARALLEL_KERNELS`, default `false`.
pub fn parallel_kernels() -> bool {
    *PARALLEL_KERNELS
}

/// Emit debug-level events for state-dict loads and export passes.
///
/// Env: `CUANTIZAR_VERBOSE`, default `false`.
pub fn verbose() -> bool {
    *VERBOSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_to_bool_truthy() {
        for val in ["1", "true", "TRUE", "Yes", "on", "y"] {
            std::env::set_var("CUANTIZAR_TEST_FLAG", val);
            assert!(env_to_bool("CUANTIZAR_TEST_FLAG", false), "{val} should parse true");
        }
        std::env::remove_var("CUANTIZAR_TEST_FLAG");
    }

    #[test]
    fn test_env_to_bool_falsy() {
        for val in ["0", "false", "NO", "off", "f"] {
            std::env::set_var("CUANTIZAR_TEST_FLAG_F", val);
            assert!(!env_to_bool("CUANTIZAR_TEST_FLAG_F", true), "{val} should parse false");
        }
        std::env::remove_var("CUANTIZAR_TEST_FLAG_F");
    }

    #[test]
    fn test_env_to_bool_unset_uses_default() {
        std::env::remove_var("CUANTIZAR_TEST_FLAG_UNSET");
        assert!(env_to_bool("CUANTIZAR_TEST_FLAG_UNSET", true));
        assert!(!env_to_bool("CUANTIZAR_TEST_FLAG_UNSET", false));
    }

    #[test]
    fn test_env_to_bool_garbage_uses_default() {
        std::env::set_var("CUANTIZAR_TEST_FLAG_G", "maybe");
        assert!(env_to_bool("CUANTIZAR_TEST_FLAG_G", true));
        std::env::remove_var("CUANTIZAR_TEST_FLAG_G");
    }

    #[test]
    fn test_defaults() {
        // Accessors must be callable and stable across calls.
        assert_eq!(native_kernels(), native_kernels());
        assert_eq!(ignore_missing_keys(), ignore_missing_keys());
        assert_eq!(parallel_kernels(), parallel_kernels());
        assert_eq!(verbose(), verbose());
    }
}
