// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec calls go through run_with_panic_policy so a panic inside a decoder
// surfaces as an error instead of unwinding through the caller's worker.

use crate::error::{ProcessorError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, converting a panic into `ProcessorError::InternalPanic`.
///
/// `stage` names the codec call (e.g. `"decode:png"`) and ends up in the
/// error message.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(target: "asset_processor::pipeline", stage, %detail, "codec panicked");
            Err(ProcessorError::internal_panic(format!("{stage}: {detail}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_results() {
        let ok: Result<u32> = run_with_panic_policy("test:ok", || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32> =
            run_with_panic_policy("test:err", || Err(ProcessorError::decode_failed("bad")));
        assert!(matches!(err, Err(ProcessorError::DecodeFailed { .. })));
    }

    #[test]
    fn converts_panics_into_internal_errors() {
        let result: Result<()> = run_with_panic_policy("test:panic", || panic!("boom"));
        let err = result.unwrap_err();
        assert!(matches!(err, ProcessorError::InternalPanic { .. }));
        assert_eq!(err.to_string(), "Internal error: test:panic: boom");
    }
}
