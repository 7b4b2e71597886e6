use openxr::sys;
use thiserror::Error;
use tracing::error;

use crate::runtime::XrResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("runtime call failed: {0}")]
    Runtime(sys::Result),
    #[error("call order invalid: {0}")]
    CallOrder(&'static str),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Native result code; call-order violations map to `XR_ERROR_CALL_ORDER_INVALID`.
    pub fn code(&self) -> sys::Result {
        match self {
            ProviderError::Runtime(code) => *code,
            ProviderError::CallOrder(_) => sys::Result::ERROR_CALL_ORDER_INVALID,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        self.code() == sys::Result::ERROR_FEATURE_UNSUPPORTED
    }

    pub fn unsupported() -> Self {
        ProviderError::Runtime(sys::Result::ERROR_FEATURE_UNSUPPORTED)
    }

    pub fn validation() -> Self {
        ProviderError::Runtime(sys::Result::ERROR_VALIDATION_FAILURE)
    }

    pub fn runtime_failure() -> Self {
        ProviderError::Runtime(sys::Result::ERROR_RUNTIME_FAILURE)
    }
}

impl From<sys::Result> for ProviderError {
    fn from(code: sys::Result) -> Self {
        ProviderError::Runtime(code)
    }
}

/// Converts a runtime result, logging a failure once with its runtime name.
pub fn check<T>(result: XrResult<T>, what: &str) -> ProviderResult<T> {
    result.map_err(|code| {
        error!("{what} failed: {code}");
        ProviderError::Runtime(code)
    })
}

/// Logs and builds a call-order error.
pub fn call_order<T>(what: &'static str) -> ProviderResult<T> {
    error!("call order invalid: {what}");
    Err(ProviderError::CallOrder(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_order_maps_to_native_code() {
        let err = ProviderError::CallOrder("session not initialized");
        assert_eq!(err.code(), sys::Result::ERROR_CALL_ORDER_INVALID);
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_runtime_code_is_preserved() {
        let err: ProviderError = sys::Result::ERROR_SESSION_LOST.into();
        assert_eq!(err.code(), sys::Result::ERROR_SESSION_LOST);
        assert!(ProviderError::unsupported().is_unsupported());
    }

    #[test]
    fn test_check_passes_success_through() {
        let ok: XrResult<u32> = Ok(7);
        assert_eq!(check(ok, "noop"), Ok(7));
        let failed: XrResult<u32> = Err(sys::Result::ERROR_RUNTIME_FAILURE);
        assert_eq!(check(failed, "noop"), Err(ProviderError::runtime_failure()));
    }
}
