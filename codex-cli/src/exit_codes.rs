//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use codex_core::CodexError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (bad payload, hash mismatch, unverified image).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Registry unreachable or returned an error.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let code = classify_chain(err).unwrap_or_else(|| classify_message(&message));

        Self {
            code,
            message: Some(message),
        }
    }
}

/// Context attached to every input read; see `utils::read_input`.
const READ_CONTEXT: &str = "Failed to read file";

/// Classify by the typed errors in the chain.
///
/// An I/O error means missing input only while reading; anywhere else,
/// such as writing outputs, it is an I/O failure.
fn classify_chain(err: &anyhow::Error) -> Option<i32> {
    let reading = err
        .chain()
        .any(|cause| cause.to_string().starts_with(READ_CONTEXT));

    err.chain().find_map(|cause| {
        if let Some(codex) = cause.downcast_ref::<CodexError>() {
            return Some(match codex {
                CodexError::RegistryUnavailable(_) | CodexError::HttpError(_) => NETWORK_ERROR,
                CodexError::InvalidGridSize(_) | CodexError::InvalidHash(_) => USAGE_ERROR,
                _ => VERIFICATION_FAILED,
            });
        }
        cause
            .downcast_ref::<std::io::Error>()
            .map(|_| if reading { INPUT_ERROR } else { IO_ERROR })
    })
}

/// Classify by message when no typed error is attached.
fn classify_message(message: &str) -> i32 {
    if message.contains(READ_CONTEXT) {
        INPUT_ERROR
    } else if message.contains("Verification failed") || message.contains("unverified") {
        VERIFICATION_FAILED
    } else if message.contains("Registry") {
        NETWORK_ERROR
    } else if message.contains("Failed to write") {
        IO_ERROR
    } else {
        GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_codex_errors_map_by_kind() {
        let err = anyhow::Error::new(CodexError::MalformedEncoding("x".into()))
            .context("Failed to decode payload");
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);

        let err = anyhow::Error::new(CodexError::RegistryUnavailable("down".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, NETWORK_ERROR);

        let err = anyhow::Error::new(CodexError::InvalidGridSize(7));
        assert_eq!(ExitCode::from_anyhow(&err).code, USAGE_ERROR);
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = std::fs::read("/definitely/not/here")
            .context("Failed to read file: /definitely/not/here")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, INPUT_ERROR);
        assert!(exit.message.unwrap().contains("Failed to read file"));
    }

    #[test]
    fn test_missing_output_dir_is_io_error() {
        let err = std::fs::write("/definitely/not/here/out.json", "{}")
            .context("Failed to write /definitely/not/here/out.json")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, IO_ERROR);
    }

    #[test]
    fn test_message_fallbacks() {
        assert_eq!(
            ExitCode::from_anyhow(&anyhow!("Verification failed: hash mismatch")).code,
            VERIFICATION_FAILED
        );
        assert_eq!(
            ExitCode::from_anyhow(&anyhow!("Failed to write meta file")).code,
            IO_ERROR
        );
        assert_eq!(ExitCode::from_anyhow(&anyhow!("boom")).code, GENERAL_ERROR);
    }
}
