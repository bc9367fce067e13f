use std::path::{Path, PathBuf};

use framepipe_core::ConfigurationError;
use tracing::debug;

/// Resolve the encoder binary.
///
/// Paths with a directory component must exist as given; bare names are
/// searched on `PATH` (with `.exe` appended on Windows).
pub fn locate_binary(binary: &Path) -> Result<PathBuf, ConfigurationError> {
    let not_found = || ConfigurationError::EncoderNotFound { path: binary.display().to_string() };

    if binary.as_os_str().is_empty() {
        return Err(not_found());
    }

    if binary.components().count() > 1 || binary.is_absolute() {
        return if binary.is_file() { Ok(binary.to_path_buf()) } else { Err(not_found()) };
    }

    let path_var = std::env::var_os("PATH").ok_or_else(not_found)?;
    for dir in std::env::split_paths(&path_var) {
        for candidate in candidates(&dir, binary) {
            if candidate.is_file() {
                debug!("Encoder binary resolved: {}", candidate.display());
                return Ok(candidate);
            }
        }
    }

    Err(not_found())
}

fn candidates(dir: &Path, binary: &Path) -> Vec<PathBuf> {
    let plain = dir.join(binary);
    if cfg!(windows) && binary.extension().is_none() {
        vec![plain.with_extension("exe"), plain]
    } else {
        vec![plain]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("ffmpeg");
        assert!(matches!(locate_binary(&bin), Err(ConfigurationError::EncoderNotFound { .. })));

        std::fs::write(&bin, b"").unwrap();
        assert_eq!(locate_binary(&bin).unwrap(), bin);
    }

    #[test]
    fn empty_and_unknown_names_are_rejected() {
        assert!(locate_binary(Path::new("")).is_err());
        assert!(locate_binary(Path::new("definitely-not-an-encoder-3f9a1c")).is_err());
    }
}
