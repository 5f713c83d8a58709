use std::path::Path;

use thiserror::Error;

/// `dwSignature` of a `VS_FIXEDFILEINFO` block, little-endian.
const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = 0xFEEF_04BD_u32.to_le_bytes();
/// Signature, struct version, file version MS, file version LS.
const FIXED_FILE_INFO_PREFIX_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read executable {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("executable {path} has no embedded file version")]
    MissingVersionInfo { path: String },
}

/// Reads the version an installed executable declares about itself.
pub trait VersionProbe: Send + Sync {
    /// # Errors
    /// Returns an error if the executable cannot be read or declares no
    /// version.
    fn file_version(&self, executable: &Path) -> Result<String, ProbeError>;
}

/// Reads the file version from the `VS_FIXEDFILEINFO` resource of a PE
/// executable.
///
/// The executable is scanned as bytes, so this works on any host OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeVersionProbe;

impl VersionProbe for PeVersionProbe {
    fn file_version(&self, executable: &Path) -> Result<String, ProbeError> {
        let bytes = std::fs::read(executable).map_err(|source| ProbeError::Io {
            path: executable.display().to_string(),
            source,
        })?;

        fixed_file_version(&bytes).ok_or_else(|| ProbeError::MissingVersionInfo {
            path: executable.display().to_string(),
        })
    }
}

fn fixed_file_version(bytes: &[u8]) -> Option<String> {
    let start = bytes
        .windows(FIXED_FILE_INFO_SIGNATURE.len())
        .enumerate()
        .filter(|(_, window)| *window == FIXED_FILE_INFO_SIGNATURE)
        .map(|(offset, _)| offset)
        .find(|offset| offset + FIXED_FILE_INFO_PREFIX_LEN <= bytes.len())?;

    let most_significant = read_u32_le(bytes, start + 8)?;
    let least_significant = read_u32_le(bytes, start + 12)?;

    Some(format!(
        "{}.{}.{}.{}",
        most_significant >> 16,
        most_significant & 0xFFFF,
        least_significant >> 16,
        least_significant & 0xFFFF
    ))
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}
