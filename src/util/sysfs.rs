use crate::util::error::EcError;
use std::{fs, io, path::Path, str::FromStr};

/// Map an I/O error on `path` into the EC error taxonomy.
///
/// `NotFound` becomes `EcError::InterfaceMissing`, `PermissionDenied` becomes
/// `EcError::PermissionDenied`, everything else is `EcError::Io`.
pub fn classify_io_error(path: &Path, e: &io::Error) -> EcError {
    match e.kind() {
        io::ErrorKind::NotFound => EcError::InterfaceMissing(path.display().to_string()),
        io::ErrorKind::PermissionDenied => {
            EcError::PermissionDenied(format!("Path: {:?}, Error: {}", path.display(), e))
        }
        _ => EcError::Io(format!("Path: {:?}, Error: {}", path.display(), e)),
    }
}

/// Read a value from a sysfs file with consistent error handling
///
/// # Arguments
///
/// * `path` - The file path to read from
///
/// # Returns
///
/// Returns the trimmed contents of the file as a String
///
/// # Errors
///
/// Returns an `EcError` variant based on the specific error:
/// - `EcError::PermissionDenied` if permission is denied
/// - `EcError::InterfaceMissing` if the path doesn't exist
/// - `EcError::Io` for other I/O errors
pub fn read_sysfs_value(path: impl AsRef<Path>) -> Result<String, EcError> {
    let p = path.as_ref();
    fs::read_to_string(p)
        .map_err(|e| classify_io_error(p, &e))
        .map(|s| s.trim().to_string())
}

/// Read a sysfs file and parse its trimmed contents
pub fn read_sysfs_parsed<T: FromStr>(path: impl AsRef<Path>) -> Result<T, EcError> {
    let p = path.as_ref();
    let content = read_sysfs_value(p)?;
    content.parse::<T>().map_err(|_| {
        EcError::Io(format!(
            "Could not parse '{}' from {:?}",
            content,
            p.display()
        ))
    })
}

/// Returns true if the path exists and can be opened for writing
pub fn path_exists_and_writable(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    fs::OpenOptions::new().write(true).open(path).is_ok()
}
