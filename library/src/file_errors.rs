// This module adds context to the io errors produced while writing the
// database and its marker file, so a failed update says which file and
// which operation went wrong and, where we can guess, why.

use std::io::ErrorKind;
use std::path::Path;

/// Describes the type of file operation that failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileOperation {
    CreateDir,
    CreateFile,
    WriteFile,
    ReadFile,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::CreateDir => write!(f, "create directory"),
            FileOperation::CreateFile => write!(f, "create file"),
            FileOperation::WriteFile => write!(f, "write to file"),
            FileOperation::ReadFile => write!(f, "read file"),
        }
    }
}

/// Builds the message for a failed file operation: what was attempted, on
/// which path, the io error itself and a hint when the error kind suggests
/// one.
pub fn enhance_io_error(error: &std::io::Error, operation: FileOperation, path: &Path) -> String {
    let base_message = format!("Failed to {} '{}': {}", operation, path.display(), error);

    match error_hint(error, operation) {
        Some(hint) => format!("{}\nPossible cause: {}", base_message, hint),
        None => base_message,
    }
}

fn error_hint(error: &std::io::Error, operation: FileOperation) -> Option<&'static str> {
    match error.kind() {
        ErrorKind::PermissionDenied => Some(match operation {
            FileOperation::ReadFile => "The process may not have read access to this file.",
            _ => "The process may not have write access to this location.",
        }),
        ErrorKind::NotFound => Some(match operation {
            FileOperation::ReadFile => "The file or directory does not exist.",
            _ => "The parent directory may not exist.",
        }),
        ErrorKind::AlreadyExists => Some("A file or directory with this name already exists."),
        ErrorKind::StorageFull => Some("The disk is full. Free up space and try again."),
        ErrorKind::ReadOnlyFilesystem => Some("The filesystem is mounted as read-only."),
        // A directory sitting where the database file should go.
        ErrorKind::IsADirectory => Some("The path points at a directory, not a file."),
        _ => error.raw_os_error().and_then(os_error_hint),
    }
}

// Unix error codes not covered by ErrorKind.
fn os_error_hint(os_error: i32) -> Option<&'static str> {
    match os_error {
        28 => Some("The disk is full (ENOSPC). Free up space and try again."),
        30 => Some("The filesystem is mounted as read-only (EROFS)."),
        122 => Some("Disk quota exceeded (EDQUOT)."),
        _ => None,
    }
}

/// A trait extension for adding enhanced context to IO Results.
pub trait IoResultExt<T> {
    /// Adds enhanced error context to an IO operation result.
    fn with_file_context(self, operation: FileOperation, path: &Path) -> anyhow::Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_file_context(self, operation: FileOperation, path: &Path) -> anyhow::Result<T> {
        self.map_err(|e| {
            let enhanced_message = enhance_io_error(&e, operation, path);
            anyhow::Error::new(e).context(enhanced_message)
        })
    }
}
