use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into three groups. Structural problems with the input program
/// ([`Error::Malformed`], [`Error::UnknownClass`], ...) abort the operation that hit them.
/// [`Error::Verification`] is raised by the post-rewrite verifier and aborts the whole
/// rewrite batch, since partially instrumented output is unsafe to ship. Recoverable
/// conditions (missing instrumentation metadata, unsupported array shapes) never surface
/// here; they are recorded as events in the [`crate::rewrite::EventLog`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The program is structurally broken and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The post-rewrite verifier rejected a method body.
    ///
    /// Raised once all passes have completed. The first violation is reported here,
    /// every other violation is logged.
    #[error("Verification failed in {method}: {message} ({count} violation(s))")]
    Verification {
        /// Fully qualified method in which the first violation was found
        method: String,
        /// Description of the first violation
        message: String,
        /// Total number of violations found in the batch
        count: usize,
    },

    /// A class was referenced that is not part of the program.
    #[error("Unknown class - {0}")]
    UnknownClass(String),

    /// A method could not be resolved on the given class or its superclasses.
    #[error("Unknown method - {0}")]
    UnknownMethod(String),

    /// A field could not be resolved on the given class.
    #[error("Unknown field - {0}")]
    UnknownField(String),

    /// A class with the same name is already registered in the program.
    #[error("Duplicate class - {0}")]
    DuplicateClass(String),

    /// A textual type could not be parsed.
    #[error("Invalid type - '{0}'")]
    TypeParse(String),

    /// The emulator hit a runtime fault (null dereference, bad index, type confusion).
    #[error("Emulation fault - {0}")]
    Emulation(String),

    /// The emulator exceeded one of its configured execution limits.
    #[error("Emulation limit exceeded - {0}")]
    LimitExceeded(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A program image or report could not be (de)serialized.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
