use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use tracing_error::{SpanTrace, SpanTraceStatus};

/* 📖 # Error model

The host fails in two ways that callers care about: an I/O operation on a
path failed, or something else went wrong and a message says what. Each
layer on the way up attaches a context string. The span trace captured at
creation shows which page and which operation were active, because the
loader and watcher run inside `tracing` spans.

Handler-module failures are not errors of this type. They are reported as
`ModuleLoadError` and never stop the host.
*/

#[derive(Debug)]
pub enum ErrorKind {
    /// An I/O operation on `path` failed.
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },
    Message { message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::FileError { path, source } => {
                write!(f, "File error at {}: {}", path.display(), source)
            }
            ErrorKind::Message { message } => f.write_str(message),
        }
    }
}

/// An [`ErrorKind`] plus the context strings attached while it propagated.
pub struct PageHostError {
    kind: ErrorKind,
    context: Vec<String>,
    span_trace: SpanTrace,
}

impl PageHostError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::new(ErrorKind::FileError {
            path: path.into(),
            source,
        })
    }

    /// Outermost context goes first when displayed, so attach from the inside out.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.insert(0, context.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// True when the error is an I/O failure of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(&self.kind, ErrorKind::FileError { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<ErrorKind> for PageHostError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl StdError for PageHostError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            ErrorKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for PageHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for context in &self.context {
            write!(f, "{context}: ")?;
        }
        self.kind.fmt(f)
    }
}

impl fmt::Debug for PageHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        let last = self.context.len().saturating_sub(1);
        for (i, context) in self.context.iter().enumerate() {
            let branch = if i == last { "└─" } else { "├─" };
            writeln!(f, "{branch} {context}")?;
        }
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            writeln!(f, "Trace: {}", self.span_trace)?;
        }
        Ok(())
    }
}

/// Result of fallible host operations. The error is boxed to keep `Ok` paths small.
pub type PageHostResult<T> = std::result::Result<T, Box<PageHostError>>;

pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> PageHostResult<T>;

    /// Like [`ResultExt::context`], building the string only on error.
    fn with_context<F>(self, f: F) -> PageHostResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for PageHostResult<T> {
    fn context(self, context: impl Into<String>) -> PageHostResult<T> {
        self.map_err(|error| Box::new(error.context(context)))
    }

    fn with_context<F>(self, f: F) -> PageHostResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|error| Box::new(error.context(f())))
    }
}

/// Boxed message error from format arguments.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        Box::new($crate::PageHostError::message(format!($($arg)*)))
    };
}

/// Return early with [`err!`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use std::io;

    #[test]
    fn test_file_error() {
        let error = PageHostError::file("/tmp/pages", io::Error::new(io::ErrorKind::NotFound, "not found"));
        assert!(error.is_not_found());
        assert!(error.source().is_some());
        assert!(matches!(error.kind(), ErrorKind::FileError { path, .. } if path == &PathBuf::from("/tmp/pages")));
        expect!["File error at /tmp/pages: not found"].assert_eq(&error.to_string());

        let denied = PageHostError::file("pages", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(!denied.is_not_found());
    }

    #[test]
    fn test_macros() {
        fn check(port: u16) -> PageHostResult<u16> {
            if port == 0 {
                bail!("port must not be {}", port);
            }
            Ok(port)
        }
        assert_eq!(check(8000).unwrap(), 8000);
        assert_eq!(check(0).unwrap_err().to_string(), "port must not be 0");
        assert!(!err!("page '{}' is broken", "beta").is_not_found());
    }

    #[test]
    fn test_context_reads_outside_in() {
        let result: PageHostResult<()> = Err(err!("permission denied"));
        let error = result
            .context("reading alpha/index.html")
            .with_context(|| "loading page alpha".to_string())
            .unwrap_err();
        expect!["loading page alpha: reading alpha/index.html: permission denied"]
            .assert_eq(&error.to_string());
        expect![[r#"
            permission denied
            ├─ loading page alpha
            └─ reading alpha/index.html
        "#]]
        .assert_debug_eq(&error);
    }

    #[test]
    fn test_context_on_success_is_noop() {
        let result: PageHostResult<i32> = Ok(42);
        assert_eq!(result.context("unused").unwrap(), 42);
    }
}
