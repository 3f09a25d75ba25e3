use core::fmt;
use std::borrow::Cow;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum TemplateError {
    SyntaxError(Cow<'static, str>),
    MissingHelper(Cow<'static, str>),
    MissingPartial(Cow<'static, str>),
    RenderError(Cow<'static, str>),
    Io { path: PathBuf, source: io::Error },
}

macro_rules! bail_syntax_error {
    ($msg:expr, $($arg:tt)*) => { return Err(TemplateError::SyntaxError(format!($msg, $($arg)*).into())) };
    ($msg:expr) =>              { return Err(TemplateError::SyntaxError(format!($msg).into())) };
}

macro_rules! bail_render_error {
    ($msg:expr, $($arg:tt)*) => { return Err(TemplateError::RenderError(format!($msg, $($arg)*).into())) };
    ($msg:expr) =>              { return Err(TemplateError::RenderError(format!($msg).into())) };
}

pub(crate) use {bail_render_error, bail_syntax_error};

pub trait ErrorContext: Sized {
    type Ok;
    fn with_context_syntax<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<Self::Ok, TemplateError>;
}

impl<T, E: fmt::Display> ErrorContext for Result<T, E> {
    type Ok = T;
    fn with_context_syntax<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, TemplateError> {
        self.map_err(|e| TemplateError::SyntaxError(Cow::from(format!("{}: {}", f().into(), e))))
    }
}

impl<T> ErrorContext for Option<T> {
    type Ok = T;
    fn with_context_syntax<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, TemplateError> {
        self.ok_or_else(|| TemplateError::SyntaxError(f().into()))
    }
}

impl TemplateError {
    /// Prefixes syntax errors with the template they were found in.
    pub(crate) fn in_template(self, name: &str) -> Self {
        match self {
            TemplateError::SyntaxError(msg) => {
                TemplateError::SyntaxError(format!("{name}: {msg}").into())
            }
            other => other,
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TemplateError::SyntaxError(msg) => write!(f, "Parse error: {}", msg),
            TemplateError::MissingHelper(name) => write!(f, "Missing helper: \"{}\"", name),
            TemplateError::MissingPartial(name) => {
                write!(f, "The partial {} could not be found", name)
            }
            TemplateError::RenderError(msg) => write!(f, "Render error: {}", msg),
            TemplateError::Io { path, source } => {
                write!(f, "Cannot access template {}: {}", path.display(), source)
            }
        }
    }
}

impl core::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            TemplateError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
