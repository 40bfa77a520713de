use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::span::Location;

/// Classification of everything the readers and decoders can reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
pub enum ErrorKind {
    #[error("malformed integer")]
    MalformedInteger,
    #[error("length out of bounds")]
    LengthOutOfBounds,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("section size mismatch")]
    SectionSizeMismatch,
    #[error("section out of order")]
    SectionOrder,
    #[error("unknown section id")]
    UnknownSectionId,
    #[error("data count mismatch")]
    DataCountMismatch,
    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,
    #[error("unknown opcode")]
    UnknownOpcode,
    #[error("invalid flags")]
    InvalidFlags,
    #[error("invalid type encoding")]
    InvalidType,
    #[error("lexical error")]
    Lexical,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("undefined identifier")]
    UndefinedIdentifier,
    #[error("duplicate identifier")]
    DuplicateIdentifier,
    #[error("imports must occur before all non-import definitions")]
    ImportAfterNonImport,
    #[error("multiple start sections")]
    MultipleStart,
    #[error("alignment must be a power of two")]
    InvalidAlignment,
    #[error("numeric literal out of range")]
    LiteralOutOfRange,
    #[error("invalid NaN payload")]
    InvalidNanPayload,
    #[error("feature disabled")]
    FeatureDisabled,
}

/// One frame of the description stack pushed around each recursive
/// production ("reading function 3", "in section \"code\"", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFrame {
    pub loc: Option<Location>,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<Location>,
    pub context: Vec<ContextFrame>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = self.loc {
            write!(f, "{loc}: ")?;
        }
        write!(f, "{}", self.message)?;
        for frame in self.context.iter().rev() {
            write!(f, "\n  in {}", frame.desc)?;
        }
        Ok(())
    }
}

/// Accumulating error sink. A failed production reports here and returns
/// `None`; the surrounding reader continues so that a compilation unit can
/// surface as many errors as possible.
#[derive(Debug, Default)]
pub struct Errors {
    errors: Vec<Error>,
    context: Vec<ContextFrame>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_context(&mut self, loc: Option<Location>, desc: impl Into<String>) {
        self.context.push(ContextFrame {
            loc,
            desc: desc.into(),
        });
    }

    pub fn pop_context(&mut self) {
        self.context.pop();
    }

    pub fn report(&mut self, loc: Option<Location>, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        log::debug!("error at {loc:?}: {message}");
        self.errors.push(Error {
            kind,
            message,
            loc,
            context: self.context.clone(),
        });
    }

    /// Report with the kind's canonical message.
    pub fn report_kind(&mut self, loc: Option<Location>, kind: ErrorKind) {
        self.report(loc, kind, kind.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<Error> {
        self.errors
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_stack_is_attached_to_reports() {
        let mut errors = Errors::new();
        errors.push_context(None, "section \"code\"");
        errors.push_context(None, "function 3");
        errors.report_kind(Some(Location::new(10, 11)), ErrorKind::UnknownOpcode);
        errors.pop_context();
        errors.pop_context();
        errors.report_kind(None, ErrorKind::DataCountMismatch);

        let errors = errors.into_vec();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].context.len(), 2);
        assert_eq!(errors[0].context[1].desc, "function 3");
        assert!(errors[1].context.is_empty());
    }

    #[test]
    fn errors_accumulate() {
        let mut errors = Errors::new();
        errors.report_kind(None, ErrorKind::MalformedInteger);
        errors.report_kind(None, ErrorKind::LengthOutOfBounds);
        assert_eq!(errors.len(), 2);
        assert!(errors.has_kind(ErrorKind::MalformedInteger));
        assert!(!errors.has_kind(ErrorKind::BadMagic));
    }
}
