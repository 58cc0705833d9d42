//! Parse-error policy resolution and the notification channel.

use crate::error::{ParseError, ParseErrorKind, Result};
use crate::options::ParseErrorAction;

/// Delivered to parse-error handlers.
///
/// Handlers may change `action` to decide how parsing proceeds; leaving it at
/// [`ParseErrorAction::RaiseEvent`] continues at the next recoverable point.
#[derive(Debug, Clone)]
pub struct ParseErrorEvent {
    pub error: ParseError,
    pub action: ParseErrorAction,
}

/// Subscriber callback for parse errors.
pub type ParseErrorHandler = Box<dyn FnMut(&mut ParseErrorEvent)>;

/// How the caller of [`ErrorPolicy::resolve`] should recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Keep parsing at the best recoverable point.
    Continue,
    /// Drop the rest of the physical line.
    SkipLine,
}

pub(crate) struct ErrorPolicy {
    action: ParseErrorAction,
    handlers: Vec<ParseErrorHandler>,
}

impl ErrorPolicy {
    pub(crate) fn new(action: ParseErrorAction) -> Self {
        Self {
            action,
            handlers: Vec::new(),
        }
    }

    pub(crate) fn action(&self) -> ParseErrorAction {
        self.action
    }

    pub(crate) fn set_action(&mut self, action: ParseErrorAction) {
        self.action = action;
    }

    pub(crate) fn subscribe(&mut self, handler: ParseErrorHandler) {
        self.handlers.push(handler);
    }

    /// Apply the configured action to `error`.
    pub(crate) fn resolve(&mut self, error: ParseError) -> Result<Recovery> {
        match self.action {
            ParseErrorAction::ThrowException => Err(error.into()),
            ParseErrorAction::AdvanceToNextLine => {
                log_skip(&error);
                Ok(Recovery::SkipLine)
            }
            ParseErrorAction::RaiseEvent => {
                if self.handlers.is_empty() {
                    tracing::warn!(
                        record = error.record_index,
                        field = error.field_index,
                        position = error.position,
                        kind = %error.kind,
                        "parse error without subscribers, continuing"
                    );
                    return Ok(Recovery::Continue);
                }
                let mut event = ParseErrorEvent {
                    error,
                    action: ParseErrorAction::RaiseEvent,
                };
                for handler in &mut self.handlers {
                    handler(&mut event);
                }
                match event.action {
                    ParseErrorAction::ThrowException => Err(event.error.into()),
                    ParseErrorAction::RaiseEvent => Ok(Recovery::Continue),
                    ParseErrorAction::AdvanceToNextLine => {
                        log_skip(&event.error);
                        Ok(Recovery::SkipLine)
                    }
                }
            }
        }
    }
}

fn log_skip(error: &ParseError) {
    // Short records are already at the end of their line; nothing is dropped.
    if error.kind == ParseErrorKind::Malformed {
        tracing::warn!(
            record = error.record_index,
            field = error.field_index,
            position = error.position,
            "skipping malformed line"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::CsvError;

    fn sample() -> ParseError {
        ParseError::malformed(3, 1, 7, "raw")
    }

    #[test]
    fn test_throw_returns_error() {
        let mut policy = ErrorPolicy::new(ParseErrorAction::ThrowException);
        let result = policy.resolve(sample());
        assert!(matches!(result, Err(CsvError::Malformed(e)) if e.position == 7));
    }

    #[test]
    fn test_advance_skips_line() {
        let mut policy = ErrorPolicy::new(ParseErrorAction::AdvanceToNextLine);
        assert_eq!(policy.resolve(sample()).expect("skip"), Recovery::SkipLine);
    }

    #[test]
    fn test_raise_event_without_handlers_continues() {
        let mut policy = ErrorPolicy::new(ParseErrorAction::RaiseEvent);
        assert_eq!(policy.resolve(sample()).expect("continue"), Recovery::Continue);
    }

    #[test]
    fn test_handlers_see_every_error() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut policy = ErrorPolicy::new(ParseErrorAction::RaiseEvent);
        let sink = Rc::clone(&seen);
        policy.subscribe(Box::new(move |event| sink.borrow_mut().push(event.error.clone())));

        policy.resolve(sample()).expect("first");
        policy.resolve(ParseError::missing_field(4, 2, 0, "")).expect("second");

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].record_index, 3);
        assert_eq!(seen[1].kind, ParseErrorKind::MissingField);
    }

    #[test]
    fn test_handler_can_change_action() {
        let mut policy = ErrorPolicy::new(ParseErrorAction::RaiseEvent);
        policy.subscribe(Box::new(|event| {
            event.action = ParseErrorAction::AdvanceToNextLine;
        }));
        assert_eq!(policy.resolve(sample()).expect("skip"), Recovery::SkipLine);

        policy.subscribe(Box::new(|event| {
            event.action = ParseErrorAction::ThrowException;
        }));
        assert!(policy.resolve(sample()).is_err());
    }
}
