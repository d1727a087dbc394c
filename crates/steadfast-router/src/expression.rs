//! Ack and failure expressions.
//!
//! Expressions are written `#[...]` and evaluated against the event a route
//! returned. [`BasicEvaluator`] understands a small fixed grammar:
//!
//! | Expression              | Value                                        |
//! |-------------------------|----------------------------------------------|
//! | `#[string:TEXT]`        | the literal `TEXT`                           |
//! | `#[regex('PATTERN')]`   | whether the payload text matches `PATTERN`   |
//! | `#[payload]`            | the payload as text                          |
//! | `#[correlationId]`      | the correlation id                           |
//! | `#[attribute:NAME]`     | the attribute value, or null when absent     |
//! | `#[true]`, `#[false]`   | the boolean                                  |
//!
//! Other evaluators can be plugged in through [`ExpressionEvaluator`].

use std::fmt;

use regex::Regex;
use serde_json::Value;
use steadfast_core::Event;
use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// The expression does not follow a supported form.
    #[error("unsupported expression `{expression}`")]
    Unsupported {
        /// Offending expression
        expression: String,
    },

    /// A regex expression carries a pattern that does not compile.
    #[error("invalid pattern in `{expression}`: {message}")]
    InvalidPattern {
        /// Offending expression
        expression: String,
        /// Regex compiler message
        message: String,
    },
}

/// Evaluates ack and failure expressions against events.
pub trait ExpressionEvaluator: Send + Sync + fmt::Debug {
    /// Checks that `expression` can be evaluated, without an event.
    fn validate(&self, expression: &str) -> Result<(), ExpressionError>;

    /// Evaluates `expression` against `event`.
    fn evaluate(&self, expression: &str, event: &Event) -> Result<Value, ExpressionError>;
}

/// Returns true for boolean `true` and for the string `"true"` in any case.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Evaluator for the built-in `#[...]` expression forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEvaluator;

impl BasicEvaluator {
    /// Creates a new evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for BasicEvaluator {
    fn validate(&self, expression: &str) -> Result<(), ExpressionError> {
        Parsed::parse(expression).map(|_| ())
    }

    fn evaluate(&self, expression: &str, event: &Event) -> Result<Value, ExpressionError> {
        let value = match Parsed::parse(expression)? {
            Parsed::Literal(text) => Value::String(text.to_owned()),
            Parsed::Matches(regex) => Value::Bool(regex.is_match(&event.payload_text())),
            Parsed::Payload => Value::String(event.payload_text().into_owned()),
            Parsed::CorrelationId => Value::String(event.correlation_id().to_string()),
            Parsed::Attribute(name) => {
                event.attribute(name).map_or(Value::Null, |value| Value::String(value.to_owned()))
            },
            Parsed::Bool(flag) => Value::Bool(flag),
        };
        Ok(value)
    }
}

enum Parsed<'a> {
    Literal(&'a str),
    Matches(Regex),
    Payload,
    CorrelationId,
    Attribute(&'a str),
    Bool(bool),
}

impl<'a> Parsed<'a> {
    fn parse(expression: &'a str) -> Result<Self, ExpressionError> {
        let unsupported = || ExpressionError::Unsupported { expression: expression.to_owned() };

        let body = expression
            .trim()
            .strip_prefix("#[")
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(unsupported)?;

        if let Some(text) = body.strip_prefix("string:") {
            return Ok(Self::Literal(text));
        }

        let body = body.trim();
        if let Some(name) = body.strip_prefix("attribute:") {
            let name = name.trim();
            if name.is_empty() {
                return Err(unsupported());
            }
            return Ok(Self::Attribute(name));
        }

        if let Some(argument) = body.strip_prefix("regex(").and_then(|rest| rest.strip_suffix(')')) {
            let pattern = unquote(argument.trim()).ok_or_else(unsupported)?;
            let regex = Regex::new(pattern).map_err(|error| ExpressionError::InvalidPattern {
                expression: expression.to_owned(),
                message: error.to_string(),
            })?;
            return Ok(Self::Matches(regex));
        }

        match body {
            "payload" => Ok(Self::Payload),
            "correlationId" => Ok(Self::CorrelationId),
            "true" => Ok(Self::Bool(true)),
            "false" => Ok(Self::Bool(false)),
            _ => Err(unsupported()),
        }
    }
}

fn unquote(argument: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|quote| {
        argument.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(expression: &str, event: &Event) -> Value {
        BasicEvaluator::new().evaluate(expression, event).expect("expression should evaluate")
    }

    #[test]
    fn string_literal_is_returned_verbatim() {
        let event = Event::new("ignored");

        assert_eq!(evaluate("#[string:ACK]", &event), Value::String("ACK".into()));
        assert_eq!(evaluate("#[string: spaced ]", &event), Value::String(" spaced ".into()));
    }

    #[test]
    fn case_insensitive_error_regex_matches_only_error_payloads() {
        let expression = "#[regex('(?i)error')]";

        assert_eq!(evaluate(expression, &Event::new("test_data")), Value::Bool(false));
        assert_eq!(evaluate(expression, &Event::new("ERROR")), Value::Bool(true));
        assert_eq!(evaluate(expression, &Event::new("an error occurred")), Value::Bool(true));
    }

    #[test]
    fn regex_accepts_double_quotes() {
        assert_eq!(evaluate("#[regex(\"^ok$\")]", &Event::new("ok")), Value::Bool(true));
    }

    #[test]
    fn event_fields_are_readable() {
        let event = Event::new("body").with_correlation_id("corr-9").with_attribute("status", "ok");

        assert_eq!(evaluate("#[payload]", &event), Value::String("body".into()));
        assert_eq!(evaluate("#[correlationId]", &event), Value::String("corr-9".into()));
        assert_eq!(evaluate("#[attribute:status]", &event), Value::String("ok".into()));
        assert_eq!(evaluate("#[attribute:missing]", &event), Value::Null);
        assert_eq!(evaluate("  #[ true ]  ", &event), Value::Bool(true));
    }

    #[test]
    fn malformed_expressions_fail_validation() {
        let evaluator = BasicEvaluator::new();

        for expression in ["payload", "#[unknown]", "#[regex(error)]", "#[attribute:]", "#["] {
            assert!(
                matches!(
                    evaluator.validate(expression),
                    Err(ExpressionError::Unsupported { .. })
                ),
                "{expression} should be rejected"
            );
        }
    }

    #[test]
    fn uncompilable_pattern_is_reported() {
        let result = BasicEvaluator::new().validate("#[regex('(unclosed')]");

        assert!(matches!(result, Err(ExpressionError::InvalidPattern { .. })));
    }

    #[test]
    fn truthiness_accepts_booleans_and_true_strings() {
        assert!(is_truthy(&Value::Bool(true)));
        assert!(is_truthy(&Value::String("TRUE".into())));
        assert!(!is_truthy(&Value::Bool(false)));
        assert!(!is_truthy(&Value::String("yes".into())));
        assert!(!is_truthy(&Value::Null));
    }
}
