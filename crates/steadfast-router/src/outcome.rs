//! Classification of a single delivery attempt.
//!
//! The classifier turns what a route did into one of three outcomes. It
//! decides nothing about timing or persistence; strategies act on the
//! outcome.

use std::{fmt, sync::Arc};

use serde_json::Value;
use steadfast_core::Event;
use tracing::warn;

use crate::{
    error::Result,
    expression::{is_truthy, ExpressionError, ExpressionEvaluator},
    policy::RetryPolicy,
    route::RouteError,
};

/// Acknowledgement returned to the caller of `Router::process`.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// No acknowledgement content.
    NoContent,
    /// The value of the configured ack expression.
    Value(Value),
}

/// Why an attempt counted as failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// The route raised an error.
    Route(RouteError),
    /// The route returned, but the failure expression evaluated truthy.
    FailureExpression {
        /// The expression that matched
        expression: String,
    },
    /// The failure expression could not be evaluated.
    Evaluation(ExpressionError),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route(error) => write!(f, "{error}"),
            Self::FailureExpression { expression } => {
                write!(f, "failure expression {expression} matched")
            },
            Self::Evaluation(error) => write!(f, "failure expression not evaluable: {error}"),
        }
    }
}

/// Classified result of one attempt.
///
/// Every variant carries the event the next step should use: the result
/// event on success, and on failure the event to retry or dead-letter.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The attempt succeeded.
    Success {
        /// Event returned by the route
        event: Event,
        /// Acknowledgement for the caller
        ack: Ack,
    },
    /// The attempt failed and retries remain.
    TransientFailure {
        /// Event to hand the route next time
        event: Event,
        /// Why the attempt failed
        cause: FailureCause,
    },
    /// The attempt failed and no retries remain.
    PermanentFailure {
        /// Event to hand the dead-letter destination
        event: Event,
        /// Why the last attempt failed
        cause: FailureCause,
    },
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Applies a retry policy and its expressions to attempt results.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    policy: RetryPolicy,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl OutcomeClassifier {
    /// Creates a classifier, validating the policy's expressions.
    pub fn new(policy: RetryPolicy, evaluator: Arc<dyn ExpressionEvaluator>) -> Result<Self> {
        for expression in [policy.ack_expression(), policy.failure_expression()].into_iter().flatten()
        {
            evaluator.validate(expression)?;
        }
        Ok(Self { policy, evaluator })
    }

    /// The policy this classifier applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classifies the result of attempt number `attempt` (1-based).
    ///
    /// `submitted` is the event that was handed to the route. A returned
    /// event is re-stamped with the submitted event's identity before the
    /// failure expression sees it.
    pub fn classify(
        &self,
        attempt: u32,
        submitted: &Event,
        result: std::result::Result<Event, RouteError>,
    ) -> Outcome {
        let returned = match result {
            Ok(returned) => submitted.rewritten(returned),
            Err(error) => return self.failure(attempt, submitted.clone(), FailureCause::Route(error)),
        };

        if let Some(expression) = self.policy.failure_expression() {
            match self.evaluator.evaluate(expression, &returned) {
                Ok(value) if is_truthy(&value) => {
                    let cause = FailureCause::FailureExpression { expression: expression.to_owned() };
                    return self.failure(attempt, returned, cause);
                },
                Ok(_) => {},
                Err(error) => {
                    return self.failure(attempt, returned, FailureCause::Evaluation(error));
                },
            }
        }

        let ack = self.acknowledge(&returned);
        Outcome::Success { event: returned, ack }
    }

    fn failure(&self, attempt: u32, event: Event, cause: FailureCause) -> Outcome {
        if self.policy.is_exhausted(attempt) {
            Outcome::PermanentFailure { event, cause }
        } else {
            Outcome::TransientFailure { event, cause }
        }
    }

    fn acknowledge(&self, event: &Event) -> Ack {
        let Some(expression) = self.policy.ack_expression() else {
            return Ack::NoContent;
        };

        match self.evaluator.evaluate(expression, event) {
            Ok(value) => Ack::Value(value),
            Err(error) => {
                warn!(
                    correlation_id = %event.correlation_id(),
                    expression,
                    error = %error,
                    "ack expression could not be evaluated, acknowledging without content"
                );
                Ack::NoContent
            },
        }
    }
}
