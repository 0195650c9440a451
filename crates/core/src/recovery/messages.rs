//! User-facing recovery messages and remediation suggestions.
//!
//! Only these strings reach end users; raw error text never does.

use super::model::RecoveryMethod;
use crate::errors::ErrorCategory;

fn category_explanation(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::ServiceUnavailable => {
            "The recommendation service is temporarily unavailable."
        }
        ErrorCategory::RateLimited => {
            "The recommendation service is receiving too many requests right now."
        }
        ErrorCategory::CircuitOpen => {
            "The recommendation service is paused while it recovers from repeated failures."
        }
        ErrorCategory::Timeout => "The recommendation service took too long to respond.",
        ErrorCategory::Unknown => "Something went wrong while generating recommendations.",
    }
}

fn stage_clause(method: RecoveryMethod) -> &'static str {
    match method {
        RecoveryMethod::Cache => "Showing your most recent saved recommendations instead.",
        RecoveryMethod::Fallback => "Showing recommendations from an alternate source instead.",
        RecoveryMethod::Degraded => {
            "Recommendations will appear again once the service recovers."
        }
        RecoveryMethod::None => "",
    }
}

/// Short explanation for `category` combined with what the user is seeing.
pub fn human_message(category: ErrorCategory, method: RecoveryMethod) -> String {
    let explanation = category_explanation(category);
    match stage_clause(method) {
        "" => explanation.to_string(),
        clause => format!("{} {}", explanation, clause),
    }
}

/// Ordered remediation steps for `category`.
pub fn suggestions(category: ErrorCategory) -> Vec<String> {
    let steps: &[&str] = match category {
        ErrorCategory::ServiceUnavailable => &[
            "Wait a few minutes and refresh the page.",
            "Check the status page for ongoing incidents.",
            "Contact support if the problem lasts more than an hour.",
        ],
        ErrorCategory::RateLimited => &[
            "Wait a minute before trying again.",
            "Avoid refreshing repeatedly while results load.",
            "Spread bulk requests over a longer period.",
        ],
        ErrorCategory::CircuitOpen => &[
            "The service will be retried automatically in about a minute.",
            "Saved recommendations remain available in the meantime.",
            "Contact support if recommendations stay unavailable.",
        ],
        ErrorCategory::Timeout => &[
            "Try again; the service may respond faster on the next attempt.",
            "Narrow the request to fewer projects or tasks.",
            "Check your network connection.",
        ],
        ErrorCategory::Unknown => &[
            "Refresh the page and try again.",
            "Contact support if the problem persists.",
        ],
    };
    steps.iter().map(|s| s.to_string()).collect()
}
