use thiserror::Error;

/// Fatal parse/validation failures, surfaced at the process boundary.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("malformed level: {0}")]
    MalformedLevel(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

/// Why the high-level search returned without a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSolutionReason {
    InfeasibleInitial,
    LimitExpansions,
    LimitTime,
    LimitOpenEmpty,
}

impl std::fmt::Display for NoSolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoSolutionReason::InfeasibleInitial => "infeasible_initial",
            NoSolutionReason::LimitExpansions => "limit_expansions",
            NoSolutionReason::LimitTime => "limit_time",
            NoSolutionReason::LimitOpenEmpty => "limit_open_empty",
        };
        write!(f, "{s}")
    }
}
