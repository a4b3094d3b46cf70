//! Backtracking line search along a normalized ascent direction.
//!
//! Starting from the clamped Newton step, the step is halved until the score
//! satisfies the Armijo condition, relaxed by a small tolerance so that
//! steps which leave the score unchanged up to round-off are accepted near
//! the optimum.

/// Configuration for the backtracking search.
#[derive(Debug, Clone)]
pub struct LineSearchConfig {
    /// Sufficient increase parameter (c₁ in the Armijo condition).
    pub c1: f64,
    /// Score drop tolerated, relative to `max(1, |score|)`.
    pub score_tolerance: f64,
    /// Maximum number of score evaluations.
    pub max_evaluations: usize,
    /// Factor the step is multiplied by after each rejection.
    pub shrink: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            score_tolerance: 1e-9,
            max_evaluations: 10,
            shrink: 0.5,
        }
    }
}

/// Outcome of a line search.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchResult {
    /// Accepted step length, 0 if no step was accepted.
    pub step: f64,
    /// Score at the accepted step (initial score if none).
    pub score: f64,
    pub accepted: bool,
    pub evaluations: usize,
}

/// Armijo condition for maximization, relaxed by `tolerance`:
/// `f(x + t d) >= f(x) + c1 t ∇f(x)ᵀd - tolerance`.
pub fn armijo_condition(
    new_score: f64,
    old_score: f64,
    step: f64,
    directional_derivative: f64,
    c1: f64,
    tolerance: f64,
) -> bool {
    new_score >= old_score + c1 * step * directional_derivative - tolerance
}

/// Search for a step in `(0, max_step]` along a direction with
/// `directional_derivative = ∇f·d >= 0`.
///
/// `score_at(t)` evaluates the score at `x + t d`. A non-finite score counts
/// as a rejection. A negative directional derivative is rejected without
/// evaluating anything.
pub fn backtracking_line_search<F>(
    mut score_at: F,
    initial_score: f64,
    directional_derivative: f64,
    max_step: f64,
    config: &LineSearchConfig,
) -> LineSearchResult
where
    F: FnMut(f64) -> f64,
{
    let rejected = |evaluations| LineSearchResult {
        step: 0.0,
        score: initial_score,
        accepted: false,
        evaluations,
    };

    if !(directional_derivative >= 0.0) || !(max_step > 0.0) {
        return rejected(0);
    }

    let tolerance = config.score_tolerance * initial_score.abs().max(1.0);
    let mut step = max_step;
    let mut evaluations = 0;

    while evaluations < config.max_evaluations {
        let score = score_at(step);
        evaluations += 1;

        if score.is_finite()
            && armijo_condition(
                score,
                initial_score,
                step,
                directional_derivative,
                config.c1,
                tolerance,
            )
        {
            return LineSearchResult {
                step,
                score,
                accepted: true,
                evaluations,
            };
        }

        step *= config.shrink;
    }

    rejected(evaluations)
}
