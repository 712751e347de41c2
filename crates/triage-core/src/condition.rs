use crate::error::{Result, TriageError};

/// Boolean expression capability used for task conditions.
pub trait Evaluator: Send + Sync {
    fn eval(&self, expr: &str, vars: &serde_json::Value) -> Result<bool>;
}

/// Evaluates conditions as minijinja expressions, e.g.
/// `is_issue and labels|length == 0 and title is endingwith("?")`.
pub struct JinjaEvaluator {
    env: minijinja::Environment<'static>,
}

impl JinjaEvaluator {
    pub fn new() -> Self {
        Self {
            env: minijinja::Environment::new(),
        }
    }
}

impl Default for JinjaEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for JinjaEvaluator {
    fn eval(&self, expr: &str, vars: &serde_json::Value) -> Result<bool> {
        // Anything but a literal `true` result is a non-match.
        let source = format!("({expr}) == true");
        let compiled = self
            .env
            .compile_expression(&source)
            .map_err(|e| TriageError::Expression(e.to_string()))?;
        let value = compiled
            .eval(vars)
            .map_err(|e| TriageError::Expression(e.to_string()))?;
        Ok(value.is_true())
    }
}
