use std::fmt;

/// A single violated rule: the rejected field and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the rejected field.
    pub field: String,
    /// Reason the field was rejected.
    pub message: String,
}

impl Violation {
    /// Constructs a new `Violation`.
    pub fn new<F, M>(field: F, message: M) -> Violation
    where
        F: Into<String>,
        M: Into<String>,
    {
        Violation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The outcome of a rejected dispatch: every violation found for the
/// request, in rule registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Name of the rejected request type.
    pub request_type: &'static str,
    /// All violations found, in rule registration order.
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    /// Constructs a new `ValidationFailure`.
    pub fn new(request_type: &'static str, violations: Vec<Violation>) -> ValidationFailure {
        ValidationFailure {
            request_type,
            violations,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "validation failed for `{}`: ", self.request_type)?;

        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// Checks a request against validation rules.
pub trait Validate<Req> {
    /// Returns every violation found in the request, in rule order.
    fn validate(&self, req: &Req) -> Vec<Violation>;
}

impl<Req, F> Validate<Req> for F
where
    F: Fn(&Req) -> Vec<Violation>,
{
    fn validate(&self, req: &Req) -> Vec<Violation> {
        self(req)
    }
}

struct Rule<Req> {
    field: &'static str,
    message: String,
    check: Box<dyn Fn(&Req) -> bool + Send + Sync>,
}

/// An ordered set of validation rules for a request type.
///
/// # Examples
/// ```
/// use courier::{RuleSet, Validate};
///
/// struct SignUpRequest {
///     name: String,
///     age: u32,
/// }
///
/// let rules = RuleSet::new()
///     .non_empty("name", |req: &SignUpRequest| req.name.as_str())
///     .rule("age", "must be at least 13", |req: &SignUpRequest| req.age >= 13);
///
/// let violations = rules.validate(&SignUpRequest {
///     name: " ".to_owned(),
///     age: 9,
/// });
///
/// assert_eq!(2, violations.len());
/// assert_eq!("name", violations[0].field);
/// assert_eq!("age", violations[1].field);
/// ```
pub struct RuleSet<Req> {
    rules: Vec<Rule<Req>>,
}

impl<Req> RuleSet<Req> {
    /// Constructs an empty `RuleSet`.
    pub fn new() -> RuleSet<Req> {
        RuleSet { rules: Vec::new() }
    }

    /// Adds a rule; the check must return `true` for the request to pass.
    pub fn rule<M, F>(mut self, field: &'static str, message: M, check: F) -> Self
    where
        M: Into<String>,
        F: Fn(&Req) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            field,
            message: message.into(),
            check: Box::new(check),
        });
        self
    }

    /// Adds a rule rejecting empty and whitespace-only values of a string
    /// field.
    pub fn non_empty<F>(self, field: &'static str, value: F) -> Self
    where
        F: Fn(&Req) -> &str + Send + Sync + 'static,
    {
        self.rule(field, "must not be empty", move |req| {
            !value(req).trim().is_empty()
        })
    }
}

impl<Req> Validate<Req> for RuleSet<Req> {
    fn validate(&self, req: &Req) -> Vec<Violation> {
        self.rules
            .iter()
            .filter(|rule| !(rule.check)(req))
            .map(|rule| Violation::new(rule.field, rule.message.clone()))
            .collect()
    }
}

impl<Req> Default for RuleSet<Req> {
    fn default() -> Self {
        RuleSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{RuleSet, Validate, Violation};

    struct RenameRequest {
        name: String,
    }

    #[test]
    fn rule_order_test() {
        let rules = RuleSet::new()
            .non_empty("name", |req: &RenameRequest| req.name.as_str())
            .rule("name", "must be at most 16 characters", |req: &RenameRequest| {
                req.name.chars().count() <= 16
            });

        let violations = rules.validate(&RenameRequest {
            name: "a".repeat(32),
        });
        assert_eq!(
            vec![Violation::new("name", "must be at most 16 characters")],
            violations
        );

        let violations = rules.validate(&RenameRequest {
            name: String::new(),
        });
        assert_eq!(vec![Violation::new("name", "must not be empty")], violations);
    }

    #[test]
    fn whitespace_is_empty_test() {
        let rules = RuleSet::new().non_empty("name", |req: &RenameRequest| req.name.as_str());

        assert!(!rules
            .validate(&RenameRequest {
                name: "\t \n".to_owned(),
            })
            .is_empty());
    }

    #[test]
    fn passing_request_test() {
        let rules = RuleSet::new().non_empty("name", |req: &RenameRequest| req.name.as_str());

        assert!(rules
            .validate(&RenameRequest {
                name: "profile".to_owned(),
            })
            .is_empty());
    }

    #[test]
    fn fn_validator_test() {
        let validator = |req: &RenameRequest| {
            if req.name.is_ascii() {
                Vec::new()
            } else {
                vec![Violation::new("name", "must be ascii")]
            }
        };

        assert!(validator.validate(&RenameRequest {
            name: "plain".to_owned(),
        })
        .is_empty());

        assert_eq!(
            vec![Violation::new("name", "must be ascii")],
            validator.validate(&RenameRequest {
                name: "überprofile".to_owned(),
            })
        );
    }
}
