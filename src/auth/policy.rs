//! Route-based role requirements
//!
//! A static table of route patterns, each mapped to a [`Requirement`]. The
//! most specific matching pattern decides; unmatched paths require an
//! authenticated identity.
//!
//! Pattern syntax (segments separated by `/`):
//! - literal segment: `admin`
//! - `*` matches exactly one segment
//! - `**` as the last segment matches zero or more trailing segments

use crate::{config::RolesConfig, error::AppError};

use super::middleware::AuthContext;

/// What a route demands of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// No identity required
    Public,
    /// At least one of the listed roles
    AnyOf(Vec<String>),
    /// This exact role
    RequireRole(String),
    /// Any resolved identity
    AuthenticatedOnly,
}

/// Outcome of evaluating a requirement against a request context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// No identity where one is needed (401)
    Unauthenticated,
    /// Identity present but lacking the role (403)
    Forbidden,
}

impl Requirement {
    pub fn evaluate(&self, ctx: &AuthContext) -> AccessDecision {
        if *self == Requirement::Public {
            return AccessDecision::Allow;
        }

        let Some(roles) = ctx.roles() else {
            return AccessDecision::Unauthenticated;
        };

        let granted = match self {
            Requirement::Public | Requirement::AuthenticatedOnly => true,
            Requirement::AnyOf(required) => required.iter().any(|r| roles.contains(r)),
            Requirement::RequireRole(required) => roles.contains(required),
        };

        if granted {
            AccessDecision::Allow
        } else {
            AccessDecision::Forbidden
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
}

#[derive(Debug, Clone)]
struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    /// Ends with `**`
    tail: bool,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl RoutePattern {
    fn parse(raw: &str) -> Result<Self, AppError> {
        if !raw.starts_with('/') {
            return Err(AppError::Config(format!(
                "Route pattern must start with '/': {}",
                raw
            )));
        }

        let parts = split_path(raw);
        let mut segments = Vec::with_capacity(parts.len());
        let mut tail = false;

        for (i, part) in parts.iter().enumerate() {
            match *part {
                "**" if i + 1 == parts.len() => tail = true,
                "**" => {
                    return Err(AppError::Config(format!(
                        "'**' is only allowed as the last segment: {}",
                        raw
                    )))
                }
                "*" => segments.push(Segment::Single),
                literal => segments.push(Segment::Literal(literal.to_string())),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            tail,
        })
    }

    fn matches(&self, path: &[&str]) -> bool {
        let len_ok = if self.tail {
            path.len() >= self.segments.len()
        } else {
            path.len() == self.segments.len()
        };

        len_ok
            && self.segments.iter().zip(path).all(|(seg, part)| match seg {
                Segment::Literal(lit) => lit == part,
                Segment::Single => true,
            })
    }

    /// Larger is more specific: exact paths first, then more literal
    /// segments, then single wildcards over `**`, then depth.
    fn specificity(&self) -> (bool, usize, bool, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        let exact = !self.tail && literals == self.segments.len();
        (exact, literals, !self.tail, self.segments.len())
    }
}

#[derive(Debug, Clone)]
struct RouteRule {
    pattern: RoutePattern,
    requirement: Requirement,
}

/// Route pattern → requirement table
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<RouteRule>,
}

impl AccessPolicy {
    pub fn new<P: AsRef<str>>(rules: Vec<(P, Requirement)>) -> Result<Self, AppError> {
        let rules = rules
            .into_iter()
            .map(|(pattern, requirement)| {
                match &requirement {
                    Requirement::AnyOf(roles) if roles.is_empty() => {
                        return Err(AppError::Config(format!(
                            "AnyOf requires at least one role: {}",
                            pattern.as_ref()
                        )))
                    }
                    _ => {}
                }
                Ok(RouteRule {
                    pattern: RoutePattern::parse(pattern.as_ref())?,
                    requirement,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self { rules })
    }

    /// Service route table, with role names taken from configuration
    pub fn default_rules(roles: &RolesConfig) -> Result<Self, AppError> {
        Self::new(vec![
            ("/health", Requirement::Public),
            ("/ready", Requirement::Public),
            ("/v1/auth/**", Requirement::Public),
            (
                "/v1/resources/user",
                Requirement::AnyOf(vec![
                    roles.user.clone(),
                    roles.moderator.clone(),
                    roles.admin.clone(),
                ]),
            ),
            (
                "/v1/resources/moderator",
                Requirement::AnyOf(vec![roles.moderator.clone(), roles.admin.clone()]),
            ),
            (
                "/v1/resources/admin",
                Requirement::RequireRole(roles.admin.clone()),
            ),
        ])
    }

    /// Requirement for `path`; `AuthenticatedOnly` when nothing matches.
    pub fn requirement_for(&self, path: &str) -> &Requirement {
        const FALLBACK: &Requirement = &Requirement::AuthenticatedOnly;

        let parts = split_path(path);
        let mut best: Option<&RouteRule> = None;

        for rule in self.rules.iter().filter(|r| r.pattern.matches(&parts)) {
            match best {
                Some(current)
                    if current.pattern.specificity() >= rule.pattern.specificity() => {}
                _ => best = Some(rule),
            }
        }

        match best {
            Some(rule) => {
                tracing::trace!(path, pattern = %rule.pattern.raw, "Access rule matched");
                &rule.requirement
            }
            None => FALLBACK,
        }
    }

    pub fn evaluate(&self, path: &str, ctx: &AuthContext) -> AccessDecision {
        self.requirement_for(path).evaluate(ctx)
    }
}
