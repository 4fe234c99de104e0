//! HTTP vocabulary used by the binder: methods and route patterns.

use std::fmt;
use std::str::FromStr;

use crate::error::BinderError;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether handlers on this method may declare body-carrying parameters.
    ///
    /// GET, HEAD, DELETE and OPTIONS are treated as body-less.
    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(format!("Invalid HTTP method: {}", s)),
        }
    }
}

// ============================================================================
// Route patterns
// ============================================================================

/// A parsed route pattern such as `/users/{user_id}/posts/{post_id:int}`.
///
/// Only the declared parameter names matter to the binder; matching paths
/// against patterns is the serving runtime's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    params: Vec<String>,
}

impl RoutePattern {
    /// Parse a pattern, collecting `{name}` and `{name:converter}` segments.
    pub fn parse(pattern: &str) -> Result<Self, BinderError> {
        let invalid = |reason: &str| BinderError::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut params: Vec<String> = Vec::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            if rest[..open].contains('}') {
                return Err(invalid("unbalanced '}'"));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let inner = &after[..close];
            if inner.contains('{') {
                return Err(invalid("nested '{'"));
            }

            let name = inner.split(':').next().unwrap_or_default().trim();
            if name.is_empty() {
                return Err(invalid("empty parameter name"));
            }
            if params.iter().any(|p| p == name) {
                return Err(invalid(&format!("parameter '{}' appears twice", name)));
            }
            params.push(name.to_string());

            rest = &after[close + 1..];
        }

        if rest.contains('}') {
            return Err(invalid("unbalanced '}'"));
        }

        Ok(Self {
            raw: pattern.to_string(),
            params,
        })
    }

    /// The pattern as registered
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Declared path-parameter names, in order of appearance
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    /// A route without path parameters
    pub fn is_static(&self) -> bool {
        self.params.is_empty()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
