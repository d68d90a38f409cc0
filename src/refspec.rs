//! RefSpec: compact addressing syntax for where and how run results are sent.
//!
//! Grammar: `remote[/[src][:dst]][!]`. A trailing `!` selects pull-mode
//! delivery (temp branch + destination-side merge) instead of a bare push.
//! A `/` inside the remote itself can be escaped as `\/`.

use std::fmt;
use std::str::FromStr;

use crate::error::RefSpecError;

/// A parsed refspec: destination remote, source/destination refs, delivery mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub remote: Option<String>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub pull: bool,
}

/// Input accepted by [`RefSpec::coerce`]: an already-parsed spec is returned
/// unchanged; a string is parsed.
pub enum SpecInput {
    Spec(RefSpec),
    Text(String),
}

impl From<RefSpec> for SpecInput {
    fn from(spec: RefSpec) -> Self {
        SpecInput::Spec(spec)
    }
}

impl From<&str> for SpecInput {
    fn from(text: &str) -> Self {
        SpecInput::Text(text.to_string())
    }
}

impl From<String> for SpecInput {
    fn from(text: String) -> Self {
        SpecInput::Text(text)
    }
}

impl RefSpec {
    /// Construct and validate a refspec from its parts.
    ///
    /// Invariants: `src`/`dst` require `remote`; pull mode requires both
    /// `src` and `dst`, or neither.
    pub fn new(
        remote: Option<String>,
        src: Option<String>,
        dst: Option<String>,
        pull: bool,
    ) -> Result<Self, RefSpecError> {
        let spec = RefSpec {
            remote,
            src,
            dst,
            pull,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Coerce either an existing [`RefSpec`] or a string into a validated spec.
    ///
    /// An already-constructed spec is passed through without re-parsing.
    pub fn coerce(input: impl Into<SpecInput>) -> Result<Self, RefSpecError> {
        match input.into() {
            SpecInput::Spec(spec) => Ok(spec),
            SpecInput::Text(text) => text.parse(),
        }
    }

    /// Parse the `remote[/[src][:dst]][!]` syntax.
    pub fn parse(text: &str) -> Result<Self, RefSpecError> {
        if text.is_empty() {
            return Err(RefSpecError::Malformed("empty spec".to_string()));
        }

        let (body, pull) = match text.strip_suffix('!') {
            Some(rest) => (rest, true),
            None => (text, false),
        };
        if body.is_empty() {
            return Err(RefSpecError::Malformed(text.to_string()));
        }

        let (remote_raw, refs) = split_unescaped(body, '/');
        let remote = unescape(remote_raw);
        if remote.is_empty() {
            return Err(RefSpecError::Malformed(text.to_string()));
        }

        let (src, dst) = match refs {
            None => (None, None),
            Some(refs) => match refs.split_once(':') {
                // No colon: src alone, dst defaults to src.
                None => {
                    let src = non_empty(refs);
                    (src.clone(), src)
                }
                Some((s, d)) => (non_empty(s), non_empty(d)),
            },
        };

        let spec = RefSpec {
            remote: Some(remote),
            src,
            dst,
            pull,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), RefSpecError> {
        if self.remote.is_none() && (self.src.is_some() || self.dst.is_some() || self.pull) {
            return Err(RefSpecError::MissingRemote {
                spec: self.to_string(),
            });
        }
        if self.pull && self.src.is_some() != self.dst.is_some() {
            return Err(RefSpecError::PullRequiresSrcDst {
                spec: self.to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for RefSpec {
    type Err = RefSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RefSpec::parse(s)
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(remote) = &self.remote {
            write!(f, "{}", escape(remote))?;
            if self.src.is_some() || self.dst.is_some() {
                if self.src == self.dst {
                    write!(f, "/{}", self.src.as_deref().unwrap_or(""))?;
                } else {
                    write!(
                        f,
                        "/{}:{}",
                        self.src.as_deref().unwrap_or(""),
                        self.dst.as_deref().unwrap_or("")
                    )?;
                }
            }
        }
        if self.pull {
            write!(f, "!")?;
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Split at the first separator not preceded by a backslash.
fn split_unescaped(text: &str, sep: char) -> (&str, Option<&str>) {
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            return (&text[..idx], Some(&text[idx + sep.len_utf8()..]));
        }
    }
    (text, None)
}

fn unescape(text: &str) -> String {
    text.replace("\\/", "/")
}

fn escape(text: &str) -> String {
    text.replace('/', "\\/")
}
