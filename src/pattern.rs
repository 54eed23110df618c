//! Path pattern compilation into a segment list.
//!
//! `"/a/:id/*"` compiles once into `[Literal("a"), Capture("id"), Wildcard]`
//! rather than being handed to a regex engine, avoiding escape-character
//! quirks for literal segments that happen to contain regex metacharacters.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture(String),
    Wildcard,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// A bare `"*"` matches any path at all; otherwise the pattern is split
    /// on `/` and each segment is tagged.
    pub fn compile(raw: &str) -> Self {
        if raw == "*" {
            return Self {
                raw: raw.to_string(),
                segments: vec![Segment::Wildcard],
            };
        }
        let mut segments = Vec::new();
        for (i, part) in raw.trim_matches('/').split('/').enumerate() {
            if part.is_empty() {
                continue;
            }
            if part == "*" {
                segments.push(Segment::Wildcard);
            } else if let Some(name) = part.strip_prefix(':') {
                segments.push(Segment::Capture(name.to_string()));
            } else if i == 0 && part.is_empty() {
                continue;
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern is equivalent to an unconditional wildcard.
    pub fn is_any(&self) -> bool {
        self.raw == "*"
    }

    /// Matches `path` against the compiled segments, returning the captured
    /// params on success. A trailing `Wildcard` matches zero or more of the
    /// remaining segments regardless of position in the literal pattern.
    pub fn matches(&self, path: &str) -> Option<std::collections::BTreeMap<String, String>> {
        if self.is_any() {
            return Some(Default::default());
        }
        let path_segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let mut params = std::collections::BTreeMap::new();
        let mut pi = 0;
        for (si, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Wildcard => {
                    // a wildcard in this implementation is always trailing
                    debug_assert_eq!(si, self.segments.len() - 1);
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if path_segments.get(pi) != Some(&lit.as_str()) {
                        return None;
                    }
                    pi += 1;
                }
                Segment::Capture(name) => {
                    let value = *path_segments.get(pi)?;
                    params.insert(name.clone(), value.to_string());
                    pi += 1;
                }
            }
        }
        if pi == path_segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_mixed_segments() {
        let p = Pattern::compile("/a/:id/*");
        assert_eq!(
            p.segments,
            vec![
                Segment::Literal("a".into()),
                Segment::Capture("id".into()),
                Segment::Wildcard,
            ]
        );
    }

    #[test]
    fn wildcard_alone_matches_anything() {
        let p = Pattern::compile("*");
        assert!(p.matches("/anything/at/all").is_some());
        assert!(p.matches("").is_some());
    }

    #[test]
    fn capture_extracts_param() {
        let p = Pattern::compile("/users/:id");
        let params = p.matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn trailing_wildcard_matches_suffix() {
        let p = Pattern::compile("/files/*");
        assert!(p.matches("/files/a/b/c").is_some());
        assert!(p.matches("/other").is_none());
    }

    #[test]
    fn literal_mismatch_fails() {
        let p = Pattern::compile("/a/:id");
        assert!(p.matches("/b/42").is_none());
    }

    #[test]
    fn segment_count_mismatch_without_wildcard_fails() {
        let p = Pattern::compile("/a/:id");
        assert!(p.matches("/a/1/2").is_none());
    }
}
