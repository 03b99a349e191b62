/// Route path pattern such as `/items/{id}`.
///
/// Literal segments match exactly, `{name}` segments capture one non-empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(format!("path '{raw}' must start with '/'"));
        };
        let mut segments = Vec::new();
        for segment in split_segments(rest) {
            if let Some(inner) = segment.strip_prefix('{') {
                let Some(param) = inner.strip_suffix('}') else {
                    return Err(format!("unterminated parameter '{segment}' in path '{raw}'"));
                };
                let valid = !param.is_empty()
                    && param.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(format!("invalid parameter name '{param}' in path '{raw}'"));
                }
                if segments.contains(&Segment::Param(param.to_string())) {
                    return Err(format!("duplicate parameter '{param}' in path '{raw}'"));
                }
                segments.push(Segment::Param(param.to_string()));
            } else if segment.contains(['{', '}']) {
                return Err(format!("malformed segment '{segment}' in path '{raw}'"));
            } else {
                segments.push(Segment::Literal(segment.to_string()));
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match the decoded segments of a request sub-path, returning the captured
    /// parameters in pattern order.
    pub fn matches(&self, parts: &[String]) -> Option<Vec<(String, String)>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }
}

/// Segments of a path without its leading slash. A trailing slash is ignored.
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').filter(move |_| !path.is_empty())
}
