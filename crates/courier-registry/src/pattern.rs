// Ant-style destination patterns, matched segment by segment on `/`.
use regex::Regex;
use std::fmt;

const SEPARATOR: char = '/';

#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    #[error("unbalanced template braces in {0:?}")]
    UnbalancedBrace(String),
    #[error("invalid template regex in {pattern:?}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
enum Segment {
    // Plain text, compared byte for byte.
    Literal(String),
    // `*` on its own.
    Any,
    // `**`: zero or more whole segments.
    Deep,
    // Anything mixing text with `*`, `?` or `{name[:regex]}`.
    Template(Regex),
}

impl Segment {
    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(text) => text == value,
            Segment::Any => true,
            Segment::Deep => true,
            Segment::Template(regex) => regex.is_match(value),
        }
    }
}

/// A compiled subscription pattern.
///
/// ```
/// use courier_registry::PathPattern;
///
/// let pattern = PathPattern::parse("/topic/PRICE.STOCK.*.{ticker:(IBM|MSFT)}").expect("pattern");
/// assert!(pattern.matches("/topic/PRICE.STOCK.NASDAQ.IBM"));
/// assert!(pattern.matches("/topic/PRICE.STOCK.NYSE.MSFT"));
/// assert!(!pattern.matches("/topic/PRICE.STOCK.NASDAQ.GOOG"));
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    leading_separator: bool,
    trailing_separator: bool,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let mut segments: Vec<Segment> = Vec::new();
        for token in tokens(source) {
            let segment = compile_segment(source, token)?;
            // `**/**` is the same as `**`.
            if matches!(segment, Segment::Deep) && matches!(segments.last(), Some(Segment::Deep)) {
                continue;
            }
            segments.push(segment);
        }
        Ok(Self {
            source: source.to_string(),
            leading_separator: source.starts_with(SEPARATOR),
            trailing_separator: source.len() > 1 && source.ends_with(SEPARATOR),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the source contains any wildcard or template syntax.
    pub fn is_pattern(source: &str) -> bool {
        source.contains(['*', '?', '{'])
    }

    pub fn matches(&self, destination: &str) -> bool {
        if destination.starts_with(SEPARATOR) != self.leading_separator {
            return false;
        }
        let path: Vec<&str> = tokens(destination).collect();
        if !match_segments(&self.segments, &path) {
            return false;
        }
        // A trailing `/` is significant unless the pattern ends in `**`.
        let ends_deep = matches!(self.segments.last(), Some(Segment::Deep));
        ends_deep
            || (destination.len() > 1 && destination.ends_with(SEPARATOR))
                == self.trailing_separator
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(SEPARATOR).filter(|token| !token.is_empty())
}

// Row-by-row over the pattern: `reachable[j]` holds when the segments seen
// so far consume exactly `path[..j]`. Each segment is tested against each
// path element at most once, however many `**` the pattern holds.
fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    let mut reachable = vec![false; path.len() + 1];
    reachable[0] = true;
    for segment in pattern {
        let mut next = vec![false; path.len() + 1];
        match segment {
            Segment::Deep => {
                let mut open = false;
                for (slot, &here) in next.iter_mut().zip(&reachable) {
                    open |= here;
                    *slot = open;
                }
            }
            _ => {
                for (idx, value) in path.iter().enumerate() {
                    if reachable[idx] && segment.matches(value) {
                        next[idx + 1] = true;
                    }
                }
            }
        }
        if !next.contains(&true) {
            return false;
        }
        reachable = next;
    }
    reachable[path.len()]
}

fn compile_segment(source: &str, token: &str) -> Result<Segment, PatternError> {
    match token {
        "**" => return Ok(Segment::Deep),
        "*" => return Ok(Segment::Any),
        _ => {}
    }
    if !PathPattern::is_pattern(token) {
        return Ok(Segment::Literal(token.to_string()));
    }

    let mut expr = String::from("^");
    let mut literal = String::new();
    let mut chars = token.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '*' | '?' | '{' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
            }
            _ => {
                literal.push(ch);
                continue;
            }
        }
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => {
                let end = closing_brace(token, idx)
                    .ok_or_else(|| PatternError::UnbalancedBrace(source.to_string()))?;
                let body = &token[idx + 1..end];
                match body.split_once(':') {
                    Some((_name, custom)) => {
                        expr.push('(');
                        expr.push_str(custom);
                        expr.push(')');
                    }
                    None => expr.push_str("(.*)"),
                }
                while chars.peek().is_some_and(|(next, _)| *next <= end) {
                    chars.next();
                }
            }
        }
    }
    if token.contains('}') && !token.contains('{') {
        return Err(PatternError::UnbalancedBrace(source.to_string()));
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');
    Regex::new(&expr)
        .map(Segment::Template)
        .map_err(|source_err| PatternError::InvalidRegex {
            pattern: source.to_string(),
            source: source_err,
        })
}

// Index of the `}` closing the `{` at `open`, honouring nested regex quantifiers.
fn closing_brace(token: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in token[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, destination: &str) -> bool {
        PathPattern::parse(pattern)
            .expect("pattern")
            .matches(destination)
    }

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(matches("/foo", "/foo"));
        assert!(!matches("/foo", "/foo/bar"));
        assert!(!matches("/foo", "foo"));
        assert!(!matches("/foo", "/foo/"));
    }

    #[test]
    fn single_segment_wildcard() {
        assert!(matches(
            "/topic/PRICE.STOCK.*.IBM",
            "/topic/PRICE.STOCK.NASDAQ.IBM"
        ));
        assert!(!matches(
            "/topic/PRICE.STOCK.*.IBM",
            "/topic/PRICE.STOCK.NASDAQ.MSFT"
        ));
        assert!(matches("/topic/*", "/topic/anything"));
        assert!(!matches("/topic/*", "/topic/a/b"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        assert!(matches("/t/a?c", "/t/abc"));
        assert!(!matches("/t/a?c", "/t/ac"));
    }

    #[test]
    fn deep_wildcard_spans_segments() {
        assert!(matches("/topic/**", "/topic"));
        assert!(matches("/topic/**", "/topic/a/b/c"));
        assert!(matches("/topic/**/end", "/topic/end"));
        assert!(matches("/topic/**/end", "/topic/a/b/end"));
        assert!(!matches("/topic/**/end", "/topic/a/b"));
        assert!(matches("/**/**/x", "/a/x"));
    }

    #[test]
    fn many_deep_wildcards_match_long_paths_quickly() {
        let pattern = PathPattern::parse("/**/x/**/x/**/x/**/x/**/x/**/y").expect("pattern");
        let mut path: String = "/x".repeat(400);
        let started = std::time::Instant::now();
        assert!(!pattern.matches(&path));
        path.push_str("/y");
        assert!(pattern.matches(&path));
        assert!(
            started.elapsed() < std::time::Duration::from_secs(1),
            "matching took {:?}",
            started.elapsed()
        );
        assert!(!pattern.matches("/x/x/x/x/y"));
        assert!(pattern.matches("/x/x/x/x/x/y"));
    }

    #[test]
    fn template_variables() {
        let pattern = "/topic/PRICE.STOCK.*.{ticker:(IBM|MSFT)}";
        assert!(matches(pattern, "/topic/PRICE.STOCK.NASDAQ.IBM"));
        assert!(matches(pattern, "/topic/PRICE.STOCK.NASDAQ.MSFT"));
        assert!(!matches(pattern, "/topic/PRICE.STOCK.NASDAQ.GOOG"));
        assert!(matches("/user/{id}/inbox", "/user/42/inbox"));
        assert!(!matches("/user/{id}/inbox", "/user/42/outbox"));
    }

    #[test]
    fn template_regex_may_contain_braces() {
        assert!(matches("/order/{id:\\d{3}}", "/order/123"));
        assert!(!matches("/order/{id:\\d{3}}", "/order/1234"));
    }

    #[test]
    fn literal_text_is_not_regex() {
        assert!(!matches("/t/a.*", "/t/abc"));
        assert!(matches("/t/a.*", "/t/a.bc"));
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(matches!(
            PathPattern::parse("/t/{open"),
            Err(PatternError::UnbalancedBrace(_))
        ));
        assert!(matches!(
            PathPattern::parse("/t/{x:(}"),
            Err(PatternError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn is_pattern_detects_syntax() {
        assert!(PathPattern::is_pattern("/a/*"));
        assert!(PathPattern::is_pattern("/a/{b}"));
        assert!(!PathPattern::is_pattern("/a/b.c"));
    }
}
