//! Filter expressions
//!
//! Parses the comparison inside `#(...)` and implements the bounded glob
//! matcher backing the `%` / `!%` operators. Strict two-character-operator
//! policy: a bare `=` is rejected rather than treated as `==`.

use crate::core::limits::PATTERN_ITERATION_BUDGET;
use crate::Error;

/// Comparison operator inside a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Glob-style pattern match.
    Match,
    /// Glob-style pattern non-match.
    NotMatch,
}

/// `{sub-path, operator, literal}` — the embedded comparison of a Filter
/// segment. The sub-path is compiled lazily by the executor against each
/// candidate sibling.
#[derive(Debug, Clone)]
pub struct FilterExpr {
    pub path: String,
    pub op: FilterOp,
    pub value: String,
}

/// Parse the text between `#(` and `)`.
///
/// Exactly one operator must appear outside quotes. Operator characters
/// inside a quoted literal are not re-interpreted.
pub fn parse(expr: &str) -> Result<FilterExpr, Error> {
    let bytes = expr.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut found: Option<(usize, usize, FilterOp)> = None; // (start, len, op)

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    in_quote = Some(b);
                } else if let Some((len, op)) = operator_at(&bytes[i..]) {
                    // A '%' at the start of the sub-path (or of one of its
                    // dotted steps) is the direct-text operand, not the
                    // match operator.
                    if op == FilterOp::Match && (i == 0 || bytes[i - 1] == b'.') {
                        i += 1;
                        continue;
                    }
                    if found.is_some() {
                        return Err(Error::invalid_path("filter has more than one operator"));
                    }
                    found = Some((i, len, op));
                    i += len;
                    continue;
                } else if b == b'=' {
                    // A '=' not part of a recognized operator is the
                    // historical single-equals form; rejected outright.
                    return Err(Error::invalid_path("bare '=' in filter; use '=='"));
                }
            }
        }
        i += 1;
    }

    let (start, len, op) = found.ok_or_else(|| Error::invalid_path("filter has no operator"))?;
    let path = expr[..start].trim();
    let value = unquote(expr[start + len..].trim());

    if path.is_empty() {
        return Err(Error::invalid_path("filter has no sub-path"));
    }
    Ok(FilterExpr {
        path: path.to_string(),
        op,
        value,
    })
}

/// Recognize an operator at the head of `rest`, longest first.
fn operator_at(rest: &[u8]) -> Option<(usize, FilterOp)> {
    if rest.starts_with(b"==") {
        Some((2, FilterOp::Eq))
    } else if rest.starts_with(b"!=") {
        Some((2, FilterOp::Ne))
    } else if rest.starts_with(b"<=") {
        Some((2, FilterOp::Le))
    } else if rest.starts_with(b">=") {
        Some((2, FilterOp::Ge))
    } else if rest.starts_with(b"!%") {
        Some((2, FilterOp::NotMatch))
    } else if rest.starts_with(b"<") {
        Some((1, FilterOp::Lt))
    } else if rest.starts_with(b">") {
        Some((1, FilterOp::Gt))
    } else if rest.starts_with(b"%") {
        Some((1, FilterOp::Match))
    } else {
        None
    }
}

/// Strip one layer of matching quotes from a literal value.
fn unquote(s: &str) -> String {
    let b = s.as_bytes();
    if b.len() >= 2 && (b[0] == b'"' || b[0] == b'\'') && b[b.len() - 1] == b[0] {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl FilterExpr {
    /// Evaluate the operator against an extracted value.
    pub fn compare(&self, candidate: &str) -> bool {
        match self.op {
            FilterOp::Eq => candidate == self.value,
            FilterOp::Ne => candidate != self.value,
            FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                let (a, b) = match (candidate.parse::<f64>(), self.value.parse::<f64>()) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => return false,
                };
                // NaN / infinity never match
                if !a.is_finite() || !b.is_finite() {
                    return false;
                }
                match self.op {
                    FilterOp::Lt => a < b,
                    FilterOp::Le => a <= b,
                    FilterOp::Gt => a > b,
                    _ => a >= b,
                }
            }
            FilterOp::Match => glob_match(candidate, &self.value),
            FilterOp::NotMatch => !glob_match(candidate, &self.value),
        }
    }
}

/// Iterative glob match: `*` any run, `?` any one char. Two-pointer loop
/// with a single backtrack point and an iteration budget, so adversarial
/// patterns cannot trigger catastrophic backtracking. Budget exhaustion
/// counts as a non-match.
pub fn glob_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let (mut ti, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None; // (pattern pos after '*', text pos)
    let mut budget = PATTERN_ITERATION_BUDGET;

    while ti < t.len() {
        if budget == 0 {
            return false;
        }
        budget -= 1;

        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi + 1, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eq() {
        let f = parse("status==active").unwrap();
        assert_eq!(f.path, "status");
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.value, "active");
    }

    #[test]
    fn test_parse_quoted_value_with_operator_chars() {
        let f = parse("name==\"a==b\"").unwrap();
        assert_eq!(f.value, "a==b");
    }

    #[test]
    fn test_bare_equals_rejected() {
        assert!(parse("status=active").is_err());
    }

    #[test]
    fn test_two_operators_rejected() {
        assert!(parse("a==b==c").is_err());
    }

    #[test]
    fn test_no_operator_rejected() {
        assert!(parse("status").is_err());
    }

    #[test]
    fn test_numeric_comparisons() {
        let f = parse("price>20").unwrap();
        assert!(f.compare("44.99"));
        assert!(!f.compare("19.99"));
        assert!(!f.compare("not a number"));
    }

    #[test]
    fn test_nan_never_matches() {
        let f = parse("price<NaN").unwrap();
        assert!(!f.compare("1"));
        let inf = parse("price>1").unwrap();
        assert!(!inf.compare("inf"));
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("hello", "h*o"));
        assert!(glob_match("hello", "h?llo"));
        assert!(glob_match("hello", "*"));
        assert!(!glob_match("hello", "h*x"));
        assert!(glob_match("", "*"));
        assert!(!glob_match("abc", ""));
    }

    #[test]
    fn test_glob_budget_bounds_adversarial_pattern() {
        let text = "a".repeat(500);
        let pattern = format!("{}b", "*a".repeat(200));
        // Must terminate quickly; exhausted budget is a non-match.
        assert!(!glob_match(&text, &pattern));
    }

    #[test]
    fn test_direct_text_operand() {
        let f = parse("%==hello").unwrap();
        assert_eq!(f.path, "%");
        assert_eq!(f.op, FilterOp::Eq);
        let f = parse("a.%<5").unwrap();
        assert_eq!(f.path, "a.%");
        assert_eq!(f.op, FilterOp::Lt);
    }

    #[test]
    fn test_match_operator() {
        let f = parse("name%\"Jo*\"").unwrap();
        assert!(f.compare("John"));
        assert!(!f.compare("Jane"));
        let nf = parse("name!%\"Jo*\"").unwrap();
        assert!(!nf.compare("John"));
        assert!(nf.compare("Jane"));
    }
}
