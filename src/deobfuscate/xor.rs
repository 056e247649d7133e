//! Crazy-XOR dictionary evaluator (spec.md §4.2).
//!
//! Ported from `crazyxor.py`: builds a `name -> decimal string` map from a
//! semicolon-separated assignment block, then evaluates further expressions
//! of the same grammar against that map.
use std::collections::HashMap;

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// A resolved `name -> decimal string` mapping, plus the ability to
/// evaluate later expressions of the same `A^B` grammar against it.
#[derive(Debug, Clone, Default)]
pub struct XorDict {
    values: HashMap<String, String>,
}

impl XorDict {
    /// Parses `name=expr;name=expr;...` and resolves every entry to a
    /// decimal string via recursive substitution with memoization.
    pub fn parse(code: &str) -> Self {
        let mut values = HashMap::new();
        for assignment in code.split(';') {
            if let Some((name, expr)) = assignment.split_once('=') {
                values.insert(name.trim().to_string(), expr.trim().to_string());
            }
        }
        let mut dict = XorDict { values };
        let names: Vec<String> = dict.values.keys().cloned().collect();
        for name in names {
            dict.resolve(&name);
        }
        dict
    }

    /// Resolves `var` to a decimal string, memoizing the result back into
    /// the map on first evaluation. Returns `None` on malformed input.
    fn resolve(&mut self, var: &str) -> Option<String> {
        if is_decimal(var) {
            return Some(var.to_string());
        }
        let value = self.values.get(var)?.clone();
        if is_decimal(&value) {
            return Some(value);
        }
        let (l, r) = value.split_once('^')?;
        let (l, r) = (l.trim().to_string(), r.trim().to_string());
        let lv: u64 = self.resolve(&l)?.parse().ok()?;
        let rv: u64 = self.resolve(&r)?.parse().ok()?;
        let answer = (lv ^ rv).to_string();
        self.values.insert(var.to_string(), answer.clone());
        Some(answer)
    }

    /// Evaluates a later expression of the same grammar against this
    /// dictionary. Tolerant of deeply nested right-associative `^`.
    pub fn eval(&self, expr: &str) -> Option<String> {
        let expr = expr.trim();
        if is_decimal(expr) {
            return Some(expr.to_string());
        }
        if let Some(value) = self.values.get(expr) {
            if is_decimal(value) {
                return Some(value.clone());
            }
        }
        let (l, r) = expr.split_once('^')?;
        let lv: u64 = self.eval(l.trim())?.parse().ok()?;
        let rv: u64 = self.eval(r.trim())?.parse().ok()?;
        Some((lv ^ rv).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_assignment_chain() {
        let dict = XorDict::parse("a=5;b=3;c=a^b;d=c^2");
        assert_eq!(dict.values.get("a").map(String::as_str), Some("5"));
        assert_eq!(dict.values.get("b").map(String::as_str), Some("3"));
        assert_eq!(dict.values.get("c").map(String::as_str), Some("6"));
        assert_eq!(dict.values.get("d").map(String::as_str), Some("4"));
        assert_eq!(dict.eval("d^a").as_deref(), Some("1"));
    }

    #[test]
    fn order_independent_resolution() {
        // Same block, but the later variable depends on an earlier one
        // declared after it in textual order doesn't matter either way,
        // since resolution recurses on demand.
        let dict = XorDict::parse("d=c^2;c=a^b;a=5;b=3");
        assert_eq!(dict.eval("d").as_deref(), Some("4"));
    }

    #[test]
    fn deeply_nested_right_associative() {
        let dict = XorDict::parse("a=1;b=2;c=3;d=4");
        // ((1^2)^3)^4 folded right-associatively as a^b^c^d
        let expected = 1u64 ^ 2 ^ 3 ^ 4;
        assert_eq!(dict.eval("a^b^c^d"), Some(expected.to_string()));
    }

    #[test]
    fn malformed_input_yields_none() {
        let dict = XorDict::parse("a=5");
        assert_eq!(dict.eval("unknown_var"), None);
    }

    #[test]
    fn bare_literal_passthrough() {
        let dict = XorDict::parse("");
        assert_eq!(dict.eval("42"), Some("42".to_string()));
    }
}
