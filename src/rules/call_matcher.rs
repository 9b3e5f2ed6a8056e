//! Call matcher executor: name patterns plus keyword-argument constraints.

use serde_json::Value;

use crate::analysis::ProgramModel;
use crate::error::Result;
use crate::ir::CallSite;

use super::detection::Detection;
use super::ir::{ArgumentConstraint, CallMatcherIr, DataflowScope, MatchMode};
use super::{pattern, Executor};

pub struct CallMatcherExec {
    ir: CallMatcherIr,
}

impl CallMatcherExec {
    /// Build the executor, validating every pattern up front.
    pub fn new(ir: CallMatcherIr) -> Result<Self> {
        for p in &ir.patterns {
            pattern::validate(p, ir.wildcard)?;
        }
        for constraint in ir.keyword_args.values() {
            if let (true, Value::String(s)) = (constraint.wildcard, &constraint.value) {
                pattern::validate(s, true)?;
            }
        }
        Ok(Self { ir })
    }

    /// Name-only match, used for taint source/sink/sanitizer classification
    /// of expressions that are not call sites.
    pub fn matches_name(&self, name: &str) -> bool {
        let hits = |p: &String| pattern::matches(name, p, self.ir.wildcard).unwrap_or(false);
        match self.ir.match_mode {
            MatchMode::Any => self.ir.patterns.iter().any(hits),
            MatchMode::All => {
                !self.ir.patterns.is_empty() && self.ir.patterns.iter().all(hits)
            }
        }
    }

    /// Full match: target name plus every keyword-argument constraint.
    pub fn matches_site(&self, site: &CallSite) -> bool {
        if !self.matches_name(&site.target_name) {
            return false;
        }
        if self.ir.keyword_args.is_empty() {
            return true;
        }
        let kwargs = site.keyword_arguments();
        for (name, constraint) in &self.ir.keyword_args {
            let Some(actual) = kwargs.get(name) else {
                return false;
            };
            if !constraint_matches(constraint, actual) {
                return false;
            }
        }
        true
    }
}

impl Executor for CallMatcherExec {
    fn run(&self, program: &ProgramModel) -> Vec<Detection> {
        let mut detections = Vec::new();
        for (fqn, site) in program.call_graph.all_call_sites() {
            if self.matches_site(site) {
                detections.push(Detection {
                    rule_id: None,
                    file_path: site.location.file.clone(),
                    function_fqn: fqn.to_string(),
                    source_line: None,
                    sink_line: site.location.line,
                    tainted_var: None,
                    sink_call_target: site.target_name.clone(),
                    confidence: 1.0,
                    sanitized: false,
                    scope: DataflowScope::Local,
                    path: Vec::new(),
                });
            }
        }
        detections
    }
}

/// Compare an actual argument text against a constraint, by the constraint's
/// JSON type.
fn constraint_matches(constraint: &ArgumentConstraint, actual: &str) -> bool {
    match &constraint.value {
        Value::String(expected) => string_matches(expected, constraint.wildcard, actual),
        Value::Bool(expected) => bool_matches(*expected, actual),
        Value::Number(expected) => number_matches(expected.as_f64(), actual),
        Value::Null => {
            let lowered = actual.trim().to_lowercase();
            matches!(lowered.as_str(), "none" | "null" | "nil")
        }
        _ => false,
    }
}

/// Strip one layer of surrounding matching quotes, trim whitespace, then
/// compare. Literal keywords (`true`/`false`/`none`/`null`/`nil`) compare
/// case-insensitively.
fn string_matches(expected: &str, wildcard: bool, actual: &str) -> bool {
    let actual = unquote(actual.trim()).trim();
    if wildcard {
        return pattern::matches(actual, expected, true).unwrap_or(false);
    }
    let keywords = ["true", "false", "none", "null", "nil"];
    if keywords.contains(&expected.to_lowercase().as_str()) {
        return actual.eq_ignore_ascii_case(expected);
    }
    actual == expected
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn bool_matches(expected: bool, actual: &str) -> bool {
    let lowered = actual.trim().to_lowercase();
    if expected {
        matches!(lowered.as_str(), "true" | "1")
    } else {
        matches!(lowered.as_str(), "false" | "0")
    }
}

/// Parse the actual value with integer rules first (decimal, hex `0x…`,
/// octal `0o…`/`0…`), then float; compare numerically.
fn number_matches(expected: Option<f64>, actual: &str) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    match parse_number(actual.trim()) {
        Some(parsed) => (parsed - expected).abs() < f64::EPSILON,
        None => false,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if let Ok(v) = i64::from_str_radix(hex, 16) {
            return Some(sign * v as f64);
        }
    }
    if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        if let Ok(v) = i64::from_str_radix(oct, 8) {
            return Some(sign * v as f64);
        }
    }
    // Bare leading zero is the legacy octal form, `0` itself is just zero.
    if digits.len() > 1 && digits.starts_with('0') && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(v) = i64::from_str_radix(&digits[1..], 8) {
            return Some(sign * v as f64);
        }
    }
    if let Ok(v) = digits.parse::<i64>() {
        return Some(sign * v as f64);
    }
    digits.parse::<f64>().ok().map(|v| sign * v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Argument, Location};
    use serde_json::json;

    fn site(target: &str, args: &[&str]) -> CallSite {
        CallSite {
            target_name: target.into(),
            target_fqn: None,
            arguments: args
                .iter()
                .enumerate()
                .map(|(i, a)| Argument {
                    raw_text: a.to_string(),
                    is_variable: false,
                    position: i,
                })
                .collect(),
            resolved: false,
            assigned_to: None,
            location: Location::new("t.py", 1, 0),
        }
    }

    fn matcher(json_ir: serde_json::Value) -> CallMatcherExec {
        CallMatcherExec::new(serde_json::from_value(json_ir).unwrap()).unwrap()
    }

    #[test]
    fn wildcard_names() {
        let m = matcher(json!({"patterns": ["request.*"], "wildcard": true}));
        assert!(m.matches_site(&site("request.GET", &[])));
        assert!(m.matches_site(&site("request.POST", &[])));
        assert!(!m.matches_site(&site("utils.sanitize", &[])));
    }

    #[test]
    fn match_mode_all_requires_every_pattern() {
        let m = matcher(json!({
            "patterns": ["request.*", "*.GET"],
            "wildcard": true,
            "matchMode": "all"
        }));
        assert!(m.matches_site(&site("request.GET", &[])));
        assert!(!m.matches_site(&site("request.POST", &[])));
    }

    #[test]
    fn invalid_pattern_rejected_at_build() {
        let ir: CallMatcherIr =
            serde_json::from_value(json!({"patterns": ["a*b"], "wildcard": true})).unwrap();
        assert!(CallMatcherExec::new(ir).is_err());
    }

    #[test]
    fn bool_constraint() {
        let m = matcher(json!({
            "patterns": ["run"],
            "keywordArgs": {"debug": {"value": true}}
        }));
        let call = site("run", &["host=\"0.0.0.0\"", "port=5000", "debug=True"]);
        assert!(m.matches_site(&call));

        let off = matcher(json!({
            "patterns": ["run"],
            "keywordArgs": {"debug": {"value": false}}
        }));
        assert!(!off.matches_site(&call));
        assert!(off.matches_site(&site("run", &["debug=0"])));
    }

    #[test]
    fn missing_keyword_never_matches() {
        let m = matcher(json!({
            "patterns": ["run"],
            "keywordArgs": {"debug": {"value": true}}
        }));
        assert!(!m.matches_site(&site("run", &["host=\"x\""])));
    }

    #[test]
    fn string_constraint_unquotes_once() {
        let m = matcher(json!({
            "patterns": ["run"],
            "keywordArgs": {"host": {"value": "0.0.0.0"}}
        }));
        assert!(m.matches_site(&site("run", &["host=\"0.0.0.0\""])));
        assert!(m.matches_site(&site("run", &["host='0.0.0.0'"])));
        assert!(!m.matches_site(&site("run", &["host=\"127.0.0.1\""])));
    }

    #[test]
    fn string_keywords_compare_case_insensitively() {
        let m = matcher(json!({
            "patterns": ["run"],
            "keywordArgs": {"verify": {"value": "none"}}
        }));
        assert!(m.matches_site(&site("run", &["verify=None"])));
        assert!(m.matches_site(&site("run", &["verify=NONE"])));
    }

    #[test]
    fn number_constraint_accepts_radix_forms() {
        let m = matcher(json!({
            "patterns": ["chmod"],
            "keywordArgs": {"mode": {"value": 511}}
        }));
        assert!(m.matches_site(&site("chmod", &["mode=511"])));
        assert!(m.matches_site(&site("chmod", &["mode=0o777"])));
        assert!(m.matches_site(&site("chmod", &["mode=0777"])));
        assert!(m.matches_site(&site("chmod", &["mode=0x1FF"])));
        assert!(!m.matches_site(&site("chmod", &["mode=420"])));
    }

    #[test]
    fn float_comparison_is_numeric() {
        let m = matcher(json!({
            "patterns": ["sleep"],
            "keywordArgs": {"timeout": {"value": 1.5}}
        }));
        assert!(m.matches_site(&site("sleep", &["timeout=1.5"])));
        assert!(!m.matches_site(&site("sleep", &["timeout=2.5"])));
    }

    #[test]
    fn null_constraint() {
        let m = matcher(json!({
            "patterns": ["connect"],
            "keywordArgs": {"ssl": {"value": null}}
        }));
        assert!(m.matches_site(&site("connect", &["ssl=None"])));
        assert!(m.matches_site(&site("connect", &["ssl=null"])));
        assert!(m.matches_site(&site("connect", &["ssl=nil"])));
        assert!(!m.matches_site(&site("connect", &["ssl=False"])));
    }

    #[test]
    fn wildcard_string_constraint() {
        let m = matcher(json!({
            "patterns": ["open"],
            "keywordArgs": {"mode": {"value": "w*", "wildcard": true}}
        }));
        assert!(m.matches_site(&site("open", &["mode=\"wb\""])));
        assert!(!m.matches_site(&site("open", &["mode=\"rb\""])));
    }

    #[test]
    fn empty_keyword_args_match_on_name_alone() {
        let m = matcher(json!({"patterns": ["eval"]}));
        assert!(m.matches_site(&site("eval", &["x"])));
    }
}
