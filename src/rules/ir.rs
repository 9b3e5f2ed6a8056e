//! Compiled rule IR — the stable JSON wire format produced by the external
//! rule compiler. The top level is an array of records, each pairing rule
//! metadata with a tagged matcher tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One element of the compiled rule array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule: RuleMeta,
    pub matcher: MatcherIr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub cwe: String,
    #[serde(default)]
    pub owasp: String,
    #[serde(default)]
    pub description: String,
}

/// Matcher discriminators accepted on the wire; anything else is an
/// `UnknownMatcherKind` error for that rule.
pub const KNOWN_MATCHER_KINDS: &[&str] = &[
    "call_matcher",
    "variable_matcher",
    "dataflow",
    "logic_and",
    "logic_or",
    "logic_not",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatcherIr {
    #[serde(rename = "call_matcher")]
    Call(CallMatcherIr),
    #[serde(rename = "variable_matcher")]
    Variable(VariableMatcherIr),
    #[serde(rename = "dataflow")]
    Dataflow(DataflowIr),
    #[serde(rename = "logic_and")]
    LogicAnd(LogicIr),
    #[serde(rename = "logic_or")]
    LogicOr(LogicIr),
    #[serde(rename = "logic_not")]
    LogicNot(LogicIr),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMatcherIr {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub wildcard: bool,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub keyword_args: BTreeMap<String, ArgumentConstraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMatcherIr {
    pub pattern: String,
    #[serde(default)]
    pub wildcard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataflowIr {
    pub sources: Vec<CallMatcherIr>,
    pub sinks: Vec<CallMatcherIr>,
    #[serde(default)]
    pub sanitizers: Vec<CallMatcherIr>,
    #[serde(default)]
    pub scope: DataflowScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicIr {
    pub children: Vec<MatcherIr>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataflowScope {
    #[default]
    Local,
    Global,
}

impl std::fmt::Display for DataflowScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Expected value for one keyword argument: a JSON literal plus a wildcard
/// flag for string patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentConstraint {
    pub value: serde_json::Value,
    #[serde(default)]
    pub wildcard: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_matcher_round_trip() {
        let json = r#"{
            "type": "call_matcher",
            "patterns": ["request.*", "eval"],
            "wildcard": true,
            "matchMode": "any",
            "keywordArgs": {"debug": {"value": true, "wildcard": false}}
        }"#;
        let ir: MatcherIr = serde_json::from_str(json).unwrap();
        let MatcherIr::Call(call) = ir else {
            panic!("expected call matcher");
        };
        assert_eq!(call.patterns, vec!["request.*", "eval"]);
        assert!(call.wildcard);
        assert_eq!(call.match_mode, MatchMode::Any);
        assert_eq!(
            call.keyword_args.get("debug").unwrap().value,
            serde_json::Value::Bool(true)
        );
    }

    #[test]
    fn defaults_keep_backward_compatibility() {
        // A matcher with only patterns still parses: no keyword constraints,
        // exact matching, any-mode.
        let json = r#"{"type": "call_matcher", "patterns": ["eval"]}"#;
        let ir: MatcherIr = serde_json::from_str(json).unwrap();
        let MatcherIr::Call(call) = ir else {
            panic!("expected call matcher");
        };
        assert!(!call.wildcard);
        assert!(call.keyword_args.is_empty());
        assert_eq!(call.match_mode, MatchMode::Any);
    }

    #[test]
    fn dataflow_with_nested_matchers() {
        let json = r#"{
            "type": "dataflow",
            "sources": [{"patterns": ["request.*"], "wildcard": true}],
            "sinks": [{"patterns": ["eval"]}],
            "sanitizers": [{"patterns": ["escape"]}],
            "scope": "global"
        }"#;
        let ir: MatcherIr = serde_json::from_str(json).unwrap();
        let MatcherIr::Dataflow(flow) = ir else {
            panic!("expected dataflow");
        };
        assert_eq!(flow.scope, DataflowScope::Global);
        assert_eq!(flow.sources[0].patterns, vec!["request.*"]);
        assert_eq!(flow.sanitizers.len(), 1);
    }

    #[test]
    fn logic_nests_children() {
        let json = r#"{
            "type": "logic_and",
            "children": [
                {"type": "call_matcher", "patterns": ["eval"]},
                {"type": "logic_not", "children": [
                    {"type": "call_matcher", "patterns": ["escape"]}
                ]}
            ]
        }"#;
        let ir: MatcherIr = serde_json::from_str(json).unwrap();
        let MatcherIr::LogicAnd(and) = ir else {
            panic!("expected logic_and");
        };
        assert_eq!(and.children.len(), 2);
        assert!(matches!(and.children[1], MatcherIr::LogicNot(_)));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let json = r#"{"type": "regex_matcher", "patterns": ["x"]}"#;
        assert!(serde_json::from_str::<MatcherIr>(json).is_err());
    }
}
