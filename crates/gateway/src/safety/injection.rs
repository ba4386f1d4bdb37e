//! Prompt-injection heuristics.
//!
//! A fixed pattern list scanned against the sanitized user message. Only
//! `High` severity matches reject the request; `Medium` and `Low` matches
//! are logged for operators but allowed through, since they overlap with
//! legitimate phrasing.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct InjectionMatch {
    pub category: &'static str,
    pub severity: Severity,
}

struct Pattern {
    regex: Regex,
    category: &'static str,
    severity: Severity,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: &[(&str, &str, Severity)] = &[
            // Instruction override
            (
                r"(?i)ignore\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions|prompts|rules|messages)",
                "instruction_override",
                Severity::High,
            ),
            (
                r"(?i)disregard\s+(your|the|all)\s+(system\s+)?(prompt|instructions|rules)",
                "instruction_override",
                Severity::High,
            ),
            (
                r"(?i)forget\s+(everything|all)\s+(you|above)",
                "instruction_override",
                Severity::High,
            ),
            // System prompt exfiltration
            (
                r"(?i)(show|reveal|print|repeat|output|tell)\s+(me\s+)?(your|the)\s+(system|initial|hidden|original)\s+(prompt|instructions|message)",
                "system_prompt_exfiltration",
                Severity::High,
            ),
            // Role manipulation
            (
                r"(?i)you\s+are\s+now\s+(a|an|the)\b",
                "role_manipulation",
                Severity::Medium,
            ),
            (
                r"(?i)pretend\s+(to\s+be|you\s+are)",
                "role_manipulation",
                Severity::Medium,
            ),
            (
                r"(?i)act\s+as\s+(if\s+you|a\s+different|an?\s+unrestricted)",
                "role_manipulation",
                Severity::Medium,
            ),
            // Known jailbreaks
            (r"(?i)\bdan\s+mode\b", "jailbreak", Severity::High),
            (
                r"(?i)developer\s+mode\s+(enabled|on|activated)",
                "jailbreak",
                Severity::High,
            ),
            (r"(?i)\bjailbreak\b", "jailbreak", Severity::High),
            // Command injection
            (
                r"(?i)\brm\s+-rf\b|\bsudo\s+rm\b",
                "command_injection",
                Severity::High,
            ),
            (
                r"(?i)(;|\|\||&&)\s*(curl|wget|bash|sh)\s",
                "command_injection",
                Severity::High,
            ),
        ];
        table
            .iter()
            .map(|(pattern, category, severity)| Pattern {
                regex: Regex::new(pattern).expect("injection pattern must compile"),
                category,
                severity: *severity,
            })
            .collect()
    })
}

/// Scan a message. Returns the highest-severity match, if any.
pub fn scan(text: &str) -> Option<InjectionMatch> {
    patterns()
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| InjectionMatch {
            category: p.category,
            severity: p.severity,
        })
        .max_by_key(|m| m.severity)
}

/// Whether a match should reject the request.
pub fn is_rejecting(m: &InjectionMatch) -> bool {
    m.severity == Severity::High
}
