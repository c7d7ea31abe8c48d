use std::collections::HashMap;

use regex::Regex;

use super::rule::{Rule, ANY};

const PROCESS_EXACT: u32 = 10;
const PROCESS_ANY: u32 = 1;
const ADDR_EXACT: u32 = 5;
const ADDR_PATTERN: u32 = 4;
const PORT_EXACT: u32 = 3;

/// An outbound connection attempt to be matched against the rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowInfo {
    pub process: String,
    pub endpoint_addr: String,
    pub endpoint_port: String,
}

impl FlowInfo {
    pub fn new(
        process: impl Into<String>,
        endpoint_addr: impl Into<String>,
        endpoint_port: impl Into<String>,
    ) -> Self {
        Self {
            process: process.into(),
            endpoint_addr: endpoint_addr.into(),
            endpoint_port: endpoint_port.into(),
        }
    }
}

/// The winning rule and its specificity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult<'a> {
    pub rule: &'a Rule,
    pub score: u32,
}

/// Compiled address patterns keyed by pattern text.
///
/// Built once per rule-list replacement so the per-flow path never compiles
/// a regex. A pattern that fails to compile is cached as `None` and never
/// matches.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternCache {
    pub fn build(rules: &[Rule]) -> Self {
        let mut cache = Self::default();
        for rule in rules.iter().filter(|r| r.is_regex) {
            cache.insert(&rule.endpoint_addr);
        }
        cache
    }

    pub fn insert(&mut self, pattern: &str) {
        if !self.compiled.contains_key(pattern) {
            let compiled = match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Ignoring invalid endpoint pattern {:?}: {}", pattern, e);
                    None
                }
            };
            self.compiled.insert(pattern.to_string(), compiled);
        }
    }

    pub fn is_match(&self, pattern: &str, addr: &str) -> bool {
        match self.compiled.get(pattern) {
            Some(Some(re)) => re.is_match(addr),
            Some(None) => false,
            None => Regex::new(pattern).map(|re| re.is_match(addr)).unwrap_or(false),
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Score a rule against a flow.
///
/// Returns `None` when the rule is not a candidate (process selector does
/// not apply) or is disqualified on address or port. Exact matches outweigh
/// wildcards on every dimension; [`ANY`] contributes nothing beyond the
/// process term.
pub fn score(rule: &Rule, flow: &FlowInfo, patterns: &PatternCache) -> Option<u32> {
    let mut score = if rule.process == flow.process {
        PROCESS_EXACT
    } else if rule.process == ANY {
        PROCESS_ANY
    } else if rule.is_global {
        0
    } else {
        return None;
    };

    if rule.endpoint_addr == flow.endpoint_addr {
        score += ADDR_EXACT;
    } else if rule.endpoint_addr == ANY {
        // wildcard
    } else if rule.is_regex && patterns.is_match(&rule.endpoint_addr, &flow.endpoint_addr) {
        score += ADDR_PATTERN;
    } else {
        return None;
    }

    if rule.endpoint_port == flow.endpoint_port {
        score += PORT_EXACT;
    } else if rule.endpoint_port != ANY {
        return None;
    }

    Some(score)
}

/// Find the most specific rule governing a flow.
///
/// Rules are scanned in list order and only a strictly higher score replaces
/// the current best, so among equal scores the earliest rule wins.
pub fn find_best_match<'a>(
    rules: &'a [Rule],
    flow: &FlowInfo,
    patterns: &PatternCache,
) -> Option<MatchResult<'a>> {
    let mut best: Option<MatchResult<'a>> = None;

    for rule in rules {
        let Some(score) = score(rule, flow, patterns) else {
            continue;
        };
        if best.map_or(true, |b| score > b.score) {
            best = Some(MatchResult { rule, score });
        }
    }

    best
}
