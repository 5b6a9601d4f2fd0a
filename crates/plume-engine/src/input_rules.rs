//! # Input Transformation Rules
//!
//! Pattern rules checked on every typed character. When the text before
//! the cursor plus the typed text ends with a pattern, the typed text is
//! swallowed and the match is replaced, all in the transaction that would
//! have inserted the character.
//!
//! Two families exist:
//! - emoji shortcuts (`:)` → 🙂), which need start-of-text or whitespace
//!   before the shortcut and no word character after the cursor
//! - node rules (`~~~` → spaghetto), which replace the match with a block node

use std::sync::OnceLock;

use regex::Regex;

use crate::editing::{DocumentEngine, Transaction};
use crate::nodes::NodeKind;

/// Emoji and the shortcuts typed for it, in matching order
pub const EMOJI_CATALOG: &[(&str, &[&str])] = &[
    ("😀", &[":D"]),
    ("😆", &["xD", "XD"]),
    ("😅", &["^^"]),
    ("😉", &[";)"]),
    ("🙂", &[":)"]),
    ("😗", &[":3"]),
    ("😐", &[":|"]),
    ("😑", &["-_-"]),
    ("😕", &[":\\", ":/"]),
    ("😟", &[":("]),
    ("😮", &[":O"]),
    ("😖", &[":S"]),
    ("😭", &[";_;", "T_T", "QQ"]),
    ("😜", &[":P", ";P"]),
    ("😣", &["D:"]),
    ("😏", &[">:)"]),
    ("😡", &["D:<", ">:("]),
    ("❤️", &["<3"]),
    ("😢", &[":'(", ":'-("]),
    ("😎", &["B)", "B-)"]),
    ("🤔", &[":thinking:", "hmm"]),
    ("🤮", &[":x", ":X"]),
    ("😴", &["-.-", "zzz"]),
    ("💕", &["<33"]),
    ("🎉", &[":party:", ":yay:"]),
];

/// Typed sequence that becomes a spaghetto block
pub const SPAGHETTO_SHORTCUT: &str = "~~~";

#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Text(&'static str),
    Node(NodeKind),
}

#[derive(Debug, Clone)]
pub struct InputRule {
    pattern: Regex,
    replacement: Replacement,
    /// Emoji rules back off when a word character follows the cursor
    word_boundary: bool,
}

impl InputRule {
    pub fn replacement(&self) -> &Replacement {
        &self.replacement
    }
}

fn emoji_rules() -> &'static [InputRule] {
    static RULES: OnceLock<Vec<InputRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        EMOJI_CATALOG
            .iter()
            .map(|(emoji, shortcuts)| {
                let alternatives: Vec<String> =
                    shortcuts.iter().map(|s| regex::escape(s)).collect();
                let pattern = format!(r"(^|\s)({})$", alternatives.join("|"));
                InputRule {
                    pattern: Regex::new(&pattern).expect("Invalid emoji pattern"),
                    replacement: Replacement::Text(*emoji),
                    word_boundary: true,
                }
            })
            .collect()
    })
}

fn node_rules() -> &'static [InputRule] {
    static RULES: OnceLock<Vec<InputRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![InputRule {
            pattern: Regex::new(&format!("{}$", regex::escape(SPAGHETTO_SHORTCUT)))
                .expect("Invalid spaghetto pattern"),
            replacement: Replacement::Node(NodeKind::Spaghetto),
            word_boundary: false,
        }]
    })
}

/// Ordered set of active rules; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct InputRules {
    rules: Vec<&'static InputRule>,
}

impl InputRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emoji shortcuts followed by node rules
    pub fn standard() -> Self {
        Self::new().with_emoji().with_node_rules()
    }

    pub fn with_emoji(mut self) -> Self {
        self.rules.extend(emoji_rules());
        self
    }

    pub fn with_node_rules(mut self) -> Self {
        self.rules.extend(node_rules());
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Transaction replacing `from..to` plus `typed` when a rule matches.
    ///
    /// `from..to` is the range the typed text would replace; rules only fire
    /// inside a single text block.
    pub fn handle_text_input(
        &self,
        engine: &dyn DocumentEngine,
        from: usize,
        to: usize,
        typed: &str,
    ) -> Option<Transaction> {
        let block = engine.textblock_range(from)?;
        if to > block.end {
            return None;
        }
        let text = engine.text_between(block.start, from) + typed;
        let after = engine.text_between(to, (to + 1).min(block.end));
        let word_follows = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');

        for rule in &self.rules {
            let Some(found) = rule.pattern.captures(&text) else {
                continue;
            };
            if rule.word_boundary && word_follows {
                continue;
            }
            let Some(whole) = found.get(0) else {
                continue;
            };
            let lead = found
                .get(1)
                .filter(|m| m.as_str().chars().all(char::is_whitespace))
                .map_or(0, |m| m.len());
            let start = block.start + whole.start() + lead;
            log::debug!("input rule matched {:?} at {start}", whole.as_str());

            let tr = match &rule.replacement {
                Replacement::Text(emoji) => Transaction::new().replace_text(start..to, *emoji),
                Replacement::Node(kind) => Transaction::new().replace_with(start, to, kind.clone()),
            };
            return Some(tr);
        }
        None
    }
}
