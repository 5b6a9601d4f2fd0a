//! `@` mentions of users.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{SuggestionItem, SuggestionOptions, SuggestionProvider};
use crate::editing::{DocumentEngine, EngineError, Patch, Step, Transaction};
use crate::nodes::Mark;

pub const MENTION_TRIGGER: char = '@';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl MentionItem {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            avatar: None,
        }
    }
}

impl SuggestionItem for MentionItem {
    fn label(&self) -> &str {
        &self.label
    }
}

/// Users offered when no list is configured
pub fn demo_users() -> Vec<MentionItem> {
    [
        "Alice Johnson",
        "Bob Smith",
        "Charlie Brown",
        "Diana Prince",
        "Ethan Hunt",
        "Fiona Apple",
        "George Martin",
        "Hannah Montana",
    ]
    .iter()
    .enumerate()
    .map(|(i, label)| MentionItem::new(&(i + 1).to_string(), label))
    .collect()
}

pub fn mention_options() -> SuggestionOptions {
    SuggestionOptions::new(MENTION_TRIGGER)
}

pub struct MentionProvider {
    users: Vec<MentionItem>,
}

impl MentionProvider {
    pub fn new(users: Vec<MentionItem>) -> Self {
        Self { users }
    }
}

impl Default for MentionProvider {
    fn default() -> Self {
        Self::new(demo_users())
    }
}

impl SuggestionProvider for MentionProvider {
    type Item = MentionItem;

    fn items(&self, query: &str) -> Vec<MentionItem> {
        let query = query.to_lowercase();
        self.users
            .iter()
            .filter(|user| user.label.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// `@label` marked with the user id, then a space
    fn command(
        &self,
        item: &MentionItem,
        range: Range<usize>,
        engine: &mut dyn DocumentEngine,
    ) -> Result<Patch, EngineError> {
        let at = range.start;
        let text = format!("{MENTION_TRIGGER}{}", item.label);
        let after = at + text.len();
        let tr = Transaction::new()
            .delete(range)
            .step(Step::InsertMarkedText {
                at,
                text,
                mark: Mark::Mention {
                    id: item.id.clone(),
                },
            })
            .insert_text(after, " ");
        engine.dispatch(tr)
    }

    fn empty_message(&self) -> &'static str {
        "No users found"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::Document;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn labels(items: Vec<MentionItem>) -> Vec<String> {
        items.into_iter().map(|i| i.label).collect()
    }

    #[rstest]
    #[case("", 8)]
    #[case("AL", 1)]
    #[case("an", 3)]
    #[case("zz", 0)]
    fn test_filter_is_case_insensitive(#[case] query: &str, #[case] count: usize) {
        assert_eq!(MentionProvider::default().items(query).len(), count);
    }

    #[test]
    fn test_filter_keeps_list_order() {
        assert_eq!(
            labels(MentionProvider::default().items("an")),
            vec!["Diana Prince", "Ethan Hunt", "Hannah Montana"]
        );
    }

    #[test]
    fn test_commit_inserts_marked_mention_and_space() {
        let mut doc = Document::from_text("hi @ali");
        let provider = MentionProvider::default();
        let alice = provider.items("ali").remove(0);

        provider.command(&alice, 4..8, &mut doc).unwrap();

        assert_eq!(doc.text_between(0, doc.size()), "hi @Alice Johnson ");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.selection(), 19..19);
        let marks = doc.marks_at(5);
        assert_eq!(marks.len(), 1);
        // block-local offsets; the trailing space is unmarked
        assert_eq!(marks[0].range, 3..17);
        assert_eq!(marks[0].mark, Mark::Mention { id: "1".to_string() });
    }
}
