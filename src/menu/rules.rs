//! Matching rules of `<Include>` and `<Exclude>` elements.

use crate::models::AppEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Filename(String),
    Category(String),
    All,
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Vec<Rule>),
}

impl Rule {
    pub fn matches(&self, entry: &AppEntry) -> bool {
        match self {
            Rule::Filename(id) => entry.id == *id,
            Rule::Category(category) => entry.in_category(category),
            Rule::All => true,
            Rule::And(rules) => rules.iter().all(|rule| rule.matches(entry)),
            Rule::Or(rules) => rules.iter().any(|rule| rule.matches(entry)),
            // <Not> holds an implicit <Or>
            Rule::Not(rules) => !rules.iter().any(|rule| rule.matches(entry)),
        }
    }
}
