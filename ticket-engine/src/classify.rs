//! Keyword classification for tickets filed without a category or priority.
//!
//! Matching is case-insensitive and anchored at word starts, so "crashes"
//! counts as a crash report while "debug" is not a bug.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Category, Priority};

static BUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bug|error|crash|broken|not working)")
        .expect("BUG_PATTERN regex should compile")
});
static BILLING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(billing|payment|money|charge|refund)")
        .expect("BILLING_PATTERN regex should compile")
});
static GAMEPLAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(gameplay|game|play|level|quest)")
        .expect("GAMEPLAY_PATTERN regex should compile")
});
static ACCOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(account|login|password|access)")
        .expect("ACCOUNT_PATTERN regex should compile")
});
static FEATURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(feature|suggest|idea|improve)")
        .expect("FEATURE_PATTERN regex should compile")
});

static URGENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(emergency|critical|urgent|immediate|blocking)")
        .expect("URGENT_PATTERN regex should compile")
});
static HIGH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(crash|login|payment|security|hack)")
        .expect("HIGH_PATTERN regex should compile")
});
static WIDESPREAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all players|server|everyone)")
        .expect("WIDESPREAD_PATTERN regex should compile")
});

fn content(title: &str, description: &str) -> String {
    format!("{} {}", title, description)
}

/// Pick a category from the ticket text. First matching rule wins.
pub fn categorize(title: &str, description: &str) -> Category {
    let text = content(title, description);
    let rules: [(&LazyLock<Regex>, Category); 5] = [
        (&BUG_PATTERN, Category::BugReport),
        (&BILLING_PATTERN, Category::Billing),
        (&GAMEPLAY_PATTERN, Category::Gameplay),
        (&ACCOUNT_PATTERN, Category::Account),
        (&FEATURE_PATTERN, Category::FeatureRequest),
    ];
    rules
        .iter()
        .find(|(pattern, _)| pattern.is_match(&text))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}

/// Pick a priority from the ticket text and its (possibly inferred) category.
pub fn infer_priority(title: &str, description: &str, category: Category) -> Priority {
    let text = content(title, description);

    if URGENT_PATTERN.is_match(&text) {
        return Priority::Urgent;
    }
    if HIGH_PATTERN.is_match(&text) {
        return Priority::High;
    }

    match category {
        Category::BugReport if WIDESPREAD_PATTERN.is_match(&text) => Priority::High,
        Category::Billing | Category::Account => Priority::High,
        _ => Priority::Normal,
    }
}
