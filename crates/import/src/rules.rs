use std::collections::HashSet;

use kakeibo_core::entry::{Category, CategoryId, EntryKind};
use kakeibo_core::text::fold;
use serde::{Deserialize, Serialize};

/// Priority tier for rules created by the learning feedback loop. Above the
/// bootstrap tier so a user's confirmed choice beats the shipped defaults,
/// below nothing else by convention (user-authored rules pick their own).
pub const LEARNED_PRIORITY: i32 = 10;
pub const BOOTSTRAP_PRIORITY: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMatchType {
    Contains,
    Prefix,
    Suffix,
    Exact,
}

impl RuleMatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMatchType::Contains => "contains",
            RuleMatchType::Prefix => "prefix",
            RuleMatchType::Suffix => "suffix",
            RuleMatchType::Exact => "exact",
        }
    }
}

impl std::str::FromStr for RuleMatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(RuleMatchType::Contains),
            "prefix" => Ok(RuleMatchType::Prefix),
            "suffix" => Ok(RuleMatchType::Suffix),
            "exact" => Ok(RuleMatchType::Exact),
            other => Err(format!("unknown match type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub id: i64,
    /// Folded matching text (see `kakeibo_core::text::fold`).
    pub keyword: String,
    pub match_type: RuleMatchType,
    pub category_id: CategoryId,
    /// Expense or Income; transfers are never rule-classified.
    pub kind: EntryKind,
    /// Higher evaluated first; ties broken by creation order.
    pub priority: i32,
    pub enabled: bool,
}

/// Outcome of a learn call; `Added` is the only mutating one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    Added(i64),
    AlreadyPredicted,
    ConflictingExact,
    DescriptionTooShort,
    TransferNotLearnable,
    UnknownCategory,
}

/// The one owner of the classification rule set. Injected wherever
/// suggestions are needed; nothing else mutates rules.
pub struct RuleService {
    rules: Vec<ClassificationRule>,
    catalog: HashSet<CategoryId>,
    next_id: i64,
}

impl RuleService {
    pub fn new(
        rules: Vec<ClassificationRule>,
        catalog: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        let next_id = rules.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        Self {
            rules,
            catalog: catalog.into_iter().collect(),
            next_id,
        }
    }

    /// First-run rule set from the bundled TOML, with category names resolved
    /// against the ledger's catalog. Rules naming a category the catalog
    /// lacks are dropped with a warning.
    pub fn bootstrap(toml_content: &str, categories: &[Category]) -> Result<Self, String> {
        #[derive(Deserialize)]
        struct BootstrapRule {
            keyword: String,
            match_type: RuleMatchType,
            category: String,
            kind: EntryKind,
            #[serde(default)]
            priority: Option<i32>,
        }
        #[derive(Deserialize)]
        struct BootstrapFile {
            rules: Vec<BootstrapRule>,
        }

        let file: BootstrapFile =
            toml::from_str(toml_content).map_err(|e| format!("bad bootstrap rules: {e}"))?;

        let mut service =
            RuleService::new(Vec::new(), categories.iter().map(|c| c.id));
        for raw in file.rules {
            let Some(category) = categories.iter().find(|c| c.name == raw.category) else {
                tracing::warn!(category = %raw.category, keyword = %raw.keyword,
                    "bootstrap rule names an unknown category, skipping");
                continue;
            };
            service.add_rule(
                &raw.keyword,
                raw.match_type,
                category.id,
                raw.kind,
                raw.priority.unwrap_or(BOOTSTRAP_PRIORITY),
            );
        }
        Ok(service)
    }

    /// Author a rule directly. The keyword is folded before storage.
    pub fn add_rule(
        &mut self,
        keyword: &str,
        match_type: RuleMatchType,
        category_id: CategoryId,
        kind: EntryKind,
        priority: i32,
    ) -> i64 {
        let id = self.next_id;
        let rule = ClassificationRule {
            id,
            keyword: fold(keyword),
            match_type,
            category_id,
            kind,
            priority,
            enabled: true,
        };
        self.next_id += 1;
        self.rules.push(rule);
        id
    }

    pub fn list(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Disabling is the only soft-removal path; rules are never deleted.
    pub fn set_enabled(&mut self, id: i64, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Suggest a category for a row given all of its matchable texts
    /// (description, raw category label, ...). Enabled rules of the matching
    /// kind are evaluated highest-priority first, creation order breaking
    /// ties; the first rule whose condition holds wins.
    pub fn suggest(&self, texts: &[&str], kind: EntryKind) -> Option<CategoryId> {
        if kind == EntryKind::Transfer {
            return None;
        }
        let folded: Vec<String> = texts
            .iter()
            .map(|t| fold(t))
            .filter(|t| !t.is_empty())
            .collect();
        if folded.is_empty() {
            return None;
        }

        for rule in self.ordered() {
            if !rule.enabled || rule.kind != kind {
                continue;
            }
            if !self.catalog.contains(&rule.category_id) {
                // Inert rule: target category no longer resolvable.
                tracing::warn!(rule_id = rule.id, keyword = %rule.keyword,
                    "classification rule has no resolvable target category, skipping");
                continue;
            }
            if folded.iter().any(|text| rule_matches(rule, text)) {
                return Some(rule.category_id);
            }
        }
        None
    }

    /// Learning feedback: called when a user manually assigns a category.
    /// Appends a contains-rule at the learned tier unless the choice is
    /// already predicted, the description is too short, or an exact rule for
    /// this description+kind already maps elsewhere.
    pub fn learn(
        &mut self,
        description: &str,
        kind: EntryKind,
        category_id: CategoryId,
    ) -> LearnOutcome {
        if kind == EntryKind::Transfer {
            return LearnOutcome::TransferNotLearnable;
        }
        let keyword = fold(description);
        if keyword.chars().count() < 2 {
            return LearnOutcome::DescriptionTooShort;
        }
        if !self.catalog.contains(&category_id) {
            return LearnOutcome::UnknownCategory;
        }
        if self.suggest(&[description], kind) == Some(category_id) {
            return LearnOutcome::AlreadyPredicted;
        }
        if self.rules.iter().any(|r| {
            r.kind == kind && r.keyword == keyword && r.category_id != category_id
        }) {
            return LearnOutcome::ConflictingExact;
        }

        let id =
            self.add_rule(&keyword, RuleMatchType::Contains, category_id, kind, LEARNED_PRIORITY);
        tracing::debug!(rule_id = id, keyword = %keyword, "learned classification rule");
        LearnOutcome::Added(id)
    }

    /// Evaluation order: priority descending, then creation order.
    fn ordered(&self) -> Vec<&ClassificationRule> {
        let mut ordered: Vec<&ClassificationRule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| std::cmp::Reverse(r.priority));
        ordered
    }
}

fn rule_matches(rule: &ClassificationRule, text: &str) -> bool {
    match rule.match_type {
        RuleMatchType::Contains => text.contains(&rule.keyword),
        RuleMatchType::Prefix => text.starts_with(&rule.keyword),
        RuleMatchType::Suffix => text.ends_with(&rule.keyword),
        RuleMatchType::Exact => text == rule.keyword,
    }
}

/// Default first-run rule set; category names must match the seeded catalog.
pub const DEFAULT_RULES_TOML: &str = r#"
[[rules]]
keyword = "ローソン"
match_type = "contains"
category = "食費"
kind = "expense"

[[rules]]
keyword = "セブン"
match_type = "contains"
category = "食費"
kind = "expense"

[[rules]]
keyword = "ファミリーマート"
match_type = "contains"
category = "食費"
kind = "expense"

[[rules]]
keyword = "amazon"
match_type = "contains"
category = "通販"
kind = "expense"

[[rules]]
keyword = "楽天"
match_type = "contains"
category = "通販"
kind = "expense"

[[rules]]
keyword = "jr"
match_type = "prefix"
category = "交通費"
kind = "expense"

[[rules]]
keyword = "タクシー"
match_type = "contains"
category = "交通費"
kind = "expense"

[[rules]]
keyword = "電気"
match_type = "contains"
category = "光熱費"
kind = "expense"

[[rules]]
keyword = "ガス"
match_type = "contains"
category = "光熱費"
kind = "expense"

[[rules]]
keyword = "水道"
match_type = "contains"
category = "光熱費"
kind = "expense"

[[rules]]
keyword = "薬局"
match_type = "contains"
category = "医療費"
kind = "expense"

[[rules]]
keyword = "給与"
match_type = "contains"
category = "給与"
kind = "income"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<Category> {
        [
            (1, "食費", EntryKind::Expense),
            (2, "通販", EntryKind::Expense),
            (3, "交通費", EntryKind::Expense),
            (4, "光熱費", EntryKind::Expense),
            (5, "医療費", EntryKind::Expense),
            (6, "給与", EntryKind::Income),
        ]
        .into_iter()
        .map(|(id, name, kind)| Category {
            id: CategoryId(id),
            name: name.to_string(),
            kind,
        })
        .collect()
    }

    fn service() -> RuleService {
        RuleService::new(Vec::new(), categories().iter().map(|c| c.id))
    }

    #[test]
    fn contains_match_is_width_and_case_insensitive() {
        let mut svc = service();
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 0);
        assert_eq!(
            svc.suggest(&["ＡＭＡＺＯＮ．ＣＯ．ＪＰ"], EntryKind::Expense),
            Some(CategoryId(2))
        );
    }

    #[test]
    fn prefix_suffix_exact_semantics() {
        let mut svc = service();
        svc.add_rule("jr", RuleMatchType::Prefix, CategoryId(3), EntryKind::Expense, 0);
        svc.add_rule("銀行", RuleMatchType::Suffix, CategoryId(1), EntryKind::Expense, 0);
        svc.add_rule("バス", RuleMatchType::Exact, CategoryId(3), EntryKind::Expense, 0);

        assert_eq!(svc.suggest(&["JR東日本"], EntryKind::Expense), Some(CategoryId(3)));
        assert_eq!(svc.suggest(&["東日本JR社"], EntryKind::Expense), None);
        assert_eq!(svc.suggest(&["みずほ銀行"], EntryKind::Expense), Some(CategoryId(1)));
        assert_eq!(svc.suggest(&["バス"], EntryKind::Expense), Some(CategoryId(3)));
        assert_eq!(svc.suggest(&["バス停"], EntryKind::Expense), None);
    }

    #[test]
    fn higher_priority_wins_regardless_of_insertion_order() {
        let mut svc = service();
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 1);
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(1), EntryKind::Expense, 10);
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), Some(CategoryId(1)));

        // Same rules, opposite insertion order.
        let mut svc = service();
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(1), EntryKind::Expense, 10);
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 1);
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), Some(CategoryId(1)));
    }

    #[test]
    fn equal_priority_resolved_by_creation_order() {
        let mut svc = service();
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 5);
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(1), EntryKind::Expense, 5);
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), Some(CategoryId(2)));
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let mut svc = service();
        let id =
            svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 0);
        assert!(svc.set_enabled(id, false));
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), None);
        assert!(svc.set_enabled(id, true));
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), Some(CategoryId(2)));
    }

    #[test]
    fn inert_rule_is_skipped_not_fatal() {
        let mut svc = service();
        // Higher-priority rule pointing at a category the catalog lacks.
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(999), EntryKind::Expense, 10);
        svc.add_rule("amazon", RuleMatchType::Contains, CategoryId(2), EntryKind::Expense, 0);
        assert_eq!(svc.suggest(&["amazon.co.jp"], EntryKind::Expense), Some(CategoryId(2)));
    }

    #[test]
    fn kind_restricts_applicability() {
        let mut svc = service();
        svc.add_rule("給与", RuleMatchType::Contains, CategoryId(6), EntryKind::Income, 0);
        assert_eq!(svc.suggest(&["給与振込"], EntryKind::Income), Some(CategoryId(6)));
        assert_eq!(svc.suggest(&["給与振込"], EntryKind::Expense), None);
        assert_eq!(svc.suggest(&["給与振込"], EntryKind::Transfer), None);
    }

    #[test]
    fn suggest_considers_all_supplied_texts() {
        let mut svc = service();
        svc.add_rule("食料品", RuleMatchType::Contains, CategoryId(1), EntryKind::Expense, 0);
        // Description does not match, but the raw category label does.
        assert_eq!(
            svc.suggest(&["店舗1234", "食料品"], EntryKind::Expense),
            Some(CategoryId(1))
        );
    }

    #[test]
    fn learn_adds_contains_rule_at_learned_tier() {
        let mut svc = service();
        let outcome = svc.learn("スターバックス 渋谷", EntryKind::Expense, CategoryId(1));
        let LearnOutcome::Added(id) = outcome else {
            panic!("expected Added, got {outcome:?}");
        };
        let rule = svc.list().iter().find(|r| r.id == id).unwrap();
        assert_eq!(rule.match_type, RuleMatchType::Contains);
        assert_eq!(rule.priority, LEARNED_PRIORITY);
        assert_eq!(
            svc.suggest(&["スターバックス 渋谷"], EntryKind::Expense),
            Some(CategoryId(1))
        );
    }

    #[test]
    fn learn_is_a_noop_when_already_predicted() {
        let mut svc = service();
        svc.add_rule("スターバックス", RuleMatchType::Contains, CategoryId(1), EntryKind::Expense, 0);
        let before = svc.list().len();
        assert_eq!(
            svc.learn("スターバックス 渋谷", EntryKind::Expense, CategoryId(1)),
            LearnOutcome::AlreadyPredicted
        );
        assert_eq!(svc.list().len(), before);
    }

    #[test]
    fn learn_never_maps_same_description_to_two_categories() {
        let mut svc = service();
        assert!(matches!(
            svc.learn("スターバックス", EntryKind::Expense, CategoryId(1)),
            LearnOutcome::Added(_)
        ));
        assert_eq!(
            svc.learn("スターバックス", EntryKind::Expense, CategoryId(2)),
            LearnOutcome::ConflictingExact
        );
        // Same description, different kind: no conflict.
        assert!(matches!(
            svc.learn("スターバックス", EntryKind::Income, CategoryId(6)),
            LearnOutcome::Added(_)
        ));
    }

    #[test]
    fn learn_rejects_short_descriptions_and_transfers() {
        let mut svc = service();
        assert_eq!(
            svc.learn("a", EntryKind::Expense, CategoryId(1)),
            LearnOutcome::DescriptionTooShort
        );
        assert_eq!(
            svc.learn(" Ａ ", EntryKind::Expense, CategoryId(1)),
            LearnOutcome::DescriptionTooShort
        );
        assert_eq!(
            svc.learn("口座振替", EntryKind::Transfer, CategoryId(1)),
            LearnOutcome::TransferNotLearnable
        );
        assert_eq!(
            svc.learn("スターバックス", EntryKind::Expense, CategoryId(999)),
            LearnOutcome::UnknownCategory
        );
    }

    #[test]
    fn bootstrap_resolves_names_and_skips_unknown() {
        let toml = r#"
            [[rules]]
            keyword = "ローソン"
            match_type = "contains"
            category = "食費"
            kind = "expense"

            [[rules]]
            keyword = "ネコカフェ"
            match_type = "contains"
            category = "存在しない"
            kind = "expense"
        "#;
        let svc = RuleService::bootstrap(toml, &categories()).unwrap();
        assert_eq!(svc.list().len(), 1);
        assert_eq!(
            svc.suggest(&["ローソン 渋谷"], EntryKind::Expense),
            Some(CategoryId(1))
        );
    }

    #[test]
    fn default_rules_toml_parses_cleanly() {
        let svc = RuleService::bootstrap(DEFAULT_RULES_TOML, &categories()).unwrap();
        assert!(svc.list().len() >= 10);
        assert_eq!(
            svc.suggest(&["ＡＭＡＺＯＮ．ＣＯ．ＪＰ"], EntryKind::Expense),
            Some(CategoryId(2))
        );
    }
}
