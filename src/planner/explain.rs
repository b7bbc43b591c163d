//! Explain output: per-plan, per-clause, and whole-query execution info.

use serde::Serialize;
use serde_json::Value;

/// One raced plan's account of itself.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ExplainPlanInfo {
    /// Cursor display name, e.g. `BtreeCursor a_1`.
    pub cursor: String,
    /// Index bounds description.
    pub index_bounds: Value,
    /// Keys examined by this plan.
    pub nscanned: u64,
    /// Whether this plan won its clause.
    pub picked: bool,
}

/// One `$or` clause: every plan raced for it plus totals.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ExplainClauseInfo {
    pub plans: Vec<ExplainPlanInfo>,
    /// Documents returned by the clause.
    pub n: u64,
    /// Keys examined by the winning plan.
    pub nscanned: u64,
}

impl ExplainClauseInfo {
    pub fn add_plan_info(&mut self, info: ExplainPlanInfo) {
        self.plans.push(info);
    }
}

/// The whole query: one entry per clause (a single entry when there is no
/// `$or`), plus yield counters.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ExplainQueryInfo {
    pub clauses: Vec<ExplainClauseInfo>,
    pub n_yields: u64,
}

impl ExplainQueryInfo {
    pub fn add_clause_info(&mut self, info: ExplainClauseInfo) {
        self.clauses.push(info);
    }

    pub fn note_yield(&mut self) {
        self.n_yields += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulation() {
        let mut query = ExplainQueryInfo::default();
        let mut clause = ExplainClauseInfo::default();
        clause.add_plan_info(ExplainPlanInfo {
            cursor: "BtreeCursor a_1".into(),
            index_bounds: serde_json::json!({"a": [[1, 1]]}),
            nscanned: 3,
            picked: true,
        });
        clause.n = 2;
        query.add_clause_info(clause);
        query.note_yield();

        assert_eq!(query.clauses.len(), 1);
        assert_eq!(query.clauses[0].plans.len(), 1);
        assert_eq!(query.n_yields, 1);

        let rendered = serde_json::to_value(&query).unwrap();
        assert_eq!(
            rendered["clauses"][0]["plans"][0]["cursor"],
            "BtreeCursor a_1"
        );
    }
}
