use crate::domain::model::CaseResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRule {
    pub pattern: String,
    pub result: CaseResult,
}

/// 卷宗文字到判決結果的對照表；依序比對，第一個命中的規則生效
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRules {
    pub rules: Vec<ResultRule>,
}

impl Default for ResultRules {
    fn default() -> Self {
        let rule = |pattern: &str, result| ResultRule {
            pattern: pattern.to_string(),
            result,
        };
        Self {
            rules: vec![
                rule("SUSTAINED", CaseResult::Sustained),
                rule("JUDGMENT FOR OPPOSER", CaseResult::Sustained),
                rule("DISMISSED", CaseResult::Dismissed),
                rule("JUDGMENT FOR APPLICANT", CaseResult::Dismissed),
                rule("PENDING", CaseResult::Pending),
                rule("SUSPENDED", CaseResult::Pending),
            ],
        }
    }
}

impl ResultRules {
    pub fn new(rules: Vec<ResultRule>) -> Self {
        Self { rules }
    }

    pub fn match_text(&self, text: &str) -> Option<CaseResult> {
        let haystack = text.to_uppercase();
        self.rules
            .iter()
            .filter(|rule| !rule.pattern.trim().is_empty())
            .find(|rule| haystack.contains(&rule.pattern.to_uppercase()))
            .map(|rule| rule.result)
    }

    /// 只接受成立/駁回這類終局結果，用於掃描程序歷程
    pub fn match_decisive(&self, text: &str) -> Option<CaseResult> {
        let haystack = text.to_uppercase();
        self.rules
            .iter()
            .filter(|rule| rule.result.is_decisive() && !rule.pattern.trim().is_empty())
            .find(|rule| haystack.contains(&rule.pattern.to_uppercase()))
            .map(|rule| rule.result)
    }

    pub fn normalize(&self, text: &str) -> CaseResult {
        self.match_text(text).unwrap_or(CaseResult::Unknown)
    }
}
