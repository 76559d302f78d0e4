use crate::domain::model::{CaseResult, MarkType, OppositionCase, PartyRole};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

/// 報表用的單一案件摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSummary {
    pub proceeding_number: String,
    pub plaintiffs: String,
    pub defendants: String,
    pub filing_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub last_action_date: Option<NaiveDate>,
    pub result: CaseResult,
    pub result_code: Option<u8>,
    pub marks: usize,
    pub plaintiff_marks: usize,
    pub defendant_marks: usize,
    pub us_class_count: usize,
    pub us_classes: String,
    pub international_class_count: usize,
    pub international_classes: String,
    pub standard_text_marks: usize,
    pub stylized_design_marks: usize,
    pub slogan_marks: usize,
    pub unclassified_marks: usize,
    pub searched_party_is_plaintiff: Option<bool>,
    pub errors: usize,
}

fn join_classes(classes: &BTreeSet<u16>) -> String {
    classes
        .iter()
        .map(|class| format!("{:03}", class))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CaseSummary {
    pub fn from_case(case: &OppositionCase, searched_party: Option<&str>) -> Self {
        let count_owner = |role| case.marks.iter().filter(|m| m.owner == Some(role)).count();
        let count_type = |mark_type| {
            case.marks
                .iter()
                .filter(|m| m.mark_type == mark_type)
                .count()
        };
        let us_classes = case.unique_us_classes();
        let international_classes = case.unique_international_classes();

        Self {
            proceeding_number: case.proceeding_number.clone(),
            plaintiffs: case.plaintiffs.join("; "),
            defendants: case.defendants.join("; "),
            filing_date: case.filing_date,
            termination_date: case.termination_date,
            last_action_date: case.last_action_date,
            result: case.result,
            result_code: case.result.code(),
            marks: case.marks.len(),
            plaintiff_marks: count_owner(PartyRole::Plaintiff),
            defendant_marks: count_owner(PartyRole::Defendant),
            us_class_count: us_classes.len(),
            us_classes: join_classes(&us_classes),
            international_class_count: international_classes.len(),
            international_classes: join_classes(&international_classes),
            standard_text_marks: count_type(MarkType::StandardText),
            stylized_design_marks: count_type(MarkType::StylizedDesign),
            slogan_marks: count_type(MarkType::Slogan),
            unclassified_marks: count_type(MarkType::Unknown),
            searched_party_is_plaintiff: searched_party
                .and_then(|party| case.role_of(party))
                .map(|role| role == PartyRole::Plaintiff),
            errors: case.errors().count(),
        }
    }
}
