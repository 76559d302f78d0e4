use crate::adapters::ttabvue::html::{scan_rows, HtmlRow};
use crate::domain::model::{
    CaseResult, DateRange, DocketRecord, PartyRole, PleadedMark, ProceedingRef,
};
use crate::domain::result_rules::ResultRules;
use crate::utils::error::{PipelineError, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}/\d{2}/\d{4})").expect("date pattern is valid"));
static SERIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{8})\b").expect("serial pattern is valid"));
static SERIAL_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:caseNumber|sn)=(\d{8})\b").expect("serial param pattern is valid")
});
static PNO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pno=(\d+)").expect("pno pattern is valid"));
static PTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pty=([A-Za-z]+)").expect("pty pattern is valid"));

const SOURCE: &str = "ttabvue";

/// 頁面表示查無此程序時會出現的字樣
const NOT_FOUND_MARKERS: [&str; 4] = [
    "no proceedings found",
    "no records found",
    "proceeding not found",
    "invalid proceeding number",
];

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_RE
        .captures(text)
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%m/%d/%Y").ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Party(PartyRole),
    Other,
    History(usize),
}

/// 卷宗頁的強型別中介結構；欄位缺漏即為 None/空集合
#[derive(Debug, Default)]
struct DocketPage {
    plaintiffs: Vec<String>,
    defendants: Vec<String>,
    labelled_filing_date: Option<NaiveDate>,
    history_filing_date: Option<NaiveDate>,
    termination_date: Option<NaiveDate>,
    last_action_date: Option<NaiveDate>,
    status_text: Option<String>,
    decisive_result: Option<CaseResult>,
    history_found: bool,
    marks: Vec<PleadedMark>,
}

impl DocketPage {
    fn is_recognized(&self) -> bool {
        !self.plaintiffs.is_empty()
            || !self.defendants.is_empty()
            || self.history_found
            || self.labelled_filing_date.is_some()
            || !self.marks.is_empty()
    }

    fn result(&self, rules: &ResultRules) -> CaseResult {
        if let Some(result) = self.decisive_result {
            return result;
        }
        if let Some(result) = self.status_text.as_deref().and_then(|s| rules.match_text(s)) {
            return result;
        }
        if self.termination_date.is_none() {
            CaseResult::Pending
        } else {
            CaseResult::Unknown
        }
    }

    fn add_party(&mut self, role: PartyRole, name: String) {
        let names = match role {
            PartyRole::Plaintiff => &mut self.plaintiffs,
            PartyRole::Defendant => &mut self.defendants,
        };
        if !names.iter().any(|existing| existing.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }

    fn owner_for(&self, owner_text: &str) -> Option<PartyRole> {
        let owner = owner_text.to_lowercase();
        let matches = |names: &[String]| {
            names
                .iter()
                .any(|name| !name.is_empty() && owner.contains(&name.to_lowercase()))
        };
        if matches(&self.plaintiffs) {
            Some(PartyRole::Plaintiff)
        } else if matches(&self.defendants) {
            Some(PartyRole::Defendant)
        } else {
            None
        }
    }
}

fn party_name(row: &HtmlRow) -> Option<String> {
    let cell = row.value_after("Name:")?;
    cell.links
        .iter()
        .find(|link| link.href.contains("pnam="))
        .map(|link| link.text.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| Some(cell.text.clone()).filter(|name| !name.is_empty()))
}

fn serial_in_row(row: &HtmlRow) -> Option<String> {
    let cell = row.value_after("Serial #:")?;
    cell.links
        .iter()
        .filter(|link| link.href.contains("tsdr.uspto.gov") || link.href.contains("caseNumber="))
        .find_map(|link| SERIAL_RE.captures(&link.text).map(|caps| caps[1].to_string()))
        .or_else(|| SERIAL_RE.captures(&cell.text).map(|caps| caps[1].to_string()))
}

/// `Serial #:` 之後幾列內的 `Mark:` 值
fn mark_name_after(rows: &[HtmlRow], index: usize) -> Option<String> {
    rows.iter()
        .skip(index + 1)
        .take(4)
        .take_while(|row| !row.has_label("Serial #:"))
        .find_map(|row| row.value_after("Mark:"))
        .map(|cell| cell.text.clone())
        .filter(|name| !name.is_empty())
}

fn fallback_marks(rows: &[HtmlRow]) -> Vec<PleadedMark> {
    rows.iter()
        .flat_map(|row| row.links())
        .filter(|link| link.href.contains("tsdr.uspto.gov") || link.href.contains("sn="))
        .filter_map(|link| {
            let serial = SERIAL_PARAM_RE.captures(&link.href)?[1].to_string();
            let mark_name = Some(link.text.clone())
                .filter(|text| !text.is_empty() && *text != serial);
            Some(PleadedMark {
                serial_number: serial,
                mark_name,
                owner: None,
            })
        })
        .collect()
}

fn dedupe_marks(marks: Vec<PleadedMark>) -> Vec<PleadedMark> {
    let mut seen = HashSet::new();
    marks
        .into_iter()
        .filter(|mark| seen.insert(mark.serial_number.clone()))
        .collect()
}

fn read_page(rows: &[HtmlRow], rules: &ResultRules) -> DocketPage {
    let mut page = DocketPage::default();
    let mut section = Section::Preamble;
    let mut owner: Option<PartyRole> = None;

    for (index, row) in rows.iter().enumerate() {
        let row_text = row.text();
        let lowered = row_text.to_lowercase();

        if let Some(heading) = row.class_text("t2b") {
            section = match heading.trim().to_lowercase().as_str() {
                "plaintiff" => Section::Party(PartyRole::Plaintiff),
                "defendant" => Section::Party(PartyRole::Defendant),
                text if text.contains("prosecution history") => Section::History(row.table),
                _ => Section::Other,
            };
            owner = match section {
                Section::Party(role) => Some(role),
                _ => None,
            };
            if let Section::History(_) = section {
                page.history_found = true;
            }
            continue;
        }

        if !matches!(section, Section::History(_)) && lowered.contains("prosecution history") {
            section = Section::History(row.table);
            page.history_found = true;
            continue;
        }

        if let Section::History(table) = section {
            if row.table != table {
                continue;
            }
            let row_date = row
                .cells
                .iter()
                .filter(|cell| !cell.header)
                .find_map(|cell| parse_date(&cell.text))
                .or_else(|| parse_date(&row_text));
            let upper = row_text.to_uppercase();
            if upper.contains("FILED AND FEE") && page.history_filing_date.is_none() {
                page.history_filing_date = row_date;
            }
            if upper.contains("TERMINATED") {
                page.termination_date = row_date.or(page.termination_date);
            }
            if let Some(result) = rules.match_decisive(&row_text) {
                page.decisive_result = Some(result);
            }
            if row_date.is_some() {
                page.last_action_date = row_date;
            }
            continue;
        }

        if page.labelled_filing_date.is_none() {
            if let Some(cell) = row.value_after("Filing Date:") {
                page.labelled_filing_date = parse_date(&cell.text);
            }
        }
        if page.status_text.is_none() {
            if let Some(cell) = row.value_after("Status:") {
                page.status_text = Some(cell.text.clone());
            }
        }

        if let Section::Party(role) = section {
            if let Some(name) = party_name(row) {
                page.add_party(role, name);
                continue;
            }
        }

        if let Some(cell) = row.value_after("Owned by:") {
            if let Some(role) = page.owner_for(&cell.text) {
                owner = Some(role);
            }
        }

        if let Some(serial_number) = serial_in_row(row) {
            page.marks.push(PleadedMark {
                serial_number,
                mark_name: mark_name_after(rows, index),
                owner,
            });
        }
    }

    if page.marks.is_empty() {
        page.marks = fallback_marks(rows);
    }
    page.marks = dedupe_marks(std::mem::take(&mut page.marks));
    page
}

/// 解析單一程序的卷宗頁
pub fn parse_docket(proceeding_number: &str, html: &str, rules: &ResultRules) -> Result<DocketRecord> {
    if html.trim().is_empty() {
        return Err(PipelineError::parse(SOURCE, "empty docket page"));
    }

    let rows = scan_rows(html);
    let page = read_page(&rows, rules);

    if !page.is_recognized() {
        let lowered = html.to_lowercase();
        if NOT_FOUND_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return Err(PipelineError::not_found(format!("proceeding {}", proceeding_number)));
        }
        return Err(PipelineError::parse(
            SOURCE,
            format!(
                "no parties, serials or prosecution history in docket for {} ({} rows)",
                proceeding_number,
                rows.len()
            ),
        ));
    }

    let result = page.result(rules);
    Ok(DocketRecord {
        proceeding_number: proceeding_number.to_string(),
        filing_date: page.labelled_filing_date.or(page.history_filing_date),
        termination_date: page.termination_date,
        last_action_date: page.last_action_date,
        result,
        plaintiffs: page.plaintiffs,
        defendants: page.defendants,
        marks: page.marks,
    })
}

/// 解析搜尋結果頁，回傳符合程序類型與日期範圍的程序（依出現順序去重）
pub fn parse_search_results(html: &str, proceeding_type: &str, range: &DateRange) -> Vec<ProceedingRef> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for row in scan_rows(html) {
        let Some(link) = row.links().find(|link| PNO_RE.is_match(&link.href)) else {
            continue;
        };
        let Some(number) = PNO_RE.captures(&link.href).map(|caps| caps[1].to_string()) else {
            continue;
        };
        let kind = PTY_RE
            .captures(&link.href)
            .map(|caps| caps[1].to_uppercase());
        if kind.as_deref().is_some_and(|kind| !kind.eq_ignore_ascii_case(proceeding_type)) {
            continue;
        }

        // 最右側的日期欄位是程序提出日
        let filing_date = row.cells.iter().rev().find_map(|cell| parse_date(&cell.text));
        if !range.admits(filing_date) {
            continue;
        }
        if seen.insert(number.clone()) {
            found.push(ProceedingRef {
                number,
                proceeding_type: kind,
                filing_date,
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCKET: &str = r#"
<html><body>
<table>
  <tr><td class="t2b">Proceeding</td></tr>
  <tr><th class="t3">Filing Date:</th><td>01/15/2024</td></tr>
  <tr><th class="t3">Status:</th><td>Terminated</td></tr>
  <tr><td class="t2b">Plaintiff</td></tr>
  <tr><th class="t3">Name:</th><td><a href="v?pnam=ACME%20CORP">ACME CORP</a></td></tr>
  <tr><th class="t3">Name:</th><td><a href="v?pnam=ACME%20HOLDINGS">ACME HOLDINGS</a></td></tr>
  <tr><th class="t3">Pleaded applications and registrations</th></tr>
  <tr><th>Serial #:</th><td><a href="https://tsdr.uspto.gov/#caseNumber=87654321&caseType=SERIAL_NO">87654321</a></td></tr>
  <tr><th>Application Status:</th><td>REGISTERED</td></tr>
  <tr><th>Mark:</th><td>ACME</td></tr>
  <tr><td class="t2b">Defendant</td></tr>
  <tr><th class="t3">Name:</th><td><a href="v?pnam=WIDGET%20LLC">WIDGET LLC</a></td></tr>
  <tr><th>Serial #:</th><td><a href="https://tsdr.uspto.gov/#caseNumber=97000001&caseType=SERIAL_NO">97000001</a></td></tr>
  <tr><th>Mark:</th><td>ACME WIDGETS FOR EVERYONE</td></tr>
  <tr><th>Serial #:</th><td><a href="https://tsdr.uspto.gov/#caseNumber=87654321">87654321</a></td></tr>
  <tr><td class="t2b">Prosecution History</td></tr>
  <tr><td>1</td><td>01/15/2024</td><td>FILED AND FEE</td></tr>
  <tr><td>2</td><td>02/20/2024</td><td>NOTICE AND TRIAL DATES SENT</td></tr>
  <tr><td>3</td><td>09/30/2024</td><td>BOARD'S DECISION: SUSTAINED</td></tr>
  <tr><td>4</td><td>10/01/2024</td><td>TERMINATED</td></tr>
</table>
</body></html>"#;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_full_docket() {
        let record = parse_docket("91234567", DOCKET, &ResultRules::default()).unwrap();

        assert_eq!(record.plaintiffs, vec!["ACME CORP", "ACME HOLDINGS"]);
        assert_eq!(record.defendants, vec!["WIDGET LLC"]);
        assert_eq!(record.filing_date, Some(date("2024-01-15")));
        assert_eq!(record.termination_date, Some(date("2024-10-01")));
        assert_eq!(record.last_action_date, Some(date("2024-10-01")));
        assert_eq!(record.result, CaseResult::Sustained);

        let serials: Vec<_> = record.marks.iter().map(|m| m.serial_number.as_str()).collect();
        assert_eq!(serials, vec!["87654321", "97000001"]);
        assert_eq!(record.marks[0].mark_name.as_deref(), Some("ACME"));
        assert_eq!(record.marks[0].owner, Some(PartyRole::Plaintiff));
        assert_eq!(record.marks[1].owner, Some(PartyRole::Defendant));
        assert_eq!(
            record.marks[1].mark_name.as_deref(),
            Some("ACME WIDGETS FOR EVERYONE")
        );
    }

    #[test]
    fn test_pending_case_without_decision() {
        let html = r#"<table>
          <tr><td class="t2b">Defendant</td></tr>
          <tr><th class="t3">Name:</th><td>Widget LLC</td></tr>
          <tr><td class="t2b">Prosecution History</td></tr>
          <tr><td>1</td><td>03/01/2025</td><td>FILED AND FEE</td></tr>
        </table>"#;
        let record = parse_docket("91300000", html, &ResultRules::default()).unwrap();

        assert_eq!(record.result, CaseResult::Pending);
        assert_eq!(record.filing_date, Some(date("2025-03-01")));
        assert_eq!(record.defendants, vec!["Widget LLC"]);
        assert!(record.marks.is_empty());
    }

    #[test]
    fn test_terminated_without_recognized_outcome_is_unknown() {
        let html = r#"<table>
          <tr><td class="t2b">Prosecution History</td></tr>
          <tr><td>1</td><td>03/01/2025</td><td>FILED AND FEE</td></tr>
          <tr><td>2</td><td>06/01/2025</td><td>WITHDRAWN; TERMINATED</td></tr>
        </table>"#;
        let record = parse_docket("91300001", html, &ResultRules::default()).unwrap();
        assert_eq!(record.result, CaseResult::Unknown);
        assert_eq!(record.termination_date, Some(date("2025-06-01")));
    }

    #[test]
    fn test_fallback_serials_from_links() {
        let html = r#"<table><tr><td>
          <a href="https://tsdr.uspto.gov/caseviewer?sn=88112233">BRAND</a>
          <a href="https://tsdr.uspto.gov/caseviewer?sn=88112234">88112234</a>
        </td></tr></table>"#;
        let record = parse_docket("91300002", html, &ResultRules::default()).unwrap();

        assert_eq!(record.marks.len(), 2);
        assert_eq!(record.marks[0].mark_name.as_deref(), Some("BRAND"));
        assert_eq!(record.marks[1].mark_name, None);
    }

    #[test]
    fn test_not_found_and_schema_drift() {
        let rules = ResultRules::default();
        let missing = parse_docket("91999999", "<p>No proceedings found.</p>", &rules).unwrap_err();
        assert!(matches!(missing, PipelineError::NotFound { .. }));

        let drift = parse_docket("91999999", "<div><span>redesigned</span></div>", &rules).unwrap_err();
        assert!(matches!(drift, PipelineError::Parse { .. }));

        let empty = parse_docket("91999999", "  ", &rules).unwrap_err();
        assert!(matches!(empty, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_search_results_filter_and_dedupe() {
        let html = r#"<table>
          <tr><td><a href="v?pno=91000001&pty=OPP">91000001</a></td><td>ACME</td><td>02/01/2023</td></tr>
          <tr><td><a href="v?pno=92000002&pty=CAN">92000002</a></td><td>ACME</td><td>03/01/2023</td></tr>
          <tr><td><a href="v?pno=91000003&pty=OPP">91000003</a></td><td>ACME</td><td>07/01/2024</td></tr>
          <tr><td><a href="v?pno=91000001&pty=OPP">91000001</a></td><td>ACME</td><td>02/01/2023</td></tr>
          <tr><td><a href="v?pno=91000004">91000004</a></td><td>ACME</td></tr>
        </table>"#;

        let all = parse_search_results(html, "OPP", &DateRange::default());
        let numbers: Vec<_> = all.iter().map(|p| p.number.as_str()).collect();
        assert_eq!(numbers, vec!["91000001", "91000003", "91000004"]);

        let range = DateRange {
            start: Some(date("2023-01-01")),
            end: Some(date("2023-12-31")),
        };
        let in_range = parse_search_results(html, "OPP", &range);
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].number, "91000001");
        assert_eq!(in_range[0].filing_date, Some(date("2023-02-01")));
    }
}
