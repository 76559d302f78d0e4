pub mod html;
pub mod parse;

use crate::adapters::http::HttpRetryClient;
use crate::domain::model::{DateRange, DocketRecord, ProceedingRef};
use crate::domain::ports::{DocketSource, HttpRequest};
use crate::domain::result_rules::ResultRules;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use parse::{parse_docket, parse_search_results};

pub const SERVICE: &str = "ttabvue";

/// TTABVue 卷宗來源：依程序編號取卷宗，或依當事人名稱/搜尋網址列出程序
pub struct DocketFetcher {
    http: Arc<HttpRetryClient>,
    base_url: String,
    proceeding_type: String,
    rules: ResultRules,
}

impl DocketFetcher {
    pub fn new(http: Arc<HttpRetryClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            proceeding_type: "OPP".to_string(),
            rules: ResultRules::default(),
        }
    }

    pub fn with_proceeding_type(mut self, proceeding_type: impl Into<String>) -> Self {
        self.proceeding_type = proceeding_type.into();
        self
    }

    pub fn with_rules(mut self, rules: ResultRules) -> Self {
        self.rules = rules;
        self
    }

    async fn fetch_search_page(&self, request: HttpRequest, range: &DateRange) -> Result<Vec<ProceedingRef>> {
        let response = self.http.call(&request).await?;
        let found = parse_search_results(&response.text(), &self.proceeding_type, range);
        tracing::info!(
            count = found.len(),
            proceeding_type = %self.proceeding_type,
            "🔍 Search returned {} proceedings",
            found.len()
        );
        Ok(found)
    }
}

#[async_trait]
impl DocketSource for DocketFetcher {
    async fn fetch_docket(&self, proceeding_number: &str) -> Result<DocketRecord> {
        tracing::debug!(proceeding = proceeding_number, "📥 Fetching docket");
        let request = HttpRequest::get(SERVICE, &self.base_url)
            .query("pno", proceeding_number)
            .query("pty", &self.proceeding_type);
        let response = self.http.call(&request).await?;

        let record = parse_docket(proceeding_number, &response.text(), &self.rules)?;
        tracing::debug!(
            proceeding = proceeding_number,
            serials = record.marks.len(),
            result = ?record.result,
            "📄 Docket parsed"
        );
        Ok(record)
    }

    async fn search_party(&self, party_name: &str, range: &DateRange) -> Result<Vec<ProceedingRef>> {
        tracing::info!(party = party_name, "🔍 Searching proceedings by party");
        let request = HttpRequest::get(SERVICE, &self.base_url)
            .query("qt", "adv")
            .query("pn", party_name)
            .query("procstatus", "All");
        self.fetch_search_page(request, range).await
    }

    async fn search_url(&self, url: &str, range: &DateRange) -> Result<Vec<ProceedingRef>> {
        tracing::info!(url, "🔍 Reading search results page");
        self.fetch_search_page(HttpRequest::get(SERVICE, url), range).await
    }
}
