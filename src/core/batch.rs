use crate::core::aggregator::OppositionAggregator;
use crate::domain::model::{
    BatchItem, BatchResult, BatchSource, DateRange, FetchError, FetchErrorKind, FetchStage,
    Progress, ProceedingRef,
};
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 依序驅動多個程序編號經過 OppositionAggregator
pub struct BatchRunner {
    aggregator: Arc<OppositionAggregator>,
    max_concurrent_cases: usize,
    deadline: Option<Duration>,
    progress: watch::Sender<Progress>,
}

impl BatchRunner {
    pub fn new(aggregator: Arc<OppositionAggregator>, max_concurrent_cases: usize) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            aggregator,
            max_concurrent_cases: max_concurrent_cases.max(1),
            deadline: None,
            progress,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// 唯讀的進度訊號，每完成一個程序更新一次
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub async fn run_ids(&self, proceeding_numbers: &[String]) -> BatchResult {
        self.run(BatchSource::Proceedings, proceeding_numbers.to_vec())
            .await
    }

    pub async fn run_party(&self, party_name: &str, range: DateRange) -> BatchResult {
        let source = BatchSource::Party {
            name: party_name.to_string(),
            range,
        };
        let found = self
            .aggregator
            .docket_source()
            .search_party(party_name, &range)
            .await;
        self.run_search(source, found).await
    }

    pub async fn run_url(&self, url: &str, range: DateRange) -> BatchResult {
        let source = BatchSource::SearchUrl {
            url: url.to_string(),
            range,
        };
        let found = self
            .aggregator
            .docket_source()
            .search_url(url, &range)
            .await;
        self.run_search(source, found).await
    }

    async fn run_search(&self, source: BatchSource, found: Result<Vec<ProceedingRef>>) -> BatchResult {
        match found {
            Ok(refs) => {
                let ids = refs.into_iter().map(|found| found.number).collect();
                self.run(source, ids).await
            }
            Err(error) => {
                tracing::warn!("❌ Search failed: {}", error);
                let failure = FetchError::from_error(FetchStage::Search, &error);
                self.progress.send_replace(Progress {
                    completed: 0,
                    total: 0,
                    last_error: Some(failure.to_string()),
                });
                let mut result = BatchResult::empty(source);
                result.items.push(BatchItem::Failed(failure.clone()));
                result.errors.push(failure);
                result
            }
        }
    }

    async fn run(&self, source: BatchSource, ids: Vec<String>) -> BatchResult {
        let total = ids.len();
        self.progress.send_replace(Progress {
            completed: 0,
            total,
            last_error: None,
        });
        if total == 0 {
            tracing::info!("📭 No proceedings to process");
            return BatchResult::empty(source);
        }
        tracing::info!(total, "🚀 Starting batch of {} proceedings", total);

        let mut slots: Vec<Option<BatchItem>> = vec![None; total];
        let collect = async {
            let mut outcomes = stream::iter(ids.iter().enumerate())
                .map(|(index, id)| async move { (index, self.aggregator.aggregate(id).await) })
                .buffer_unordered(self.max_concurrent_cases);

            while let Some((index, outcome)) = outcomes.next().await {
                let item = match outcome {
                    Ok(case) => BatchItem::Case(case),
                    Err(error) => BatchItem::Failed(error),
                };
                self.report_progress(&item);
                slots[index] = Some(item);
            }
        };

        let aborted = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };
        if aborted {
            tracing::warn!(
                deadline_secs = self.deadline.map_or(0, |d| d.as_secs()),
                "⏰ Batch deadline reached, remaining proceedings aborted"
            );
        }

        let items: Vec<BatchItem> = slots
            .into_iter()
            .zip(&ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    BatchItem::Failed(
                        FetchError::new(
                            FetchStage::Batch,
                            FetchErrorKind::Aborted,
                            "batch deadline reached before this proceeding finished",
                        )
                        .for_proceeding(id),
                    )
                })
            })
            .collect();

        let errors = items
            .iter()
            .flat_map(|item| match item {
                BatchItem::Failed(error) => vec![error.clone()],
                BatchItem::Case(case) => case.errors().cloned().collect(),
            })
            .collect::<Vec<_>>();

        let cases = items
            .iter()
            .filter(|item| matches!(item, BatchItem::Case(_)))
            .count();
        tracing::info!(
            total,
            cases,
            failed = total - cases,
            errors = errors.len(),
            aborted,
            "📊 Batch finished"
        );

        BatchResult {
            source,
            items,
            errors,
            aborted,
        }
    }

    fn report_progress(&self, item: &BatchItem) {
        let last_error = match item {
            BatchItem::Failed(error) => Some(error.to_string()),
            BatchItem::Case(case) => case.errors().last().map(|error| error.to_string()),
        };
        self.progress.send_modify(|progress| {
            progress.completed += 1;
            if last_error.is_some() {
                progress.last_error = last_error;
            }
        });
        let progress = self.progress.borrow();
        tracing::info!(
            completed = progress.completed,
            total = progress.total,
            "⏳ Progress {}/{}",
            progress.completed,
            progress.total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::tests::{aggregator, FakeDockets, FakeStatuses};
    use crate::core::classifier::MarkClassifier;
    use crate::domain::model::{DocketRecord, StatusRecord};
    use crate::domain::ports::{DocketSource, StatusSource};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn runner(dockets: FakeDockets, statuses: FakeStatuses, concurrency: usize) -> BatchRunner {
        BatchRunner::new(Arc::new(aggregator(dockets, statuses)), concurrency)
    }

    #[tokio::test]
    async fn test_one_outcome_per_id_in_input_order() {
        let dockets = FakeDockets::default()
            .with_case("91000001", &["80000001"])
            .with_case("91000003", &["80000003", "80000004"]);
        let runner = runner(dockets, FakeStatuses::default(), 3);
        let input = ids(&["91000003", "91000002", "91000001"]);

        let result = runner.run_ids(&input).await;

        assert_eq!(result.items.len(), 3);
        assert!(!result.aborted);
        match &result.items[0] {
            BatchItem::Case(case) => assert_eq!(case.proceeding_number, "91000003"),
            other => panic!("unexpected {:?}", other),
        }
        match &result.items[1] {
            BatchItem::Failed(error) => {
                assert_eq!(error.proceeding.as_deref(), Some("91000002"));
                assert_eq!(error.kind, FetchErrorKind::NotFound);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &result.items[2] {
            BatchItem::Case(case) => assert_eq!(case.proceeding_number, "91000001"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(result.errors.len(), 1);

        let progress = runner.subscribe().borrow().clone();
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.total, 3);
        assert!(progress.last_error.is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_identical() {
        let dockets = FakeDockets::default().with_case("91234567", &["87654321", "97000001"]);
        let statuses = FakeStatuses {
            failing: vec!["97000001".to_string()],
        };
        let runner = runner(dockets, statuses, 2);
        let input = ids(&["91234567"]);

        let first = serde_json::to_string(&runner.run_ids(&input).await).unwrap();
        let second = serde_json::to_string(&runner.run_ids(&input).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_search_is_empty_result() {
        let runner = runner(FakeDockets::default(), FakeStatuses::default(), 2);
        let result = runner.run_party("Nobody Inc", DateRange::default()).await;

        assert!(result.items.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.searched_party(), Some("Nobody Inc"));
        assert_eq!(runner.subscribe().borrow().total, 0);
    }

    #[tokio::test]
    async fn test_party_search_respects_date_range() {
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
        let mut dockets = FakeDockets::default()
            .with_case("91000001", &["80000001"])
            .with_case("91000002", &["80000002"]);
        dockets.search_hits = vec![
            ProceedingRef {
                number: "91000001".to_string(),
                proceeding_type: Some("OPP".to_string()),
                filing_date: date("2023-05-01"),
            },
            ProceedingRef {
                number: "91000002".to_string(),
                proceeding_type: Some("OPP".to_string()),
                filing_date: date("2024-05-01"),
            },
        ];
        let runner = runner(dockets, FakeStatuses::default(), 2);
        let range = DateRange {
            start: date("2024-01-01"),
            end: None,
        };

        let result = runner.run_party("Acme", range).await;
        let numbers: Vec<_> = result.cases().map(|c| c.proceeding_number.as_str()).collect();
        assert_eq!(numbers, vec!["91000002"]);
    }

    struct StalledDockets {
        inner: FakeDockets,
        stalled: String,
    }

    #[async_trait]
    impl DocketSource for StalledDockets {
        async fn fetch_docket(&self, proceeding_number: &str) -> Result<DocketRecord> {
            if proceeding_number == self.stalled {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.fetch_docket(proceeding_number).await
        }

        async fn search_party(&self, party_name: &str, range: &DateRange) -> Result<Vec<ProceedingRef>> {
            self.inner.search_party(party_name, range).await
        }

        async fn search_url(&self, url: &str, range: &DateRange) -> Result<Vec<ProceedingRef>> {
            self.inner.search_url(url, range).await
        }
    }

    struct NoStatus;

    #[async_trait]
    impl StatusSource for NoStatus {
        async fn fetch_status(&self, _serial_number: &str) -> Result<StatusRecord> {
            Ok(StatusRecord::default())
        }
    }

    #[tokio::test]
    async fn test_deadline_marks_unfinished_as_aborted() {
        let dockets = StalledDockets {
            inner: FakeDockets::default()
                .with_case("91000001", &["80000001"])
                .with_case("91000002", &["80000002"]),
            stalled: "91000002".to_string(),
        };
        let aggregator = OppositionAggregator::new(
            Arc::new(dockets),
            Arc::new(NoStatus),
            Arc::new(MarkClassifier::text_only()),
        );
        let runner = BatchRunner::new(Arc::new(aggregator), 2)
            .with_deadline(Some(Duration::from_millis(200)));

        let result = runner.run_ids(&ids(&["91000001", "91000002"])).await;

        assert!(result.aborted);
        assert!(matches!(result.items[0], BatchItem::Case(_)));
        match &result.items[1] {
            BatchItem::Failed(error) => {
                assert_eq!(error.kind, FetchErrorKind::Aborted);
                assert_eq!(error.stage, FetchStage::Batch);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(result.errors.len(), 1);
    }
}
