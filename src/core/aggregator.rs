use crate::core::classifier::MarkClassifier;
use crate::domain::model::{
    FetchError, FetchErrorKind, FetchStage, MarkRecord, OppositionCase, StatusRecord,
};
use crate::domain::ports::{DocketSource, StatusSource};
use crate::utils::error::Result;
use futures::future::join_all;
use std::sync::Arc;

/// 單一異議案件的處理階段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationState {
    FetchingDocket,
    ExpandingSerials,
    FetchingStatuses,
    Classifying,
    Merged,
    Failed,
}

/// 合併卷宗、商標狀態與分類結果成一筆 OppositionCase
pub struct OppositionAggregator {
    docket: Arc<dyn DocketSource>,
    status: Arc<dyn StatusSource>,
    classifier: Arc<MarkClassifier>,
}

impl OppositionAggregator {
    pub fn new(
        docket: Arc<dyn DocketSource>,
        status: Arc<dyn StatusSource>,
        classifier: Arc<MarkClassifier>,
    ) -> Self {
        Self {
            docket,
            status,
            classifier,
        }
    }

    pub fn docket_source(&self) -> &Arc<dyn DocketSource> {
        &self.docket
    }

    fn enter(proceeding: &str, state: AggregationState) {
        tracing::debug!(proceeding, state = ?state, "🔄 Aggregation state");
    }

    /// 卷宗失敗時回傳頂層 FetchError；其餘失敗都附掛在各商標紀錄上
    pub async fn aggregate(&self, proceeding_number: &str) -> std::result::Result<OppositionCase, FetchError> {
        Self::enter(proceeding_number, AggregationState::FetchingDocket);
        let docket = match self.docket.fetch_docket(proceeding_number).await {
            Ok(docket) => docket,
            Err(error) => {
                Self::enter(proceeding_number, AggregationState::Failed);
                tracing::warn!(proceeding = proceeding_number, "❌ Docket fetch failed: {}", error);
                return Err(FetchError::from_error(FetchStage::Docket, &error).for_proceeding(proceeding_number));
            }
        };

        Self::enter(proceeding_number, AggregationState::ExpandingSerials);
        let mut marks: Vec<MarkRecord> = docket.marks.iter().map(MarkRecord::from_pleaded).collect();
        tracing::info!(
            proceeding = proceeding_number,
            serials = marks.len(),
            "📋 Docket lists {} marks",
            marks.len()
        );

        Self::enter(proceeding_number, AggregationState::FetchingStatuses);
        let statuses = join_all(
            marks
                .iter()
                .map(|mark| self.status.fetch_status(&mark.serial_number)),
        )
        .await;
        for (mark, status) in marks.iter_mut().zip(statuses) {
            self.merge_status(proceeding_number, mark, status);
        }

        Self::enter(proceeding_number, AggregationState::Classifying);
        let classifications = join_all(marks.iter().map(|mark| {
            self.classifier
                .classify(mark.image_ref.as_deref(), mark.text_sample())
        }))
        .await;
        for (mark, classification) in marks.iter_mut().zip(classifications) {
            mark.apply_classification(classification.mark_type, classification.source);
            if let Some(message) = classification.failure {
                mark.errors.push(
                    FetchError::new(
                        FetchStage::Classification,
                        FetchErrorKind::ClassificationUnavailable,
                        message,
                    )
                    .for_proceeding(proceeding_number)
                    .for_serial(&mark.serial_number),
                );
            }
        }

        Self::enter(proceeding_number, AggregationState::Merged);
        Ok(OppositionCase {
            proceeding_number: docket.proceeding_number,
            plaintiffs: docket.plaintiffs,
            defendants: docket.defendants,
            filing_date: docket.filing_date,
            termination_date: docket.termination_date,
            last_action_date: docket.last_action_date,
            result: docket.result,
            marks,
        })
    }

    fn merge_status(&self, proceeding: &str, mark: &mut MarkRecord, status: Result<StatusRecord>) {
        match status {
            Ok(status) => mark.apply_status(status),
            Err(error) => {
                tracing::warn!(
                    proceeding,
                    serial = %mark.serial_number,
                    "⚠️ Status fetch failed: {}",
                    error
                );
                mark.errors.push(
                    FetchError::from_error(FetchStage::Status, &error)
                        .for_proceeding(proceeding)
                        .for_serial(&mark.serial_number),
                );
            }
        }
    }
}
