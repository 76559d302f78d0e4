use crate::domain::model::{ClassificationSource, MarkType};
use crate::domain::ports::VisionClient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").expect("word pattern is valid"));

/// 送給影像模型的固定指示
pub const VISION_INSTRUCTION: &str = "You are looking at a USPTO trademark drawing. \
Answer with exactly one of these labels and nothing else: \
STANDARD_TEXT if the mark is plain words in a standard font, \
STYLIZED_DESIGN if it has a logo, design element or stylized lettering, \
SLOGAN if it is a phrase or slogan, \
NO_IMAGE if the picture only says that no image exists.";

/// 影像模型回覆經固定詞彙比對後的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionVerdict {
    Type(MarkType),
    NoImage,
}

/// 分類結果；`failure` 記錄影像模型失敗、回覆無法解析或無法分類的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mark_type: MarkType,
    pub source: ClassificationSource,
    pub failure: Option<String>,
}

impl Classification {
    fn new(mark_type: MarkType, source: ClassificationSource) -> Self {
        Self {
            mark_type,
            source,
            failure: None,
        }
    }
}

/// 將模型的自由文字回覆對應到固定詞彙；多種或零種命中都視為無法解析
pub fn parse_vision_response(response: &str) -> Option<VisionVerdict> {
    let text = response.to_lowercase().replace(['_', '-'], " ");

    if text.contains("no image") {
        return Some(VisionVerdict::NoImage);
    }

    let mut found: Vec<MarkType> = Vec::new();
    let mut note = |mark_type: MarkType| {
        if !found.contains(&mark_type) {
            found.push(mark_type);
        }
    };
    if ["stylized", "design", "logo"].iter().any(|w| text.contains(w)) {
        note(MarkType::StylizedDesign);
    }
    if text.contains("slogan") {
        note(MarkType::Slogan);
    }
    if ["standard text", "standard character", "plain text"]
        .iter()
        .any(|w| text.contains(w))
    {
        note(MarkType::StandardText);
    }

    match found.as_slice() {
        [only] => Some(VisionVerdict::Type(*only)),
        _ => None,
    }
}

/// 純文字判斷：1–2 個字為一般文字商標，3 個字以上視為標語
pub fn classify_text(text: Option<&str>) -> Classification {
    let words = text.map_or(0, |text| WORD_RE.find_iter(text).count());
    match words {
        0 => Classification::new(MarkType::Unknown, ClassificationSource::Unavailable),
        1 | 2 => Classification::new(MarkType::StandardText, ClassificationSource::FallbackDefault),
        _ => Classification::new(MarkType::Slogan, ClassificationSource::FallbackDefault),
    }
}

/// 三層分類：影像模型 → 文字判斷 → Unavailable
pub struct MarkClassifier {
    vision: Option<Arc<dyn VisionClient>>,
}

impl MarkClassifier {
    pub fn new(vision: Option<Arc<dyn VisionClient>>) -> Self {
        Self { vision }
    }

    pub fn text_only() -> Self {
        Self { vision: None }
    }

    /// 模型失敗、回覆無法解析或最終為 Unavailable 時，`failure` 會帶上原因
    pub async fn classify(&self, image_ref: Option<&str>, text: Option<&str>) -> Classification {
        let classification = self.classify_tiers(image_ref, text).await;
        if classification.source == ClassificationSource::Unavailable && classification.failure.is_none() {
            return Classification {
                failure: Some("no image verdict and no mark text to classify".to_string()),
                ..classification
            };
        }
        classification
    }

    async fn classify_tiers(&self, image_ref: Option<&str>, text: Option<&str>) -> Classification {
        let (Some(image_ref), Some(vision)) = (image_ref, self.vision.as_ref()) else {
            return classify_text(text);
        };

        match vision.describe_image(image_ref, VISION_INSTRUCTION).await {
            Ok(response) => match parse_vision_response(&response) {
                Some(VisionVerdict::Type(mark_type)) => {
                    Classification::new(mark_type, ClassificationSource::ModelClassified)
                }
                Some(VisionVerdict::NoImage) => {
                    tracing::debug!(image_ref, "🖼️ Drawing placeholder, using mark text");
                    classify_text(text)
                }
                None => {
                    tracing::warn!(image_ref, response = %response, "🤷 Unparseable vision response");
                    Classification {
                        failure: Some(format!("unparseable vision response: {}", response.trim())),
                        ..classify_text(text)
                    }
                }
            },
            Err(error) => {
                tracing::warn!(image_ref, "⚠️ Vision classification failed: {}", error);
                Classification {
                    failure: Some(error.to_string()),
                    ..classify_text(text)
                }
            }
        }
    }
}
