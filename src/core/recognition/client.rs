//! 识别服务 HTTP 客户端
//!
//! 请求：JPEG 图像（base64）+ 目标字段全量清单 + 区域提示。
//! 响应是不可信输入：可能裹在 markdown 代码块里，可能是
//! 宽松 JSON（尾逗号、undefined），可能缺任意字段。

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::core::config::RecognitionConfig;
use crate::core::recognition::{
    FieldObservation, PanelReading, RecognitionError, RecognitionService,
};
use crate::models::{MetricField, PanelMeta};

/// 服务缺省置信度，响应未携带 certainty 时使用
const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Serialize)]
struct WireRequest<'a> {
    image: String,
    target_fields: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale_hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireField {
    #[serde(default)]
    raw_value: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    fields: BTreeMap<String, WireField>,
    #[serde(default)]
    meta: Option<PanelMeta>,
}

pub struct HttpRecognition {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRecognition {
    pub fn new(cfg: &RecognitionConfig) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent("insight_lib/0.1")
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

impl RecognitionService for HttpRecognition {
    fn recognize(
        &self,
        image_jpeg: &[u8],
        target_fields: &[MetricField],
        locale_hint: Option<&str>,
    ) -> Result<PanelReading, RecognitionError> {
        let body = WireRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image_jpeg),
            target_fields: target_fields.iter().map(|f| f.name()).collect(),
            locale_hint,
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| RecognitionError::Payload(format!("请求序列化失败: {}", e)))?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        if status == 429 {
            return Err(RecognitionError::RateLimited);
        }
        if !(200..300).contains(&status) {
            return Err(RecognitionError::Status(status));
        }

        let text = response.text()?;
        parse_response(&text)
    }
}

/// 把服务响应文本解析成稀疏读数；任何字段子集都容忍
pub fn parse_response(text: &str) -> Result<PanelReading, RecognitionError> {
    let cleaned = strip_markdown_fences(text);
    if cleaned.trim().is_empty() {
        return Err(RecognitionError::Empty);
    }

    let wire: WireResponse = match serde_json::from_str(cleaned) {
        Ok(wire) => wire,
        // 宽松 JSON 兜底；undefined 不在 json5 语法里，先换成 null
        Err(strict_err) => {
            let sanitized = cleaned.replace("undefined", "null");
            json5::from_str(&sanitized)
                .map_err(|_| RecognitionError::Payload(strict_err.to_string()))?
        }
    };

    let mut fields = BTreeMap::new();
    for (name, wire_field) in wire.fields {
        let Some(field) = MetricField::from_name(&name) else {
            continue;
        };
        let raw_value = match wire_field.raw_value {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        fields.insert(
            field,
            FieldObservation {
                raw_value,
                confidence: wire_field
                    .confidence
                    .unwrap_or(DEFAULT_CONFIDENCE)
                    .clamp(0.0, 1.0),
            },
        );
    }

    Ok(PanelReading {
        fields,
        meta: wire.meta,
    })
}

fn strip_markdown_fences(text: &str) -> &str {
    if let Some(after) = text.split("```json").nth(1) {
        return after.split("```").next().unwrap_or(after);
    }
    if let Some(after) = text.split("```").nth(1) {
        return after;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_response() {
        let text = r#"{
            "fields": {
                "views": {"raw_value": "1,234", "confidence": 0.93},
                "likes": {"raw_value": 30, "confidence": 0.8}
            },
            "meta": {"language": "en", "content_type": "story"}
        }"#;
        let reading = parse_response(text).unwrap();
        assert_eq!(reading.fields.len(), 2);
        assert_eq!(reading.fields[&MetricField::Views].raw_value, "1,234");
        assert_eq!(reading.fields[&MetricField::Likes].raw_value, "30");
        assert_eq!(reading.meta.unwrap().language.unwrap(), "en");
    }

    #[test]
    fn test_parse_fenced_response() {
        let text = "分析结果如下：\n```json\n{\"fields\":{\"views\":{\"raw_value\":\"99\"}}}\n```\n";
        let reading = parse_response(text).unwrap();
        assert_eq!(reading.fields[&MetricField::Views].raw_value, "99");
        // 缺省置信度
        assert!((reading.fields[&MetricField::Views].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_lax_json_fallback() {
        // 尾逗号 + undefined，serde_json 拒绝，json5 兜底
        let text = r#"{ fields: { views: {raw_value: "12", confidence: 0.7}, likes: {raw_value: undefined}, }, }"#;
        let reading = parse_response(text).unwrap();
        assert_eq!(reading.fields.len(), 1);
        assert!(reading.fields.contains_key(&MetricField::Views));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let text = r#"{"fields": {"impressions": {"raw_value": "1"}, "views": {"raw_value": "2"}}}"#;
        let reading = parse_response(text).unwrap();
        assert_eq!(reading.fields.len(), 1);
    }

    #[test]
    fn test_empty_and_garbage_rejected() {
        assert!(matches!(parse_response(""), Err(RecognitionError::Empty)));
        assert!(matches!(
            parse_response("not json at all"),
            Err(RecognitionError::Payload(_))
        ));
    }

    #[test]
    fn test_subset_response_tolerated() {
        let reading = parse_response("{}").unwrap();
        assert!(reading.fields.is_empty());
        assert!(reading.meta.is_none());
    }

    #[test]
    fn test_confidence_clamped() {
        let text = r#"{"fields": {"views": {"raw_value": "5", "confidence": 3.5}}}"#;
        let reading = parse_response(text).unwrap();
        assert_eq!(reading.fields[&MetricField::Views].confidence, 1.0);
    }

    #[test]
    fn test_client_construction() {
        let cfg = RecognitionConfig {
            endpoint: "http://localhost:9/analyze".into(),
            ..Default::default()
        };
        assert!(HttpRecognition::new(&cfg).is_ok());
    }
}
